//! 元改进主循环
//!
//! attempting → analyzing → (done | mutating → attempting)；尝试严格串行，
//! 第 k+1 次尝试必须等第 k 次的轨迹分析完成（变异决策依赖上一条轨迹）。
//! 多变体搜索按 variant_concurrency 分批并发，批内落定再开下一批。

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::MoltError;
use crate::executor::{ExecutionContext, ExecutionOutcome, TaskExecutor, TaskSpec};
use crate::improve::{ImprovementStrategies, Learning, Recommendation, StrategyKind};
use crate::meta::events::{LoopPhase, MetaEvent};
use crate::meta::types::{Attempt, MetaAgentResult, MetaTask, VariantResult};
use crate::mutation::{AgentConfig, ConfigMutator, MutateOptions, MutationKind};
use crate::trace::{TraceAnalysisResult, TraceAnalyzer};

/// 循环选项
pub struct MetaLoopOptions {
    /// 关闭后每次尝试沿用同一配置（纯重试）
    pub improvement_enabled: bool,
    /// 多变体搜索的并发上限
    pub variant_concurrency: usize,
    /// 可选事件通道
    pub event_tx: Option<tokio::sync::mpsc::UnboundedSender<MetaEvent>>,
    /// 可选取消令牌：只在两次尝试之间检查
    pub cancel_token: Option<CancellationToken>,
}

impl Default for MetaLoopOptions {
    fn default() -> Self {
        Self {
            improvement_enabled: true,
            variant_concurrency: 3,
            event_tx: None,
            cancel_token: None,
        }
    }
}

/// 元改进循环
pub struct MetaAgentLoop {
    executor: Arc<dyn TaskExecutor>,
    analyzer: TraceAnalyzer,
    mutator: ConfigMutator,
    strategies: ImprovementStrategies,
    options: MetaLoopOptions,
}

impl MetaAgentLoop {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            executor,
            analyzer: TraceAnalyzer::default(),
            mutator: ConfigMutator::default(),
            strategies: ImprovementStrategies::new(),
            options: MetaLoopOptions::default(),
        }
    }

    pub fn with_analyzer(mut self, analyzer: TraceAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_mutator(mut self, mutator: ConfigMutator) -> Self {
        self.mutator = mutator;
        self
    }

    pub fn with_options(mut self, options: MetaLoopOptions) -> Self {
        self.options = options;
        self
    }

    /// 内部组件访问器（组合与测试用；不暴露可变共享状态）
    pub fn analyzer(&self) -> &TraceAnalyzer {
        &self.analyzer
    }

    pub fn mutator(&self) -> &ConfigMutator {
        &self.mutator
    }

    pub fn strategies(&self) -> &ImprovementStrategies {
        &self.strategies
    }

    fn emit(&self, event: MetaEvent) {
        if let Some(tx) = &self.options.event_tx {
            let _ = tx.send(event);
        }
    }

    /// 执行改进循环：尝试直到达标 / 次数用尽 / 循环级超时
    pub async fn execute(
        &self,
        task: &MetaTask,
        base_config: &AgentConfig,
    ) -> Result<MetaAgentResult, MoltError> {
        if task.max_attempts == 0 {
            return Err(MoltError::InvalidTask(format!(
                "task '{}' allows zero attempts",
                task.id
            )));
        }
        if task.attempt_timeout_ms == 0 {
            return Err(MoltError::InvalidTask(format!(
                "task '{}' has zero attempt timeout",
                task.id
            )));
        }

        let started = Instant::now();
        let deadline = task
            .overall_timeout_ms
            .map(|ms| started + Duration::from_millis(ms));

        let spec = TaskSpec {
            id: task.id.clone(),
            description: task.description.clone(),
            input: task.input.clone(),
        };

        let mut config = base_config.clone();
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut success = false;

        for attempt_no in 1..=task.max_attempts {
            // 循环级超时与取消只在尝试之间生效，不抢占在途尝试
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    tracing::warn!(task = %task.id, attempt = attempt_no, "overall timeout, stopping loop");
                    break;
                }
            }
            if let Some(token) = &self.options.cancel_token {
                if token.is_cancelled() {
                    tracing::info!(task = %task.id, "loop cancelled");
                    break;
                }
            }

            self.emit(MetaEvent::PhaseChanged {
                phase: LoopPhase::Attempting,
            });
            self.emit(MetaEvent::AttemptStarted {
                attempt: attempt_no,
                max_attempts: task.max_attempts,
            });

            let mut ctx = ExecutionContext::new(task.id.clone(), task.id.clone());
            ctx.inputs = task.input.clone();
            ctx.start_time = Utc::now();

            let attempt_started = Instant::now();
            let raced = tokio::time::timeout(
                Duration::from_millis(task.attempt_timeout_ms),
                self.executor.execute(&spec, &config, &ctx),
            )
            .await;

            let outcome = match raced {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => ExecutionOutcome::failure(e.to_string()),
                Err(_) => {
                    ExecutionOutcome::failure(MoltError::Timeout(task.attempt_timeout_ms).to_string())
                }
            };

            self.emit(MetaEvent::PhaseChanged {
                phase: LoopPhase::Analyzing,
            });

            let (quality_score, analysis) = match &outcome.trace {
                Some(trace) => {
                    let analysis = self.analyzer.analyze(trace);
                    (analysis.quality_score, Some(analysis))
                }
                // 无轨迹可分析时退回成败标记
                None => (if outcome.success { 60.0 } else { 0.0 }, None),
            };

            attempts.push(Attempt {
                index: attempt_no,
                config: config.clone(),
                output: outcome.output,
                trace: outcome.trace,
                quality_score,
                duration_ms: attempt_started.elapsed().as_millis() as u64,
                error: outcome.error,
            });

            self.emit(MetaEvent::AttemptFinished {
                attempt: attempt_no,
                quality_score,
                success: outcome.success,
            });
            tracing::info!(
                task = %task.id,
                attempt = attempt_no,
                quality = quality_score,
                "attempt finished"
            );

            if quality_score >= task.quality_threshold {
                success = true;
                self.emit(MetaEvent::ThresholdReached {
                    attempt: attempt_no,
                    quality_score,
                });
                break;
            }

            if attempt_no < task.max_attempts && self.options.improvement_enabled {
                self.emit(MetaEvent::PhaseChanged {
                    phase: LoopPhase::Mutating,
                });
                config = self.next_config(&config, analysis.as_ref());
            }
        }

        self.emit(MetaEvent::PhaseChanged {
            phase: LoopPhase::Done,
        });

        let best_attempt = attempts
            .iter()
            .max_by(|a, b| {
                a.quality_score
                    .partial_cmp(&b.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();
        let learnings = self.extract_learnings(&attempts);
        for learning in &learnings {
            self.strategies.record_learning(learning.clone());
        }

        let best_quality = best_attempt.as_ref().map(|a| a.quality_score).unwrap_or(0.0);
        self.emit(MetaEvent::LoopFinished {
            attempts: attempts.len(),
            best_quality,
            success,
        });

        Ok(MetaAgentResult {
            task_id: task.id.clone(),
            attempts,
            best_attempt,
            success,
            total_duration_ms: started.elapsed().as_millis() as u64,
            learnings,
        })
    }

    /// 决定下一次尝试的配置：建议 → 精修 → 变异；无建议时退化为普通加权变异
    fn next_config(
        &self,
        config: &AgentConfig,
        analysis: Option<&TraceAnalysisResult>,
    ) -> AgentConfig {
        let recommendations: Vec<Recommendation> = analysis
            .map(|a| self.strategies.recommend(a))
            .unwrap_or_default();

        let next = match recommendations.first() {
            Some(top) => {
                let refined = self.strategies.apply(config, top);
                let opts = MutateOptions {
                    kind: Some(mutation_kind_for(top.strategy)),
                    ..Default::default()
                };
                self.mutator.mutate(&refined, &opts)
            }
            None => self.mutator.mutate(config, &MutateOptions::default()),
        };

        if let Some(record) = &next.mutation {
            self.emit(MetaEvent::MutationApplied {
                kind: record.kind,
                fields_changed: record.fields_changed.clone(),
            });
        }
        next
    }

    /// 从尝试历史提炼学习：相邻尝试的质量差归因到产出后者的变异
    fn extract_learnings(&self, attempts: &[Attempt]) -> Vec<Learning> {
        let mut learnings = Vec::new();
        for pair in attempts.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let delta = next.quality_score - prev.quality_score;
            let Some(record) = &next.config.mutation else {
                continue;
            };
            if delta.abs() < 1.0 {
                continue;
            }
            learnings.push(Learning {
                insight: format!(
                    "{} changed quality by {:+.1} (attempt {} -> {})",
                    record.kind, delta, prev.index, next.index
                ),
                source: "meta_loop".to_string(),
                confidence: (delta.abs() / 50.0 + 0.3).min(1.0),
                pattern: Some(record.kind.to_string()),
                actions_applied: record.fields_changed.clone(),
                timestamp: Utc::now(),
            });
        }
        learnings
    }

    /// 多变体并行搜索：从基配置派生 variant_count 个变体，各自独立跑完整循环，
    /// 按最终质量分降序返回
    pub async fn execute_with_variants(
        &self,
        task: &MetaTask,
        base_config: &AgentConfig,
        variant_count: usize,
    ) -> Result<Vec<VariantResult>, MoltError> {
        let variants: Vec<AgentConfig> = (0..variant_count)
            .map(|_| self.mutator.mutate(base_config, &MutateOptions::default()))
            .collect();

        let concurrency = self.options.variant_concurrency.max(1);
        let mut results: Vec<VariantResult> = Vec::with_capacity(variant_count);

        for batch in variants.chunks(concurrency) {
            let futures = batch.iter().map(|variant| async move {
                let result = self.execute(task, variant).await?;
                let final_quality_score = result
                    .best_attempt
                    .as_ref()
                    .map(|a| a.quality_score)
                    .unwrap_or(0.0);
                Ok::<VariantResult, MoltError>(VariantResult {
                    config: variant.clone(),
                    result,
                    final_quality_score,
                })
            });
            for result in join_all(futures).await {
                results.push(result?);
            }
        }

        results.sort_by(|a, b| {
            b.final_quality_score
                .partial_cmp(&a.final_quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }
}

/// 改进策略 → 对应的变异策略
fn mutation_kind_for(strategy: StrategyKind) -> MutationKind {
    match strategy {
        StrategyKind::PromptRefinement => MutationKind::PromptRefine,
        StrategyKind::RetryPolicy => MutationKind::RetryAdjust,
        StrategyKind::TemperatureTuning => MutationKind::TemperatureAdjust,
        StrategyKind::TokenBudget => MutationKind::TokenAdjust,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MockExecutor;
    use serde_json::json;

    fn demo_task() -> MetaTask {
        MetaTask::new("demo task", json!({"goal": "demo"}))
            .with_threshold(50.0)
            .with_max_attempts(3)
            .with_attempt_timeout_ms(5_000)
    }

    #[tokio::test]
    async fn test_zero_attempts_is_fatal() {
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new()));
        let task = demo_task().with_max_attempts(0);
        let config = AgentConfig::seed("a", "p");
        let err = loop_.execute(&task, &config).await.unwrap_err();
        assert!(matches!(err, MoltError::InvalidTask(_)));
    }

    #[tokio::test]
    async fn test_execute_terminates_with_best_attempt() {
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new().with_success_after(2)));
        let task = demo_task();
        let config = AgentConfig::seed("agent", "prompt");

        let result = loop_.execute(&task, &config).await.unwrap();
        assert!(result.attempts.len() <= 3);
        assert!(result.success);
        let best = result.best_attempt.expect("best attempt");
        assert!(best.quality_score >= 50.0);
        // 第二次尝试用的是变异后的配置
        assert_eq!(result.attempts[1].config.version, config.version + 1);
    }

    #[tokio::test]
    async fn test_execute_returns_result_when_never_succeeding() {
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new().with_success_after(100)));
        let task = demo_task();
        let config = AgentConfig::seed("agent", "prompt");

        let result = loop_.execute(&task, &config).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.attempts.len(), 3);
        assert!(result.best_attempt.is_some());
    }

    #[tokio::test]
    async fn test_improvement_disabled_keeps_config() {
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new().with_success_after(100)))
            .with_options(MetaLoopOptions {
                improvement_enabled: false,
                ..Default::default()
            });
        let task = demo_task();
        let config = AgentConfig::seed("agent", "prompt");

        let result = loop_.execute(&task, &config).await.unwrap();
        for attempt in &result.attempts {
            assert_eq!(attempt.config.id, config.id);
        }
    }

    #[tokio::test]
    async fn test_overall_timeout_stops_between_attempts() {
        // 每次尝试耗时 ~100ms，循环级超时 50ms：第一次尝试照常跑完，
        // 第二次尝试前的截止检查终止循环
        let loop_ = MetaAgentLoop::new(Arc::new(
            MockExecutor::new().with_success_after(100).with_delay_ms(100),
        ));
        let task = demo_task()
            .with_max_attempts(5)
            .with_overall_timeout_ms(50);
        let config = AgentConfig::seed("agent", "prompt");

        let result = loop_.execute(&task, &config).await.unwrap();
        assert_eq!(result.attempts.len(), 1);
        assert!(!result.success);
        // 在途尝试不被抢占，部分结果完整可用
        assert!(result.best_attempt.is_some());
    }

    #[tokio::test]
    async fn test_cancelled_token_yields_empty_result() {
        let token = CancellationToken::new();
        token.cancel();
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new())).with_options(
            MetaLoopOptions {
                cancel_token: Some(token),
                ..Default::default()
            },
        );
        let task = demo_task();
        let config = AgentConfig::seed("agent", "prompt");

        let result = loop_.execute(&task, &config).await.unwrap();
        assert!(result.attempts.is_empty());
        assert!(result.best_attempt.is_none());
        assert!(!result.success);
        assert_eq!(result.task_id, task.id);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new())).with_options(
            MetaLoopOptions {
                event_tx: Some(tx),
                ..Default::default()
            },
        );
        let task = demo_task();
        let config = AgentConfig::seed("agent", "prompt");
        loop_.execute(&task, &config).await.unwrap();

        let mut saw_started = false;
        let mut saw_finished = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                MetaEvent::AttemptStarted { .. } => saw_started = true,
                MetaEvent::LoopFinished { .. } => saw_finished = true,
                _ => {}
            }
        }
        assert!(saw_started);
        assert!(saw_finished);
    }

    #[tokio::test]
    async fn test_variants_sorted_descending() {
        let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new().with_success_after(3)));
        let task = demo_task();
        let config = AgentConfig::seed("agent", "prompt");

        let results = loop_.execute_with_variants(&task, &config, 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].final_quality_score >= results[1].final_quality_score);
        // 每个变体都是基配置的子代
        for variant in &results {
            assert_eq!(variant.config.parent_id.as_deref(), Some(config.id.as_str()));
        }
    }
}
