//! 基准执行器
//!
//! 单任务：超时竞速 + 失败重试；套件：按 concurrency 分批并发，整批落定再开下一批，
//! 批内结果顺序与任务输入顺序一致。任务级失败只记入结果，绝不中断套件。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use uuid::Uuid;

use crate::benchmark::types::{
    AggregateMetric, BenchmarkResult, BenchmarkSuiteResult, BenchmarkTask, MetricKind,
};
use crate::error::MoltError;
use crate::executor::{ExecutionContext, ExecutionOutcome, TaskExecutor, TaskSpec};
use crate::mutation::AgentConfig;

/// 套件进度回调 (completed, total)
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// 执行选项
#[derive(Clone)]
pub struct BenchmarkOptions {
    /// 批内并发上限
    pub concurrency: usize,
    /// 失败（含超时）是否重试
    pub retry_failed: bool,
    /// 每个任务的最大重试次数
    pub max_retries: u32,
}

impl Default for BenchmarkOptions {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_failed: true,
            max_retries: 2,
        }
    }
}

/// 基准执行器
pub struct BenchmarkRunner {
    executor: Arc<dyn TaskExecutor>,
    options: BenchmarkOptions,
    progress: Option<ProgressFn>,
}

impl BenchmarkRunner {
    pub fn new(executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            executor,
            options: BenchmarkOptions::default(),
            progress: None,
        }
    }

    pub fn with_options(mut self, options: BenchmarkOptions) -> Self {
        self.options = options;
        self
    }

    /// 设置套件进度回调
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// 执行单个基准任务
    ///
    /// Err 仅出现在任务定义非法时（契约错误）；执行器失败与超时都记入结果返回。
    pub async fn run_task(
        &self,
        task: &BenchmarkTask,
        config: &AgentConfig,
        ctx: &ExecutionContext,
    ) -> Result<BenchmarkResult, MoltError> {
        if task.timeout_ms == 0 {
            return Err(MoltError::InvalidTask(format!(
                "task '{}' has zero timeout",
                task.id
            )));
        }

        let spec = TaskSpec {
            id: task.id.clone(),
            description: task.description.clone(),
            input: task.input.clone(),
        };
        let max_attempts = if self.options.retry_failed {
            1 + self.options.max_retries
        } else {
            1
        };

        let started = Instant::now();
        let mut retries_used: u32 = 0;
        let mut last: Option<ExecutionOutcome> = None;

        for attempt in 1..=max_attempts {
            let raced = tokio::time::timeout(
                Duration::from_millis(task.timeout_ms),
                self.executor.execute(&spec, config, ctx),
            )
            .await;

            let outcome = match raced {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => ExecutionOutcome::failure(e.to_string()),
                // 超时与执行器抛错是不同类别，但走同一条重试路径
                Err(_) => ExecutionOutcome::failure(
                    MoltError::Timeout(task.timeout_ms).to_string(),
                ),
            };

            let done = outcome.success;
            last = Some(outcome);
            if done {
                break;
            }
            if attempt < max_attempts {
                retries_used += 1;
                tracing::debug!(task = %task.id, attempt, "benchmark task retry");
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let outcome = last.unwrap_or_else(|| ExecutionOutcome::failure("executor never ran"));

        let quality_score = match &outcome.output {
            Some(output) => self.evaluate_quality(task, output),
            None => 0.0,
        };

        let mut metrics = HashMap::new();
        metrics.insert(MetricKind::ExecutionTime, duration_ms as f64);
        metrics.insert(
            MetricKind::SuccessRate,
            if outcome.success { 1.0 } else { 0.0 },
        );
        metrics.insert(MetricKind::OutputQuality, quality_score);
        metrics.insert(MetricKind::RetryCount, retries_used as f64);
        // token 用量以轨迹总耗时为代理
        metrics.insert(
            MetricKind::TokenUsage,
            outcome
                .trace
                .as_ref()
                .map(|t| t.metrics.total_duration_ms as f64)
                .unwrap_or(0.0),
        );
        metrics.insert(
            MetricKind::ConditionPassRate,
            outcome
                .trace
                .as_ref()
                .map(|t| t.metrics.condition_pass_rate)
                .unwrap_or(0.0),
        );

        Ok(BenchmarkResult {
            task_id: task.id.clone(),
            config_id: config.id.clone(),
            success: outcome.success,
            output: outcome.output,
            error: outcome.error,
            duration_ms,
            quality_score,
            retries_used,
            metrics,
        })
    }

    /// 输出质量评分
    ///
    /// 有输出保底 50；校验通过 +40，无校验器 +20，校验器自身出错 -10；
    /// 输出键数最多再加 10；最终夹在 [0,100]。
    fn evaluate_quality(&self, task: &BenchmarkTask, output: &Value) -> f64 {
        let mut score: f64 = 50.0;

        match &task.validator {
            Some(validator) => match validator(output) {
                Ok(true) => score += 40.0,
                Ok(false) => {}
                Err(reason) => {
                    tracing::warn!(task = %task.id, %reason, "validator failed, penalizing");
                    score -= 10.0;
                }
            },
            None => score += 20.0,
        }

        if let Some(map) = output.as_object() {
            score += ((map.len() as f64) * 2.0).min(10.0);
        }

        score.clamp(0.0, 100.0)
    }

    /// 执行任务套件：分批并发，批序即任务序
    pub async fn run_suite(
        &self,
        tasks: &[BenchmarkTask],
        config: &AgentConfig,
        ctx: &ExecutionContext,
    ) -> Result<BenchmarkSuiteResult, MoltError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let concurrency = self.options.concurrency.max(1);

        let mut results = Vec::with_capacity(tasks.len());
        let mut completed = 0usize;

        for batch in tasks.chunks(concurrency) {
            // join_all 保证批内结果顺序与输入顺序一致
            let futures = batch.iter().map(|task| self.run_task(task, config, ctx));
            for result in join_all(futures).await {
                results.push(result?);
            }
            completed += batch.len();
            if let Some(progress) = &self.progress {
                progress(completed, tasks.len());
            }
            tracing::info!(completed, total = tasks.len(), "benchmark batch settled");
        }

        let success_count = results.iter().filter(|r| r.success).count();
        let success_rate = if results.is_empty() {
            0.0
        } else {
            success_count as f64 / results.len() as f64
        };
        let aggregates = aggregate_metrics(&results);

        Ok(BenchmarkSuiteResult {
            id: Uuid::new_v4().to_string(),
            config_id: config.id.clone(),
            started_at,
            total_duration_ms: started.elapsed().as_millis() as u64,
            results,
            success_count,
            success_rate,
            aggregates,
        })
    }
}

/// 每个维度的 {min, max, avg, median, std_dev}
fn aggregate_metrics(results: &[BenchmarkResult]) -> HashMap<MetricKind, AggregateMetric> {
    let mut grouped: HashMap<MetricKind, Vec<f64>> = HashMap::new();
    for result in results {
        for (kind, value) in &result.metrics {
            grouped.entry(*kind).or_default().push(*value);
        }
    }

    grouped
        .into_iter()
        .map(|(kind, mut values)| {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let n = values.len() as f64;
            let min = values.first().copied().unwrap_or(0.0);
            let max = values.last().copied().unwrap_or(0.0);
            let avg = values.iter().sum::<f64>() / n;
            let median = if values.len() % 2 == 1 {
                values[values.len() / 2]
            } else {
                (values[values.len() / 2 - 1] + values[values.len() / 2]) / 2.0
            };
            let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / n;
            let std_dev = variance.sqrt();
            (
                kind,
                AggregateMetric {
                    min,
                    max,
                    avg,
                    median,
                    std_dev,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::tasks::{correctness_task, reliability_task};
    use crate::executor::MockExecutor;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (BenchmarkRunner, AgentConfig, ExecutionContext) {
        let runner = BenchmarkRunner::new(Arc::new(MockExecutor::new()));
        let config = AgentConfig::seed("bench", "prompt");
        let ctx = ExecutionContext::new("scope", "bench");
        (runner, config, ctx)
    }

    #[tokio::test]
    async fn test_run_task_validator_pass_scores_high() {
        let (runner, config, ctx) = setup();
        let mut task = correctness_task("ok", "always passes", json!({}));
        task.validator = Some(Arc::new(|_| Ok(true)));

        let result = runner.run_task(&task, &config, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.quality_score >= 90.0);
    }

    #[tokio::test]
    async fn test_run_task_no_validator_baseline() {
        let (runner, config, ctx) = setup();
        let task = correctness_task("plain", "no validator", json!({}));
        let result = runner.run_task(&task, &config, &ctx).await.unwrap();
        assert!(result.quality_score >= 70.0);
    }

    #[tokio::test]
    async fn test_run_task_validator_error_penalized() {
        let (runner, config, ctx) = setup();
        let mut task = correctness_task("err", "validator throws", json!({}));
        task.validator = Some(Arc::new(|_| Err("validator exploded".to_string())));
        let result = runner.run_task(&task, &config, &ctx).await.unwrap();
        // 校验器出错只是扣分，不判任务失败
        assert!(result.success);
        assert!(result.quality_score < 70.0);
    }

    #[tokio::test]
    async fn test_run_task_zero_timeout_is_fatal() {
        let (runner, config, ctx) = setup();
        let mut task = correctness_task("bad", "zero timeout", json!({}));
        task.timeout_ms = 0;
        let err = runner.run_task(&task, &config, &ctx).await.unwrap_err();
        assert!(matches!(err, MoltError::InvalidTask(_)));
    }

    #[tokio::test]
    async fn test_run_task_retries_until_success() {
        let config = AgentConfig::seed("bench", "prompt");
        let ctx = ExecutionContext::new("scope", "bench");
        let exec = Arc::new(MockExecutor::new().with_success_after(2));
        let runner = BenchmarkRunner::new(exec.clone());

        let task = correctness_task("flaky", "fails once", json!({}));
        let result = runner.run_task(&task, &config, &ctx).await.unwrap();
        assert!(result.success);
        assert_eq!(result.retries_used, 1);
        assert_eq!(exec.call_count(), 2);
    }

    #[tokio::test]
    async fn test_run_task_timeout_recorded_not_thrown() {
        let config = AgentConfig::seed("bench", "prompt");
        let ctx = ExecutionContext::new("scope", "bench");
        let exec = Arc::new(MockExecutor::new().with_delay_ms(200));
        let runner = BenchmarkRunner::new(exec).with_options(BenchmarkOptions {
            retry_failed: false,
            ..Default::default()
        });

        let mut task = correctness_task("slow", "too slow", json!({}));
        task.timeout_ms = 20;
        let result = runner.run_task(&task, &config, &ctx).await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_run_suite_order_and_progress() {
        let config = AgentConfig::seed("bench", "prompt");
        let ctx = ExecutionContext::new("scope", "bench");
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = seen.clone();
        let runner = BenchmarkRunner::new(Arc::new(MockExecutor::new()))
            .with_progress(Arc::new(move |completed, _total| {
                seen_cb.store(completed, Ordering::SeqCst);
            }));

        let tasks = vec![
            reliability_task("r1", "first", json!({})),
            reliability_task("r2", "second", json!({})),
            reliability_task("r3", "third", json!({})),
        ];
        let suite = runner.run_suite(&tasks, &config, &ctx).await.unwrap();

        assert_eq!(suite.success_count, 3);
        assert!((suite.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        // 结果顺序与任务顺序一致
        let ids: Vec<&str> = suite.results.iter().map(|r| r.task_id.as_str()).collect();
        let expected: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(suite.aggregates.contains_key(&MetricKind::SuccessRate));
    }
}
