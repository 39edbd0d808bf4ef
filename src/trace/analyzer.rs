//! 轨迹分析器
//!
//! 纯函数：轨迹 → 模式 / 瓶颈 / 根因 / 质量与效率评分。
//! 三条独立启发式规则（重试循环、错误聚集、慢动作），各自产出置信度，
//! 置信度达到上报阈值（默认 0.6）才进入结果。无状态，可跨并发任务共享。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trace::types::{ExecutionTrace, TraceEventType};

/// 分析阈值（可配置常量，默认值即参考行为的观测边界）
#[derive(Debug, Clone)]
pub struct AnalyzerThresholds {
    /// 模式上报的置信度下限
    pub confidence_floor: f64,
    /// 慢动作判定阈值（毫秒）
    pub slow_action_ms: u64,
    /// 重试循环置信度饱和点：count / retry_saturation，5 次即 1.0
    pub retry_saturation: usize,
    /// 错误聚集的最小错误数
    pub error_cluster_min: usize,
}

impl Default for AnalyzerThresholds {
    fn default() -> Self {
        Self {
            confidence_floor: 0.6,
            slow_action_ms: 1000,
            retry_saturation: 5,
            error_cluster_min: 2,
        }
    }
}

/// 模式类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Inefficiency,
    ErrorCluster,
    Bottleneck,
}

/// 轨迹中检出的低效模式
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
    pub pattern_type: PatternType,
    pub confidence: f64,
    pub frequency: usize,
    pub event_types: Vec<String>,
    pub evidence: Vec<String>,
}

/// 瓶颈类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    SlowAction,
}

/// 单个事件级别的瓶颈（由慢动作一一对应派生）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub id: String,
    pub event_id: String,
    pub kind: BottleneckKind,
    /// [0,100]
    pub severity: f64,
    /// 超出慢动作阈值的部分
    pub duration_impact_ms: u64,
    pub description: String,
}

/// 根因类别（错误消息关键词分类）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootCauseCategory {
    InputValidation,
    Timeout,
    ResourceLimit,
    ExternalService,
    Unknown,
}

/// 附着在错误事件上的根因解释
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCause {
    pub id: String,
    pub error_event_id: String,
    pub category: RootCauseCategory,
    pub confidence: f64,
    pub factors: Vec<String>,
}

/// 单条轨迹的分析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceAnalysisResult {
    pub trace_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub patterns: Vec<Pattern>,
    pub bottlenecks: Vec<Bottleneck>,
    pub root_causes: Vec<RootCause>,
    /// [0,100]
    pub quality_score: f64,
    /// [0,100]
    pub efficiency_score: f64,
}

/// 多条轨迹的聚合分析
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiTraceAnalysis {
    pub trace_count: usize,
    pub success_rate: f64,
    pub individual_results: Vec<TraceAnalysisResult>,
    /// 在多于一条轨迹中出现的模式名
    pub recurring_patterns: Vec<String>,
}

/// 轨迹分析器
#[derive(Debug, Clone, Default)]
pub struct TraceAnalyzer {
    thresholds: AnalyzerThresholds,
}

impl TraceAnalyzer {
    pub fn new(thresholds: AnalyzerThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &AnalyzerThresholds {
        &self.thresholds
    }

    /// 分析一条轨迹
    pub fn analyze(&self, trace: &ExecutionTrace) -> TraceAnalysisResult {
        let mut patterns = Vec::new();

        if let Some(p) = self.detect_retry_loop(trace) {
            patterns.push(p);
        }
        if let Some(p) = self.detect_error_cluster(trace) {
            patterns.push(p);
        }
        let bottlenecks = self.derive_bottlenecks(trace);
        if let Some(p) = self.detect_slow_actions(trace) {
            patterns.push(p);
        }

        let root_causes = self.analyze_root_causes(trace);
        let quality_score = self.quality_score(trace);
        let efficiency_score = self.efficiency_score(trace, &bottlenecks);

        tracing::debug!(
            trace_id = %trace.id,
            patterns = patterns.len(),
            bottlenecks = bottlenecks.len(),
            quality = quality_score,
            "trace analyzed"
        );

        TraceAnalysisResult {
            trace_id: trace.id.clone(),
            analyzed_at: Utc::now(),
            patterns,
            bottlenecks,
            root_causes,
            quality_score,
            efficiency_score,
        }
    }

    /// 分析多条轨迹：逐条分析 + 聚合成功率 + 复现模式
    pub fn analyze_multiple(&self, traces: &[ExecutionTrace]) -> MultiTraceAnalysis {
        let individual_results: Vec<_> = traces.iter().map(|t| self.analyze(t)).collect();
        let success_count = traces.iter().filter(|t| t.success).count();
        let success_rate = if traces.is_empty() {
            0.0
        } else {
            success_count as f64 / traces.len() as f64
        };

        // 统计每个模式名出现在多少条轨迹中
        let mut seen: Vec<(String, usize)> = Vec::new();
        for result in &individual_results {
            for pattern in &result.patterns {
                match seen.iter_mut().find(|(name, _)| *name == pattern.name) {
                    Some((_, count)) => *count += 1,
                    None => seen.push((pattern.name.clone(), 1)),
                }
            }
        }
        let recurring_patterns = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name)
            .collect();

        MultiTraceAnalysis {
            trace_count: traces.len(),
            success_rate,
            individual_results,
            recurring_patterns,
        }
    }

    /// 重试循环：名为 retry-* 的 state_change 事件计数，confidence = min(count/5, 1.0)
    fn detect_retry_loop(&self, trace: &ExecutionTrace) -> Option<Pattern> {
        let retries: Vec<_> = trace
            .events
            .iter()
            .filter(|e| e.event_type == TraceEventType::StateChange && e.name.starts_with("retry-"))
            .collect();

        let confidence =
            (retries.len() as f64 / self.thresholds.retry_saturation as f64).min(1.0);
        if confidence < self.thresholds.confidence_floor {
            return None;
        }

        Some(Pattern {
            id: Uuid::new_v4().to_string(),
            name: "Retry Loop".to_string(),
            pattern_type: PatternType::Inefficiency,
            confidence,
            frequency: retries.len(),
            event_types: vec!["state_change".to_string()],
            evidence: retries.iter().map(|e| e.name.clone()).collect(),
        })
    }

    /// 错误聚集：两个及以上 error 事件即上报
    fn detect_error_cluster(&self, trace: &ExecutionTrace) -> Option<Pattern> {
        let errors: Vec<_> = trace
            .events
            .iter()
            .filter(|e| e.event_type == TraceEventType::Error)
            .collect();
        if errors.len() < self.thresholds.error_cluster_min {
            return None;
        }

        // 2 个错误恰好到上报下限，随错误数线性升至 1.0
        let confidence = (0.4 + 0.1 * errors.len() as f64).min(1.0);

        Some(Pattern {
            id: Uuid::new_v4().to_string(),
            name: "Error Cluster".to_string(),
            pattern_type: PatternType::ErrorCluster,
            confidence,
            frequency: errors.len(),
            event_types: vec!["error".to_string()],
            evidence: errors
                .iter()
                .map(|e| e.error.clone().unwrap_or_else(|| e.name.clone()))
                .collect(),
        })
    }

    /// 慢动作：duration 超阈值的 action_end，confidence = 慢动作数 / 动作总数
    fn detect_slow_actions(&self, trace: &ExecutionTrace) -> Option<Pattern> {
        let actions: Vec<_> = trace
            .events
            .iter()
            .filter(|e| e.event_type == TraceEventType::ActionEnd && e.duration_ms.is_some())
            .collect();
        let slow: Vec<_> = actions
            .iter()
            .filter(|e| e.duration_ms.unwrap_or(0) > self.thresholds.slow_action_ms)
            .collect();

        // 参考行为：至少 3 个慢动作才可能达到上报下限
        if slow.len() < 3 || actions.is_empty() {
            return None;
        }
        let confidence = slow.len() as f64 / actions.len() as f64;
        if confidence < self.thresholds.confidence_floor {
            return None;
        }

        Some(Pattern {
            id: Uuid::new_v4().to_string(),
            name: "Slow Actions".to_string(),
            pattern_type: PatternType::Bottleneck,
            confidence,
            frequency: slow.len(),
            event_types: vec!["action_end".to_string()],
            evidence: slow
                .iter()
                .map(|e| format!("{} ({} ms)", e.name, e.duration_ms.unwrap_or(0)))
                .collect(),
        })
    }

    /// 瓶颈与慢动作一一对应：impact = duration - 阈值，severity 随 impact 线性放大
    fn derive_bottlenecks(&self, trace: &ExecutionTrace) -> Vec<Bottleneck> {
        trace
            .events
            .iter()
            .filter(|e| e.event_type == TraceEventType::ActionEnd)
            .filter_map(|e| {
                let duration = e.duration_ms?;
                if duration <= self.thresholds.slow_action_ms {
                    return None;
                }
                let impact = duration - self.thresholds.slow_action_ms;
                let severity =
                    ((impact as f64 / self.thresholds.slow_action_ms as f64) * 50.0).min(100.0);
                Some(Bottleneck {
                    id: Uuid::new_v4().to_string(),
                    event_id: e.id.clone(),
                    kind: BottleneckKind::SlowAction,
                    severity,
                    duration_impact_ms: impact,
                    description: format!(
                        "Action '{}' took {} ms ({} ms over threshold)",
                        e.name, duration, impact
                    ),
                })
            })
            .collect()
    }

    /// 根因：对每个 error 事件的消息做关键词分类
    fn analyze_root_causes(&self, trace: &ExecutionTrace) -> Vec<RootCause> {
        trace
            .events
            .iter()
            .filter(|e| e.event_type == TraceEventType::Error)
            .map(|e| {
                let message = e.error.as_deref().unwrap_or("").to_lowercase();
                let (category, factors) = categorize_error(&message);
                let confidence = if category == RootCauseCategory::Unknown {
                    0.4
                } else {
                    0.8
                };
                RootCause {
                    id: Uuid::new_v4().to_string(),
                    error_event_id: e.id.clone(),
                    category,
                    confidence,
                    factors,
                }
            })
            .collect()
    }

    /// 质量分：成功基线 + 条件通过率，扣除错误与重试
    fn quality_score(&self, trace: &ExecutionTrace) -> f64 {
        let base = if trace.success { 70.0 } else { 30.0 };
        let score = base + trace.metrics.condition_pass_rate * 30.0
            - trace.metrics.error_count as f64 * 5.0
            - trace.metrics.retry_count as f64 * 3.0;
        score.clamp(0.0, 100.0)
    }

    /// 效率分：100 起步，扣除重试与慢动作超时部分
    fn efficiency_score(&self, trace: &ExecutionTrace, bottlenecks: &[Bottleneck]) -> f64 {
        let impact_ms: u64 = bottlenecks.iter().map(|b| b.duration_impact_ms).sum();
        let score = 100.0
            - trace.metrics.retry_count as f64 * 5.0
            - (impact_ms as f64 / self.thresholds.slow_action_ms as f64) * 10.0;
        score.clamp(0.0, 100.0)
    }
}

/// 错误消息 → (根因类别, 命中的关键词)
fn categorize_error(message: &str) -> (RootCauseCategory, Vec<String>) {
    // 小型关键词表，顺序即优先级
    const TAXONOMY: &[(&str, RootCauseCategory)] = &[
        ("missing required input", RootCauseCategory::InputValidation),
        ("invalid input", RootCauseCategory::InputValidation),
        ("validation", RootCauseCategory::InputValidation),
        ("timed out", RootCauseCategory::Timeout),
        ("timeout", RootCauseCategory::Timeout),
        ("out of memory", RootCauseCategory::ResourceLimit),
        ("limit exceeded", RootCauseCategory::ResourceLimit),
        ("connection", RootCauseCategory::ExternalService),
        ("unavailable", RootCauseCategory::ExternalService),
    ];

    for (keyword, category) in TAXONOMY {
        if message.contains(keyword) {
            return (*category, vec![keyword.to_string()]);
        }
    }
    (RootCauseCategory::Unknown, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::types::TraceEvent;

    fn analyzer() -> TraceAnalyzer {
        TraceAnalyzer::default()
    }

    fn trace_with_slow_actions(durations: &[u64]) -> ExecutionTrace {
        let events = durations
            .iter()
            .enumerate()
            .map(|(i, d)| TraceEvent::action_end(format!("action-{}", i), *d))
            .collect();
        ExecutionTrace::from_events(events, true)
    }

    #[test]
    fn test_slow_actions_pattern_and_impact() {
        let trace = trace_with_slow_actions(&[2000, 3000, 2500]);
        let result = analyzer().analyze(&trace);

        let pattern = result
            .patterns
            .iter()
            .find(|p| p.name == "Slow Actions")
            .expect("Slow Actions pattern");
        assert_eq!(pattern.pattern_type, PatternType::Bottleneck);
        assert_eq!(pattern.frequency, 3);

        let worst = result
            .bottlenecks
            .iter()
            .max_by_key(|b| b.duration_impact_ms)
            .unwrap();
        assert_eq!(worst.duration_impact_ms, 2000);
    }

    #[test]
    fn test_two_slow_actions_not_reported() {
        let trace = trace_with_slow_actions(&[2000, 3000]);
        let result = analyzer().analyze(&trace);
        assert!(result.patterns.iter().all(|p| p.name != "Slow Actions"));
        // 瓶颈仍然逐事件派生
        assert_eq!(result.bottlenecks.len(), 2);
    }

    fn trace_with_retries(count: usize) -> ExecutionTrace {
        let events = (0..count)
            .map(|i| TraceEvent::state_change(format!("retry-step-{}", i)))
            .collect();
        ExecutionTrace::from_events(events, false)
    }

    #[test]
    fn test_retry_loop_confidence_boundaries() {
        let result = analyzer().analyze(&trace_with_retries(3));
        let pattern = result
            .patterns
            .iter()
            .find(|p| p.name == "Retry Loop")
            .expect("Retry Loop pattern");
        assert!((pattern.confidence - 0.6).abs() < 1e-9);

        let result = analyzer().analyze(&trace_with_retries(5));
        let pattern = result
            .patterns
            .iter()
            .find(|p| p.name == "Retry Loop")
            .unwrap();
        assert!((pattern.confidence - 1.0).abs() < 1e-9);

        // 2 次重试低于上报下限
        let result = analyzer().analyze(&trace_with_retries(2));
        assert!(result.patterns.iter().all(|p| p.name != "Retry Loop"));
    }

    #[test]
    fn test_error_cluster_and_root_cause() {
        let events = vec![
            TraceEvent::error("validate", "missing required input: user_id"),
            TraceEvent::error("fetch", "connection refused"),
        ];
        let trace = ExecutionTrace::from_events(events, false);
        let result = analyzer().analyze(&trace);

        let pattern = result
            .patterns
            .iter()
            .find(|p| p.pattern_type == PatternType::ErrorCluster)
            .expect("Error Cluster pattern");
        assert_eq!(pattern.frequency, 2);
        assert!(pattern.confidence >= 0.6);

        assert_eq!(result.root_causes.len(), 2);
        assert_eq!(
            result.root_causes[0].category,
            RootCauseCategory::InputValidation
        );
        assert_eq!(
            result.root_causes[1].category,
            RootCauseCategory::ExternalService
        );
    }

    #[test]
    fn test_scores_clamped() {
        let mut events = Vec::new();
        for i in 0..30 {
            events.push(TraceEvent::error(format!("step-{}", i), "boom"));
            events.push(TraceEvent::state_change(format!("retry-{}", i)));
        }
        let trace = ExecutionTrace::from_events(events, false);
        let result = analyzer().analyze(&trace);
        assert!(result.quality_score >= 0.0);
        assert!(result.efficiency_score >= 0.0);
    }

    #[test]
    fn test_analyze_multiple_success_rate_and_recurring() {
        let ok = trace_with_slow_actions(&[100, 200]);
        let mut t1 = trace_with_retries(4);
        t1.success = true;
        let t2 = trace_with_retries(5);
        let traces = vec![ok, t1, t2];
        let multi = analyzer().analyze_multiple(&traces);
        assert_eq!(multi.trace_count, 3);
        assert!((multi.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(multi
            .recurring_patterns
            .contains(&"Retry Loop".to_string()));
    }
}
