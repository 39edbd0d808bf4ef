//! 执行轨迹数据模型
//!
//! 一次任务执行产生一条 ExecutionTrace：有序事件序列 + 汇总指标 + 成败标记。
//! 由执行器产出后不可变，分析侧只读。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 轨迹事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceEventType {
    StateChange,
    ActionStart,
    ActionEnd,
    Error,
    ConditionCheck,
    Retry,
}

/// 单条轨迹事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub id: String,
    pub event_type: TraceEventType,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    /// 仅 action_end 类事件携带耗时
    pub duration_ms: Option<u64>,
    /// 仅 error 类事件携带错误消息
    pub error: Option<String>,
}

impl TraceEvent {
    pub fn new(event_type: TraceEventType, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            name: name.into(),
            timestamp: Utc::now(),
            duration_ms: None,
            error: None,
        }
    }

    /// 状态切换事件
    pub fn state_change(name: impl Into<String>) -> Self {
        Self::new(TraceEventType::StateChange, name)
    }

    /// 动作结束事件（带耗时）
    pub fn action_end(name: impl Into<String>, duration_ms: u64) -> Self {
        let mut ev = Self::new(TraceEventType::ActionEnd, name);
        ev.duration_ms = Some(duration_ms);
        ev
    }

    /// 错误事件（带错误消息）
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut ev = Self::new(TraceEventType::Error, name);
        ev.error = Some(message.into());
        ev
    }
}

/// 轨迹汇总指标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceMetrics {
    pub total_duration_ms: u64,
    pub state_transitions: usize,
    pub error_count: usize,
    pub retry_count: usize,
    pub condition_checks: usize,
    /// 条件检查通过率 [0,1]
    pub condition_pass_rate: f64,
    pub avg_action_duration_ms: f64,
    /// 每个状态的停留时长
    pub state_time_ms: HashMap<String, u64>,
}

/// 一次执行的完整轨迹
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub id: String,
    pub events: Vec<TraceEvent>,
    pub metrics: TraceMetrics,
    pub success: bool,
}

impl ExecutionTrace {
    /// 从事件列表构建轨迹，自动汇总指标（执行器侧的便捷构造）
    pub fn from_events(events: Vec<TraceEvent>, success: bool) -> Self {
        let metrics = summarize(&events);
        Self {
            id: Uuid::new_v4().to_string(),
            events,
            metrics,
            success,
        }
    }
}

/// 从事件序列汇总指标
fn summarize(events: &[TraceEvent]) -> TraceMetrics {
    let mut metrics = TraceMetrics::default();
    let mut action_total: u64 = 0;
    let mut action_count: usize = 0;
    let mut condition_passed: usize = 0;

    for ev in events {
        match ev.event_type {
            TraceEventType::StateChange => {
                metrics.state_transitions += 1;
                if ev.name.starts_with("retry-") {
                    metrics.retry_count += 1;
                }
            }
            TraceEventType::ActionEnd => {
                if let Some(d) = ev.duration_ms {
                    action_total += d;
                    action_count += 1;
                }
            }
            TraceEventType::Error => metrics.error_count += 1,
            TraceEventType::Retry => metrics.retry_count += 1,
            TraceEventType::ConditionCheck => {
                metrics.condition_checks += 1;
                // 约定：通过的条件检查不携带 error
                if ev.error.is_none() {
                    condition_passed += 1;
                }
            }
            TraceEventType::ActionStart => {}
        }
    }

    metrics.total_duration_ms = action_total;
    if action_count > 0 {
        metrics.avg_action_duration_ms = action_total as f64 / action_count as f64;
    }
    if metrics.condition_checks > 0 {
        metrics.condition_pass_rate = condition_passed as f64 / metrics.condition_checks as f64;
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_counts() {
        let events = vec![
            TraceEvent::state_change("planning"),
            TraceEvent::state_change("retry-fetch"),
            TraceEvent::action_end("fetch", 400),
            TraceEvent::action_end("parse", 200),
            TraceEvent::error("fetch", "connection refused"),
        ];
        let trace = ExecutionTrace::from_events(events, false);
        assert_eq!(trace.metrics.state_transitions, 2);
        assert_eq!(trace.metrics.retry_count, 1);
        assert_eq!(trace.metrics.error_count, 1);
        assert_eq!(trace.metrics.total_duration_ms, 600);
        assert!((trace.metrics.avg_action_duration_ms - 300.0).abs() < f64::EPSILON);
    }
}
