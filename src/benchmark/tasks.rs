//! 标准基准任务构造器
//!
//! 四类任务的工厂：正确性 / 性能 / 可靠性 / 边界用例。
//! 产出纯数据（无校验函数），JSON 可序列化，只声明各自关心的维度与超时。

use serde_json::Value;
use uuid::Uuid;

use crate::benchmark::types::{BenchmarkTask, MetricKind, TaskCategory};

/// 默认单任务超时
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

fn base_task(
    name: impl Into<String>,
    category: TaskCategory,
    description: impl Into<String>,
    input: Value,
) -> BenchmarkTask {
    BenchmarkTask {
        id: Uuid::new_v4().to_string(),
        name: name.into(),
        category,
        description: description.into(),
        input,
        metrics: Vec::new(),
        timeout_ms: DEFAULT_TIMEOUT_MS,
        difficulty: 2,
        validator: None,
    }
}

/// 正确性任务：success_rate + output_quality
pub fn correctness_task(
    name: impl Into<String>,
    description: impl Into<String>,
    input: Value,
) -> BenchmarkTask {
    let mut task = base_task(name, TaskCategory::Correctness, description, input);
    task.metrics = vec![MetricKind::SuccessRate, MetricKind::OutputQuality];
    task
}

/// 性能任务：execution_time + token_usage + success_rate，支持自定义超时
pub fn performance_task(
    name: impl Into<String>,
    description: impl Into<String>,
    input: Value,
    timeout_ms: u64,
) -> BenchmarkTask {
    let mut task = base_task(name, TaskCategory::Performance, description, input);
    task.metrics = vec![
        MetricKind::ExecutionTime,
        MetricKind::TokenUsage,
        MetricKind::SuccessRate,
    ];
    task.timeout_ms = timeout_ms;
    task
}

/// 可靠性任务：success_rate + retry_count + condition_pass_rate
pub fn reliability_task(
    name: impl Into<String>,
    description: impl Into<String>,
    input: Value,
) -> BenchmarkTask {
    let mut task = base_task(name, TaskCategory::Reliability, description, input);
    task.metrics = vec![
        MetricKind::SuccessRate,
        MetricKind::RetryCount,
        MetricKind::ConditionPassRate,
    ];
    task.difficulty = 3;
    task
}

/// 边界用例：success_rate + output_quality，难度 4
pub fn edge_case_task(
    name: impl Into<String>,
    description: impl Into<String>,
    input: Value,
) -> BenchmarkTask {
    let mut task = base_task(name, TaskCategory::EdgeCase, description, input);
    task.metrics = vec![MetricKind::SuccessRate, MetricKind::OutputQuality];
    task.difficulty = 4;
    task
}
