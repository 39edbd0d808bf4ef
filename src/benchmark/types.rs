//! 基准测试数据模型
//!
//! 任务 / 结果 / 套件结果 / 对比全部按值引用 task id 与 config id，
//! 不持有活引用，JSON 可序列化（输出校验函数除外，序列化时跳过）。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 衡量维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    ExecutionTime,
    SuccessRate,
    OutputQuality,
    TokenUsage,
    RetryCount,
    ConditionPassRate,
}

impl MetricKind {
    /// 数值越低越好的维度（对比时符号取反）
    pub fn lower_is_better(&self) -> bool {
        matches!(self, MetricKind::ExecutionTime | MetricKind::RetryCount)
    }

    /// 总体改进加权
    pub fn weight(&self) -> f64 {
        match self {
            MetricKind::SuccessRate => 3.0,
            MetricKind::OutputQuality => 2.0,
            MetricKind::ConditionPassRate => 1.5,
            MetricKind::ExecutionTime => 1.0,
            MetricKind::RetryCount => 0.5,
            MetricKind::TokenUsage => 0.5,
        }
    }
}

/// 任务类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Correctness,
    Performance,
    Reliability,
    EdgeCase,
}

/// 输出校验：Ok(true) 通过 / Ok(false) 未通过 / Err 视为校验器自身出错（扣分不判败）
pub type OutputValidator = Arc<dyn Fn(&Value) -> Result<bool, String> + Send + Sync>;

/// 基准任务
#[derive(Clone, Serialize, Deserialize)]
pub struct BenchmarkTask {
    pub id: String,
    pub name: String,
    pub category: TaskCategory,
    pub description: String,
    pub input: Value,
    /// 声明要统计的维度
    pub metrics: Vec<MetricKind>,
    pub timeout_ms: u64,
    /// 1-5
    pub difficulty: u8,
    /// 期望输出校验（纯数据任务为 None）
    #[serde(skip)]
    pub validator: Option<OutputValidator>,
}

impl std::fmt::Debug for BenchmarkTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("timeout_ms", &self.timeout_ms)
            .field("difficulty", &self.difficulty)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// 单任务结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub task_id: String,
    pub config_id: String,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
    /// [0,100]
    pub quality_score: f64,
    pub retries_used: u32,
    pub metrics: HashMap<MetricKind, f64>,
}

/// 某一维度的聚合统计
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMetric {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub median: f64,
    pub std_dev: f64,
}

/// 套件结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSuiteResult {
    pub id: String,
    pub config_id: String,
    pub started_at: DateTime<Utc>,
    pub total_duration_ms: u64,
    pub results: Vec<BenchmarkResult>,
    pub success_count: usize,
    pub success_rate: f64,
    pub aggregates: HashMap<MetricKind, AggregateMetric>,
}

/// 单维度变化
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricChange {
    pub baseline_avg: f64,
    pub candidate_avg: f64,
    /// 原始百分比变化（基线 → 候选）
    pub percent_change: f64,
    /// 方向归一后的改进量（正 = 候选更好）
    pub improvement: f64,
}

/// 按 task id 配对的任务级对比
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskComparison {
    pub task_id: String,
    pub baseline_quality: f64,
    pub candidate_quality: f64,
    pub delta: f64,
}

/// 两份套件结果的对比
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub baseline_suite_id: String,
    pub candidate_suite_id: String,
    pub metric_changes: HashMap<MetricKind, MetricChange>,
    pub task_comparisons: Vec<TaskComparison>,
    /// 加权平均改进量
    pub overall_improvement: f64,
    /// [0,1] 显著性
    pub significance: f64,
    pub candidate_is_better: bool,
}
