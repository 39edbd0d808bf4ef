//! 基准层：任务执行、套件聚合与统计对比

pub mod compare;
pub mod runner;
pub mod tasks;
pub mod types;

pub use compare::{compare, SIGNIFICANCE_FLOOR};
pub use runner::{BenchmarkOptions, BenchmarkRunner, ProgressFn};
pub use tasks::{
    correctness_task, edge_case_task, performance_task, reliability_task, DEFAULT_TIMEOUT_MS,
};
pub use types::{
    AggregateMetric, BenchmarkComparison, BenchmarkResult, BenchmarkSuiteResult, BenchmarkTask,
    MetricChange, MetricKind, OutputValidator, TaskCategory, TaskComparison,
};
