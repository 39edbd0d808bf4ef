//! Molt - Rust 智能体元改进系统
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 错误分级（执行器失败 / 超时 / 契约错误）
//! - **executor**: 任务执行器契约与 Mock 实现
//! - **trace**: 执行轨迹数据模型与分析器（模式 / 瓶颈 / 根因 / 评分）
//! - **mutation**: Agent 配置、变异策略注册表与变异 / 交叉
//! - **benchmark**: 基准任务执行、套件聚合与统计对比
//! - **improve**: 分析结果 → 配置改动建议；跨轮学习日志
//! - **meta**: 尝试-分析-变异主循环与多变体并行搜索
//! - **observability**: tracing 初始化

pub mod benchmark;
pub mod config;
pub mod error;
pub mod executor;
pub mod improve;
pub mod meta;
pub mod mutation;
pub mod observability;
pub mod trace;

pub use error::MoltError;
pub use executor::{ExecutionContext, ExecutionOutcome, TaskExecutor, TaskSpec};
pub use meta::{MetaAgentLoop, MetaAgentResult, MetaTask};
pub use mutation::{AgentConfig, ConfigMutator};
pub use trace::{ExecutionTrace, TraceAnalyzer};
