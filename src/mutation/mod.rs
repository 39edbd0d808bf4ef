//! 变异层：Agent 配置、策略注册表与变异器

pub mod mutator;
pub mod strategies;
pub mod types;

pub use mutator::{ConfigMutator, MutateOptions};
pub use strategies::{default_registry, StrategyEntry, StrategyFn};
pub use types::{AgentConfig, MutationKind, MutationRecord, RetryPolicy};
