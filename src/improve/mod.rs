//! 改进层：建议引擎与跨轮学习日志

pub mod learning;
pub mod strategies;

pub use learning::{Learning, LearningLog, LearningQuery};
pub use strategies::{
    default_weights, Action, ActionKind, ImprovementStrategies, Recommendation, StrategyKind,
};
