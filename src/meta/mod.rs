//! 元层：改进循环状态机与多变体搜索

pub mod events;
pub mod loop_;
pub mod types;

pub use events::{LoopPhase, MetaEvent};
pub use loop_::{MetaAgentLoop, MetaLoopOptions};
pub use types::{Attempt, MetaAgentResult, MetaTask, VariantResult};
