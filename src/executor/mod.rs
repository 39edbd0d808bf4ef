//! 执行器层：契约 trait 与 Mock 实现

pub mod mock;
pub mod traits;

pub use mock::MockExecutor;
pub use traits::{ExecutionContext, ExecutionOutcome, TaskExecutor, TaskSpec};
