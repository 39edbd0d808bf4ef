//! 核心错误类型
//!
//! 错误分级：执行器失败 / 超时（与执行器抛错区分）按重试策略处理并记入结果；
//! 任务定义非法属于编程契约错误，直接向上传播。

use thiserror::Error;

/// 改进核心的错误类型
#[derive(Error, Debug)]
pub enum MoltError {
    /// 执行器抛错或返回失败（可重试，最终记入 result.error）
    #[error("Executor failed: {0}")]
    ExecutorFailed(String),

    /// 单次执行超时（与执行器自身抛错是不同的错误类别，同样受重试策略约束）
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// 任务定义非法（如 timeout_ms = 0、max_attempts = 0），契约错误，不可恢复
    #[error("Invalid task definition: {0}")]
    InvalidTask(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
