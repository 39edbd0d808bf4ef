//! 执行器契约
//!
//! 核心只消费这一个 trait：调用方注入执行器，产出 {成败, 输出, 轨迹}。
//! 执行上下文原样透传，核心不读不改。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MoltError;
use crate::mutation::AgentConfig;
use crate::trace::ExecutionTrace;

/// 交给执行器的任务形状（基准任务与元任务都折算到这里）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    pub input: Value,
}

/// 不透明执行上下文，核心透传不修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub scope_id: String,
    pub task_id: String,
    pub inputs: Value,
    pub state: Value,
    pub artifacts: Value,
    pub start_time: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(scope_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            task_id: task_id.into(),
            inputs: Value::Null,
            state: Value::Null,
            artifacts: Value::Null,
            start_time: Utc::now(),
        }
    }
}

/// 一次执行的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub output: Option<Value>,
    pub trace: Option<ExecutionTrace>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            trace: None,
            error: Some(error.into()),
        }
    }
}

/// 任务执行器：异步、由调用方提供，可能抛错或超时
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        task: &TaskSpec,
        config: &AgentConfig,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionOutcome, MoltError>;
}
