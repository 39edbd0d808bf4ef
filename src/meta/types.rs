//! 元任务与结果类型

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::improve::Learning;
use crate::mutation::AgentConfig;
use crate::trace::ExecutionTrace;

/// 驱动改进循环的元任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaTask {
    pub id: String,
    pub description: String,
    pub input: Value,
    /// 质量达标线 [0,100]
    pub quality_threshold: f64,
    pub max_attempts: usize,
    /// 单次尝试的硬超时
    pub attempt_timeout_ms: u64,
    /// 循环级超时：只在两次尝试之间检查，不抢占在途尝试
    pub overall_timeout_ms: Option<u64>,
}

impl MetaTask {
    pub fn new(description: impl Into<String>, input: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            input,
            quality_threshold: 70.0,
            max_attempts: 5,
            attempt_timeout_ms: 30_000,
            overall_timeout_ms: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_attempt_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.attempt_timeout_ms = timeout_ms;
        self
    }

    pub fn with_overall_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.overall_timeout_ms = Some(timeout_ms);
        self
    }
}

/// 一次尝试：配置快照 + 输出 + 轨迹 + 质量分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    /// 从 1 计
    pub index: usize,
    pub config: AgentConfig,
    pub output: Option<Value>,
    pub trace: Option<ExecutionTrace>,
    pub quality_score: f64,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// 元任务的整体结果；即使没有尝试达标也完整返回
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaAgentResult {
    pub task_id: String,
    pub attempts: Vec<Attempt>,
    /// 质量分最高的尝试
    pub best_attempt: Option<Attempt>,
    /// 是否达到质量门槛
    pub success: bool,
    pub total_duration_ms: u64,
    pub learnings: Vec<Learning>,
}

/// 多变体搜索的单个结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantResult {
    pub config: AgentConfig,
    pub result: MetaAgentResult,
    pub final_quality_score: f64,
}
