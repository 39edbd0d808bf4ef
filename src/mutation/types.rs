//! Agent 配置与变异谱系
//!
//! 配置是值对象：变异 / 交叉永远产出新 id 的新配置，version 在谱系内单调递增，
//! 父配置绝不原地修改。谱系通过 id / parent_id / version 追踪，可安全并发使用。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 变异策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    TemperatureAdjust,
    PromptRefine,
    TokenAdjust,
    RetryAdjust,
    Crossover,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::TemperatureAdjust => write!(f, "temperature_adjust"),
            MutationKind::PromptRefine => write!(f, "prompt_refine"),
            MutationKind::TokenAdjust => write!(f, "token_adjust"),
            MutationKind::RetryAdjust => write!(f, "retry_adjust"),
            MutationKind::Crossover => write!(f, "crossover"),
        }
    }
}

/// 产出本配置的变异记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub kind: MutationKind,
    /// 本次变异实际改动的字段名
    pub fields_changed: Vec<String>,
    pub magnitude: f64,
    /// 显式传入的随机种子（未传则为 None）
    pub seed: Option<u64>,
}

/// 重试策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Agent 运行时配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    /// 谱系内单调递增
    pub version: u32,
    pub parent_id: Option<String>,
    pub name: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub retry: RetryPolicy,
    /// 产出本配置的变异（根配置为 None）
    pub mutation: Option<MutationRecord>,
}

impl AgentConfig {
    /// 谱系根配置
    pub fn seed(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 1,
            parent_id: None,
            name: name.into(),
            temperature: 0.7,
            max_tokens: 2000,
            system_prompt: system_prompt.into(),
            retry: RetryPolicy::default(),
            mutation: None,
        }
    }

    /// 派生子配置：新 id、version+1、parent 指向自身；字段值先复制，由策略再改
    pub fn child(&self, mutation: MutationRecord) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: self.version + 1,
            parent_id: Some(self.id.clone()),
            mutation: Some(mutation),
            ..self.clone()
        }
    }
}
