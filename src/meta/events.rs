//! 改进循环过程事件：通过可选 mpsc 通道推送，不依赖进程级事件总线

use serde::Serialize;

use crate::mutation::MutationKind;

/// 循环阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Attempting,
    Analyzing,
    Mutating,
    Done,
}

/// 过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetaEvent {
    /// 开始第 attempt 次尝试
    AttemptStarted { attempt: usize, max_attempts: usize },
    /// 一次尝试结束
    AttemptFinished {
        attempt: usize,
        quality_score: f64,
        success: bool,
    },
    /// 状态机阶段切换
    PhaseChanged { phase: LoopPhase },
    /// 达到质量门槛
    ThresholdReached { attempt: usize, quality_score: f64 },
    /// 为下一次尝试应用了变异
    MutationApplied {
        kind: MutationKind,
        fields_changed: Vec<String>,
    },
    /// 循环结束
    LoopFinished {
        attempts: usize,
        best_quality: f64,
        success: bool,
    },
}
