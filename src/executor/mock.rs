//! Mock 执行器（用于测试与演示，无需真实 Agent 运行时）
//!
//! 按调用次数演进：前 success_after-1 次失败并产出带重试 / 错误事件的脏轨迹，
//! 之后成功并产出干净轨迹。便于本地跑通改进循环。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::error::MoltError;
use crate::executor::traits::{ExecutionContext, ExecutionOutcome, TaskExecutor, TaskSpec};
use crate::mutation::AgentConfig;
use crate::trace::{ExecutionTrace, TraceEvent, TraceEventType};

/// Mock 执行器：第 success_after 次调用起成功
pub struct MockExecutor {
    success_after: usize,
    delay_ms: u64,
    calls: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            success_after: 1,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// 从第 n 次调用起成功（n 从 1 计）
    pub fn with_success_after(mut self, n: usize) -> Self {
        self.success_after = n.max(1);
        self
    }

    /// 每次调用的模拟耗时
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn success_trace(&self) -> ExecutionTrace {
        let mut events = vec![
            TraceEvent::state_change("planning"),
            TraceEvent::state_change("acting"),
            TraceEvent::action_end("plan", 120),
            TraceEvent::action_end("act", 300),
        ];
        for _ in 0..4 {
            let ev = TraceEvent::new(TraceEventType::ConditionCheck, "precondition");
            events.push(ev);
        }
        ExecutionTrace::from_events(events, true)
    }

    fn failure_trace(&self) -> ExecutionTrace {
        let mut events = vec![
            TraceEvent::state_change("planning"),
            TraceEvent::state_change("retry-plan"),
            TraceEvent::state_change("retry-act"),
            TraceEvent::state_change("retry-act"),
            TraceEvent::action_end("act", 1800),
            TraceEvent::error("act", "missing required input: goal"),
            TraceEvent::error("act", "connection refused by tool backend"),
        ];
        // 条件检查大多失败
        for i in 0..4 {
            let mut ev = TraceEvent::new(TraceEventType::ConditionCheck, "precondition");
            if i > 0 {
                ev.error = Some("condition failed".to_string());
            }
            events.push(ev);
        }
        ExecutionTrace::from_events(events, false)
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    async fn execute(
        &self,
        task: &TaskSpec,
        _config: &AgentConfig,
        _ctx: &ExecutionContext,
    ) -> Result<ExecutionOutcome, MoltError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call >= self.success_after {
            Ok(ExecutionOutcome {
                success: true,
                output: Some(json!({
                    "task": task.id,
                    "answer": format!("completed: {}", task.description),
                    "steps": 2,
                })),
                trace: Some(self.success_trace()),
                error: None,
            })
        } else {
            Ok(ExecutionOutcome {
                success: false,
                output: None,
                trace: Some(self.failure_trace()),
                error: Some("missing required input: goal".to_string()),
            })
        }
    }
}
