//! 演示入口：Mock 执行器 + 改进循环 + 基准对比

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use molt::benchmark::{
    compare, correctness_task, reliability_task, BenchmarkOptions, BenchmarkRunner,
};
use molt::config::load_config;
use molt::executor::{ExecutionContext, MockExecutor};
use molt::meta::{MetaAgentLoop, MetaTask};
use molt::mutation::AgentConfig;
use molt::trace::{AnalyzerThresholds, TraceAnalyzer};

#[tokio::main]
async fn main() -> Result<()> {
    molt::observability::init();
    let app_config = load_config(None)?;

    let base = AgentConfig::seed("demo-agent", "You are a careful task-solving agent.");

    // 改进循环：Mock 执行器第 3 次调用起成功
    let loop_ = MetaAgentLoop::new(Arc::new(MockExecutor::new().with_success_after(3)))
        .with_analyzer(TraceAnalyzer::new(AnalyzerThresholds::from(
            &app_config.analyzer,
        )));
    let task = MetaTask::new("answer the demo question", json!({"goal": "demo"}))
        .with_threshold(app_config.meta.quality_threshold)
        .with_max_attempts(app_config.meta.max_attempts)
        .with_attempt_timeout_ms(app_config.meta.attempt_timeout_ms);

    let result = loop_.execute(&task, &base).await?;
    tracing::info!(
        attempts = result.attempts.len(),
        success = result.success,
        best = result
            .best_attempt
            .as_ref()
            .map(|a| a.quality_score)
            .unwrap_or(0.0),
        learnings = result.learnings.len(),
        "improvement loop finished"
    );

    // 基准对比：基线配置 vs 循环产出的最优配置
    let tasks = vec![
        correctness_task("echo", "echo the input", json!({"text": "hi"})),
        reliability_task("flaky-io", "read through a flaky backend", json!({})),
        correctness_task("sum", "sum two numbers", json!({"a": 1, "b": 2})),
    ];
    let ctx = ExecutionContext::new("demo", "suite");
    let runner = BenchmarkRunner::new(Arc::new(MockExecutor::new()))
        .with_options(BenchmarkOptions::from(&app_config.benchmark))
        .with_progress(Arc::new(|completed, total| {
            tracing::info!(completed, total, "suite progress");
        }));

    let baseline = runner.run_suite(&tasks, &base, &ctx).await?;
    let best_config = result
        .best_attempt
        .map(|a| a.config)
        .unwrap_or_else(|| base.clone());
    let candidate = runner.run_suite(&tasks, &best_config, &ctx).await?;

    let comparison = compare(&baseline, &candidate);
    tracing::info!(
        overall = comparison.overall_improvement,
        significance = comparison.significance,
        better = comparison.candidate_is_better,
        "benchmark comparison done"
    );

    Ok(())
}
