//! 套件结果对比
//!
//! 逐维度算基线 → 候选的百分比变化，「越低越好」的维度符号取反；
//! 总体改进为加权平均；显著性 = 样本量因子 × 一致性因子，
//! candidate_is_better 要求改进为正且显著性 > 0.8。

use std::collections::HashMap;

use crate::benchmark::types::{
    BenchmarkComparison, BenchmarkSuiteResult, MetricChange, MetricKind, TaskComparison,
};

/// 判定候选更优所需的显著性下限
pub const SIGNIFICANCE_FLOOR: f64 = 0.8;
/// 样本量因子在 n = 20 处饱和
const SAMPLE_SATURATION: f64 = 20.0;

/// 对比基线与候选两份套件结果
pub fn compare(
    baseline: &BenchmarkSuiteResult,
    candidate: &BenchmarkSuiteResult,
) -> BenchmarkComparison {
    let mut metric_changes: HashMap<MetricKind, MetricChange> = HashMap::new();

    for (kind, base_agg) in &baseline.aggregates {
        let Some(cand_agg) = candidate.aggregates.get(kind) else {
            continue;
        };
        let percent_change = percent_change(base_agg.avg, cand_agg.avg);
        let improvement = if kind.lower_is_better() {
            -percent_change
        } else {
            percent_change
        };
        metric_changes.insert(
            *kind,
            MetricChange {
                baseline_avg: base_agg.avg,
                candidate_avg: cand_agg.avg,
                percent_change,
                improvement,
            },
        );
    }

    // 任务级对比：只配对两边都有的 task id
    let task_comparisons: Vec<TaskComparison> = baseline
        .results
        .iter()
        .filter_map(|base| {
            let cand = candidate.results.iter().find(|r| r.task_id == base.task_id)?;
            Some(TaskComparison {
                task_id: base.task_id.clone(),
                baseline_quality: base.quality_score,
                candidate_quality: cand.quality_score,
                delta: cand.quality_score - base.quality_score,
            })
        })
        .collect();

    let overall_improvement = weighted_improvement(&metric_changes);
    let significance = significance(baseline, candidate, &task_comparisons);
    let candidate_is_better = overall_improvement > 0.0 && significance > SIGNIFICANCE_FLOOR;

    tracing::info!(
        overall = overall_improvement,
        significance,
        better = candidate_is_better,
        "benchmark comparison"
    );

    BenchmarkComparison {
        baseline_suite_id: baseline.id.clone(),
        candidate_suite_id: candidate.id.clone(),
        metric_changes,
        task_comparisons,
        overall_improvement,
        significance,
        candidate_is_better,
    }
}

fn percent_change(baseline: f64, candidate: f64) -> f64 {
    if baseline.abs() < f64::EPSILON {
        if candidate.abs() < f64::EPSILON {
            0.0
        } else if candidate > 0.0 {
            100.0
        } else {
            -100.0
        }
    } else {
        (candidate - baseline) / baseline.abs() * 100.0
    }
}

fn weighted_improvement(changes: &HashMap<MetricKind, MetricChange>) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (kind, change) in changes {
        weighted += change.improvement * kind.weight();
        total_weight += kind.weight();
    }
    if total_weight <= 0.0 {
        0.0
    } else {
        weighted / total_weight
    }
}

/// 显著性：min(1, n/20) 的样本量因子 × 任务级质量差的一致性因子 1/(1+|std/avg|)
fn significance(
    baseline: &BenchmarkSuiteResult,
    candidate: &BenchmarkSuiteResult,
    task_comparisons: &[TaskComparison],
) -> f64 {
    let n = baseline.results.len().min(candidate.results.len()) as f64;
    let sample_factor = (n / SAMPLE_SATURATION).min(1.0);

    let deltas: Vec<f64> = task_comparisons.iter().map(|t| t.delta).collect();
    let consistency = if deltas.is_empty() {
        0.0
    } else {
        let avg = deltas.iter().sum::<f64>() / deltas.len() as f64;
        let variance =
            deltas.iter().map(|d| (d - avg).powi(2)).sum::<f64>() / deltas.len() as f64;
        let std_dev = variance.sqrt();
        if avg.abs() < f64::EPSILON {
            if std_dev < f64::EPSILON {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 / (1.0 + (std_dev / avg).abs())
        }
    };

    (sample_factor * consistency).clamp(0.0, 1.0)
}
