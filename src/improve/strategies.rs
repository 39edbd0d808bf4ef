//! 改进策略
//!
//! 把轨迹分析结果（模式 / 瓶颈 / 根因）映射为可执行的配置改动建议，
//! 按 confidence × 策略权重降序排序，同分保持检出顺序。
//! apply 是「精修」而非新谱系节点：保留原 id 与 version。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::improve::learning::{Learning, LearningLog, LearningQuery};
use crate::mutation::AgentConfig;
use crate::trace::{BottleneckKind, PatternType, RootCauseCategory, TraceAnalysisResult};

/// 改进策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    PromptRefinement,
    RetryPolicy,
    TemperatureTuning,
    TokenBudget,
}

/// 默认权重表（与变异注册表同理：固定、可在构造时替换）
pub fn default_weights() -> Vec<(StrategyKind, f64)> {
    vec![
        (StrategyKind::PromptRefinement, 1.0),
        (StrategyKind::RetryPolicy, 0.8),
        (StrategyKind::TemperatureTuning, 0.6),
        (StrategyKind::TokenBudget, 0.5),
    ]
}

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AppendPrompt,
    SetMaxAttempts,
    AdjustTemperature,
    AdjustMaxTokens,
}

/// 单个配置改动动作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub description: String,
    pub params: Value,
}

impl Action {
    /// 应用到配置副本；不触碰谱系字段（id / version / parent）
    pub fn apply(&self, config: &AgentConfig) -> AgentConfig {
        let mut next = config.clone();
        match self.kind {
            ActionKind::AppendPrompt => {
                if let Some(text) = self.params.get("text").and_then(|v| v.as_str()) {
                    next.system_prompt.push_str("\n\n");
                    next.system_prompt.push_str(text);
                }
            }
            ActionKind::SetMaxAttempts => {
                if let Some(n) = self.params.get("max_attempts").and_then(|v| v.as_u64()) {
                    next.retry.max_attempts = (n as u32).clamp(1, 10);
                }
            }
            ActionKind::AdjustTemperature => {
                if let Some(delta) = self.params.get("delta").and_then(|v| v.as_f64()) {
                    next.temperature = (next.temperature + delta).clamp(0.0, 2.0);
                }
            }
            ActionKind::AdjustMaxTokens => {
                if let Some(delta) = self.params.get("delta").and_then(|v| v.as_i64()) {
                    let adjusted = next.max_tokens as i64 + delta;
                    next.max_tokens = adjusted.clamp(100, 8000) as u32;
                }
            }
        }
        next
    }
}

/// 一条改进建议
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub strategy: StrategyKind,
    pub confidence: f64,
    pub actions: Vec<Action>,
    pub reasoning: String,
}

/// 改进策略引擎（含跨轮学习日志）
#[derive(Debug)]
pub struct ImprovementStrategies {
    weights: Vec<(StrategyKind, f64)>,
    log: LearningLog,
}

impl Default for ImprovementStrategies {
    fn default() -> Self {
        Self::with_weights(default_weights())
    }
}

impl ImprovementStrategies {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用自定义权重表构造（测试可替换）
    pub fn with_weights(weights: Vec<(StrategyKind, f64)>) -> Self {
        Self {
            weights,
            log: LearningLog::new(),
        }
    }

    fn weight_of(&self, kind: StrategyKind) -> f64 {
        self.weights
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    /// 由分析结果产出排序后的建议列表
    pub fn recommend(&self, analysis: &TraceAnalysisResult) -> Vec<Recommendation> {
        let mut recommendations = Vec::new();

        for pattern in &analysis.patterns {
            match pattern.name.as_str() {
                "Retry Loop" => recommendations.push(Recommendation {
                    strategy: StrategyKind::RetryPolicy,
                    confidence: pattern.confidence,
                    actions: vec![
                        Action {
                            kind: ActionKind::AppendPrompt,
                            description: "discourage blind retries".to_string(),
                            params: json!({
                                "text": "When an action fails twice, change the approach instead of retrying."
                            }),
                        },
                        Action {
                            kind: ActionKind::SetMaxAttempts,
                            description: "cap retry attempts".to_string(),
                            params: json!({ "max_attempts": 2 }),
                        },
                    ],
                    reasoning: format!(
                        "{} retry transitions detected, agent is stuck in a retry loop",
                        pattern.frequency
                    ),
                }),
                "Error Cluster" => recommendations.push(Recommendation {
                    strategy: StrategyKind::PromptRefinement,
                    confidence: pattern.confidence,
                    actions: vec![Action {
                        kind: ActionKind::AppendPrompt,
                        description: "add corrective instructions for clustered errors".to_string(),
                        params: json!({
                            "text": format!(
                                "Previous runs failed repeatedly ({} errors). Check inputs and preconditions before each action.",
                                pattern.frequency
                            )
                        }),
                    }],
                    reasoning: format!("{} errors clustered in one trace", pattern.frequency),
                }),
                "Slow Actions" => recommendations.push(Recommendation {
                    strategy: StrategyKind::TokenBudget,
                    confidence: pattern.confidence,
                    actions: vec![
                        Action {
                            kind: ActionKind::AdjustMaxTokens,
                            description: "tighten token budget to shorten actions".to_string(),
                            params: json!({ "delta": -500 }),
                        },
                        Action {
                            kind: ActionKind::AdjustTemperature,
                            description: "lower temperature for more focused output".to_string(),
                            params: json!({ "delta": -0.1 }),
                        },
                    ],
                    reasoning: format!("{} slow actions dominate execution time", pattern.frequency),
                }),
                _ => {
                    // 未知模式名按类型兜底
                    if pattern.pattern_type == PatternType::Inefficiency {
                        recommendations.push(Recommendation {
                            strategy: StrategyKind::TemperatureTuning,
                            confidence: pattern.confidence * 0.8,
                            actions: vec![Action {
                                kind: ActionKind::AdjustTemperature,
                                description: "nudge temperature down".to_string(),
                                params: json!({ "delta": -0.1 }),
                            }],
                            reasoning: format!("unrecognized inefficiency pattern '{}'", pattern.name),
                        });
                    }
                }
            }
        }

        // 慢动作不足以形成模式时（1~2 个），瓶颈仍需单独给建议；
        // 已有 Slow Actions 模式时覆盖同一批事件，不重复上报
        let slow_pattern_reported = analysis.patterns.iter().any(|p| p.name == "Slow Actions");
        if !slow_pattern_reported {
            for bottleneck in &analysis.bottlenecks {
                match bottleneck.kind {
                    BottleneckKind::SlowAction => recommendations.push(Recommendation {
                        strategy: StrategyKind::TokenBudget,
                        confidence: (bottleneck.severity / 100.0).clamp(0.3, 1.0),
                        actions: vec![
                            Action {
                                kind: ActionKind::AdjustMaxTokens,
                                description: "tighten token budget for a slow action".to_string(),
                                params: json!({ "delta": -500 }),
                            },
                            Action {
                                kind: ActionKind::AdjustTemperature,
                                description: "lower temperature for more focused output"
                                    .to_string(),
                                params: json!({ "delta": -0.1 }),
                            },
                        ],
                        reasoning: bottleneck.description.clone(),
                    }),
                }
            }
        }

        for root_cause in &analysis.root_causes {
            match root_cause.category {
                RootCauseCategory::InputValidation => recommendations.push(Recommendation {
                    strategy: StrategyKind::PromptRefinement,
                    confidence: root_cause.confidence,
                    actions: vec![Action {
                        kind: ActionKind::AppendPrompt,
                        description: "require explicit input validation".to_string(),
                        params: json!({
                            "text": "Before acting, verify that every required input is present and well-formed; report missing inputs instead of guessing."
                        }),
                    }],
                    reasoning: "errors trace back to missing or invalid inputs".to_string(),
                }),
                RootCauseCategory::Timeout => recommendations.push(Recommendation {
                    strategy: StrategyKind::RetryPolicy,
                    confidence: root_cause.confidence,
                    actions: vec![Action {
                        kind: ActionKind::SetMaxAttempts,
                        description: "allow one more attempt for timeout-prone steps".to_string(),
                        params: json!({ "max_attempts": 4 }),
                    }],
                    reasoning: "errors are timeouts, more attempts may help".to_string(),
                }),
                RootCauseCategory::ResourceLimit => recommendations.push(Recommendation {
                    strategy: StrategyKind::TokenBudget,
                    confidence: root_cause.confidence,
                    actions: vec![Action {
                        kind: ActionKind::AdjustMaxTokens,
                        description: "reduce token budget under resource pressure".to_string(),
                        params: json!({ "delta": -1000 }),
                    }],
                    reasoning: "errors indicate resource limits".to_string(),
                }),
                RootCauseCategory::ExternalService | RootCauseCategory::Unknown => {}
            }
        }

        // confidence × weight 降序；stable sort 保证同分保持检出顺序
        recommendations.sort_by(|a, b| {
            let ka = a.confidence * self.weight_of(a.strategy);
            let kb = b.confidence * self.weight_of(b.strategy);
            kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
        });
        recommendations
    }

    /// 把建议折叠到配置副本上：精修，不产生新谱系节点
    pub fn apply(&self, config: &AgentConfig, recommendation: &Recommendation) -> AgentConfig {
        let mut next = config.clone();
        for action in &recommendation.actions {
            next = action.apply(&next);
        }
        // 精修保留身份
        next.id = config.id.clone();
        next.version = config.version;
        next.parent_id = config.parent_id.clone();
        next
    }

    pub fn record_learning(&self, learning: Learning) {
        self.log.record(learning);
    }

    pub fn learnings(&self, query: &LearningQuery) -> Vec<Learning> {
        self.log.query(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ExecutionTrace, TraceAnalyzer, TraceEvent};

    fn analysis_with_retries_and_errors() -> TraceAnalysisResult {
        let mut events: Vec<TraceEvent> = (0..5)
            .map(|i| TraceEvent::state_change(format!("retry-{}", i)))
            .collect();
        events.push(TraceEvent::error("validate", "missing required input: id"));
        events.push(TraceEvent::error("fetch", "missing required input: key"));
        let trace = ExecutionTrace::from_events(events, false);
        TraceAnalyzer::default().analyze(&trace)
    }

    #[test]
    fn test_recommend_ranked_by_confidence_weight() {
        let strategies = ImprovementStrategies::new();
        let recs = strategies.recommend(&analysis_with_retries_and_errors());
        assert!(!recs.is_empty());
        for window in recs.windows(2) {
            let a = window[0].confidence * strategies.weight_of(window[0].strategy);
            let b = window[1].confidence * strategies.weight_of(window[1].strategy);
            assert!(a >= b);
        }
        // 重试循环 + 输入校验根因都应出现
        assert!(recs.iter().any(|r| r.strategy == StrategyKind::RetryPolicy));
        assert!(recs
            .iter()
            .any(|r| r.strategy == StrategyKind::PromptRefinement));
    }

    #[test]
    fn test_apply_preserves_identity() {
        let strategies = ImprovementStrategies::new();
        let config = AgentConfig::seed("agent", "base");
        let recs = strategies.recommend(&analysis_with_retries_and_errors());
        let refined = strategies.apply(&config, &recs[0]);

        assert_eq!(refined.id, config.id);
        assert_eq!(refined.version, config.version);
        // 动作确实生效（所有候选建议都会改提示词或重试上限）
        assert!(
            refined.system_prompt.len() > config.system_prompt.len()
                || refined.retry.max_attempts != config.retry.max_attempts
        );
    }

    #[test]
    fn test_empty_analysis_no_recommendations() {
        let strategies = ImprovementStrategies::new();
        let trace = ExecutionTrace::from_events(vec![TraceEvent::action_end("ok", 100)], true);
        let analysis = TraceAnalyzer::default().analyze(&trace);
        assert!(strategies.recommend(&analysis).is_empty());
    }

    #[test]
    fn test_few_slow_actions_recommend_via_bottlenecks() {
        // 只有 2 个慢动作：不足以形成 Slow Actions 模式，但瓶颈必须给出建议
        let trace = ExecutionTrace::from_events(
            vec![
                TraceEvent::action_end("plan", 5000),
                TraceEvent::action_end("act", 4000),
            ],
            true,
        );
        let analysis = TraceAnalyzer::default().analyze(&trace);
        assert!(analysis.patterns.is_empty());
        assert_eq!(analysis.bottlenecks.len(), 2);

        let recs = ImprovementStrategies::new().recommend(&analysis);
        assert_eq!(recs.len(), 2);
        assert!(recs.iter().all(|r| r.strategy == StrategyKind::TokenBudget));
        // severity 封顶 100 ⇒ confidence 封顶 1.0
        assert!(recs.iter().all(|r| r.confidence <= 1.0 && r.confidence >= 0.3));
    }

    #[test]
    fn test_slow_pattern_suppresses_per_bottleneck_recommendations() {
        let trace = ExecutionTrace::from_events(
            vec![
                TraceEvent::action_end("a", 3000),
                TraceEvent::action_end("b", 3000),
                TraceEvent::action_end("c", 3000),
            ],
            true,
        );
        let analysis = TraceAnalyzer::default().analyze(&trace);
        assert_eq!(analysis.bottlenecks.len(), 3);

        // 模式已覆盖这批事件，TokenBudget 建议只出现一次
        let recs = ImprovementStrategies::new().recommend(&analysis);
        let token_budget = recs
            .iter()
            .filter(|r| r.strategy == StrategyKind::TokenBudget)
            .count();
        assert_eq!(token_budget, 1);
    }

    #[test]
    fn test_action_apply_bounds() {
        let config = AgentConfig::seed("a", "p");
        let action = Action {
            kind: ActionKind::AdjustMaxTokens,
            description: "floor".to_string(),
            params: json!({ "delta": -100000 }),
        };
        let next = action.apply(&config);
        assert_eq!(next.max_tokens, 100);
    }
}
