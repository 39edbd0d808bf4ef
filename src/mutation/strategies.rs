//! 变异策略注册表
//!
//! 固定、不可变的 {类型, 权重, 函数} 表，构造 ConfigMutator 时传入，测试可替换。
//! 每个策略原地改动配置副本并返回实际触碰的字段名列表。

use rand::rngs::StdRng;
use rand::Rng;

use crate::mutation::types::{AgentConfig, MutationKind};

/// temperature 合法区间
pub const TEMPERATURE_MIN: f64 = 0.0;
pub const TEMPERATURE_MAX: f64 = 2.0;
/// max_tokens 闭区间边界
pub const TOKENS_MIN: u32 = 100;
pub const TOKENS_MAX: u32 = 8000;
/// 重试次数边界
pub const RETRY_MIN: u32 = 1;
pub const RETRY_MAX: u32 = 10;

/// 策略函数：改动配置副本，返回触碰的字段名
pub type StrategyFn = fn(&mut AgentConfig, f64, &mut StdRng) -> Vec<String>;

/// 注册表条目
#[derive(Clone)]
pub struct StrategyEntry {
    pub kind: MutationKind,
    pub weight: f64,
    pub apply: StrategyFn,
}

impl std::fmt::Debug for StrategyEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("kind", &self.kind)
            .field("weight", &self.weight)
            .finish()
    }
}

/// 默认注册表
pub fn default_registry() -> Vec<StrategyEntry> {
    vec![
        StrategyEntry {
            kind: MutationKind::TemperatureAdjust,
            weight: 1.0,
            apply: temperature_adjust,
        },
        StrategyEntry {
            kind: MutationKind::PromptRefine,
            weight: 0.8,
            apply: prompt_refine,
        },
        StrategyEntry {
            kind: MutationKind::TokenAdjust,
            weight: 0.6,
            apply: token_adjust,
        },
        StrategyEntry {
            kind: MutationKind::RetryAdjust,
            weight: 0.4,
            apply: retry_adjust,
        },
    ]
}

/// temperature 在 ±magnitude 内扰动，夹在 [0, 2]
fn temperature_adjust(config: &mut AgentConfig, magnitude: f64, rng: &mut StdRng) -> Vec<String> {
    let delta = (rng.gen::<f64>() * 2.0 - 1.0) * magnitude;
    config.temperature = (config.temperature + delta).clamp(TEMPERATURE_MIN, TEMPERATURE_MAX);
    vec!["temperature".to_string()]
}

/// 追加引导文本，提示词长度严格增加
fn prompt_refine(config: &mut AgentConfig, _magnitude: f64, rng: &mut StdRng) -> Vec<String> {
    const GUIDANCE: &[&str] = &[
        "Before acting, verify that every required input is present.",
        "Prefer fewer, more deliberate actions over rapid retries.",
        "When an action fails twice, change the approach instead of retrying.",
        "Summarize intermediate results before moving to the next step.",
        "Check preconditions explicitly and report which one failed.",
    ];
    let pick = GUIDANCE[rng.gen_range(0..GUIDANCE.len())];
    config.system_prompt.push_str("\n\n");
    config.system_prompt.push_str(pick);
    vec!["system_prompt".to_string()]
}

/// max_tokens 随机游走，闭区间 [100, 8000]
fn token_adjust(config: &mut AgentConfig, magnitude: f64, rng: &mut StdRng) -> Vec<String> {
    // magnitude 1.0 对应最多 ±1000 tokens 的步长
    let step = (magnitude * 1000.0).max(1.0);
    let delta = (rng.gen::<f64>() * 2.0 - 1.0) * step;
    let next = (config.max_tokens as f64 + delta).round();
    config.max_tokens = (next as i64).clamp(TOKENS_MIN as i64, TOKENS_MAX as i64) as u32;
    vec!["max_tokens".to_string()]
}

/// 重试上限 ±1，夹在 [1, 10]
fn retry_adjust(config: &mut AgentConfig, _magnitude: f64, rng: &mut StdRng) -> Vec<String> {
    let delta: i64 = if rng.gen::<bool>() { 1 } else { -1 };
    let next = config.retry.max_attempts as i64 + delta;
    config.retry.max_attempts = next.clamp(RETRY_MIN as i64, RETRY_MAX as i64) as u32;
    vec!["retry.max_attempts".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_prompt_refine_strictly_longer() {
        let mut config = AgentConfig::seed("t", "base prompt");
        let before = config.system_prompt.len();
        let mut rng = StdRng::seed_from_u64(7);
        let fields = prompt_refine(&mut config, 0.5, &mut rng);
        assert!(config.system_prompt.len() > before);
        assert_eq!(fields, vec!["system_prompt"]);
    }

    #[test]
    fn test_token_adjust_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut config = AgentConfig::seed("t", "p");
        config.max_tokens = TOKENS_MIN;
        for _ in 0..100 {
            token_adjust(&mut config, 1.0, &mut rng);
            assert!(config.max_tokens >= TOKENS_MIN && config.max_tokens <= TOKENS_MAX);
        }
    }

    #[test]
    fn test_temperature_adjust_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut config = AgentConfig::seed("t", "p");
        config.temperature = TEMPERATURE_MAX;
        for _ in 0..50 {
            temperature_adjust(&mut config, 1.0, &mut rng);
            assert!(config.temperature >= TEMPERATURE_MIN);
            assert!(config.temperature <= TEMPERATURE_MAX);
        }
    }
}
