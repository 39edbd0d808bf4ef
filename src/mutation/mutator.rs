//! 配置变异器
//!
//! 纯函数式：mutate / mutate_multiple / crossover 都只读父配置，产出新谱系节点。
//! 未指定策略时按权重从注册表抽取；传入 seed 则整条路径可复现。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::mutation::strategies::{default_registry, StrategyEntry};
use crate::mutation::types::{AgentConfig, MutationKind, MutationRecord};

/// 变异选项
#[derive(Debug, Clone, Default)]
pub struct MutateOptions {
    /// 指定策略；None 时按权重抽取
    pub kind: Option<MutationKind>,
    /// 扰动幅度，默认 0.3
    pub magnitude: Option<f64>,
    /// 随机种子；None 时取熵源（不可复现）
    pub seed: Option<u64>,
}

const DEFAULT_MAGNITUDE: f64 = 0.3;

/// 配置变异器
#[derive(Debug, Clone)]
pub struct ConfigMutator {
    registry: Vec<StrategyEntry>,
}

impl Default for ConfigMutator {
    fn default() -> Self {
        Self::new(default_registry())
    }
}

impl ConfigMutator {
    pub fn new(registry: Vec<StrategyEntry>) -> Self {
        Self { registry }
    }

    /// 注册表（类型与权重），供选择与诊断
    pub fn strategies(&self) -> &[StrategyEntry] {
        &self.registry
    }

    /// 变异：新 id、version = parent + 1、parent_id 指向父配置
    pub fn mutate(&self, config: &AgentConfig, opts: &MutateOptions) -> AgentConfig {
        let mut rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let magnitude = opts.magnitude.unwrap_or(DEFAULT_MAGNITUDE);

        let entry = match opts.kind {
            Some(kind) => self.registry.iter().find(|e| e.kind == kind),
            None => self.pick_weighted(&mut rng),
        };

        // 注册表中找不到指定策略时退化为无字段改动的空变异，不中断调用方
        let (kind, fields_changed, mut child) = match entry {
            Some(entry) => {
                let mut next = config.clone();
                let fields = (entry.apply)(&mut next, magnitude, &mut rng);
                (entry.kind, fields, next)
            }
            None => {
                tracing::warn!(kind = ?opts.kind, "mutation strategy not in registry, no-op");
                (
                    opts.kind.unwrap_or(MutationKind::TemperatureAdjust),
                    Vec::new(),
                    config.clone(),
                )
            }
        };

        child.id = uuid::Uuid::new_v4().to_string();
        child.version = config.version + 1;
        child.parent_id = Some(config.id.clone());
        child.mutation = Some(MutationRecord {
            kind,
            fields_changed,
            magnitude,
            seed: opts.seed,
        });

        tracing::debug!(
            parent = %config.id,
            child = %child.id,
            version = child.version,
            kind = %kind,
            "config mutated"
        );
        child
    }

    /// 链式变异 n 次，version 严格递增 base+1 … base+n
    pub fn mutate_multiple(
        &self,
        config: &AgentConfig,
        n: usize,
        opts: &MutateOptions,
    ) -> Vec<AgentConfig> {
        let mut out = Vec::with_capacity(n);
        let mut current = config.clone();
        for i in 0..n {
            // 给定种子时为每一步派生不同的子种子，整条链仍可复现
            let step_opts = MutateOptions {
                seed: opts.seed.map(|s| s.wrapping_add(i as u64)),
                ..opts.clone()
            };
            let next = self.mutate(&current, &step_opts);
            out.push(next.clone());
            current = next;
        }
        out
    }

    /// 交叉：数值字段取均值，非数值字段取 a 方；version = max(a,b)+1
    pub fn crossover(&self, a: &AgentConfig, b: &AgentConfig) -> AgentConfig {
        let mut child = a.clone();
        child.id = uuid::Uuid::new_v4().to_string();
        child.version = a.version.max(b.version) + 1;
        child.parent_id = Some(a.id.clone());
        child.temperature = (a.temperature + b.temperature) / 2.0;
        child.max_tokens = ((a.max_tokens as u64 + b.max_tokens as u64) / 2) as u32;
        child.retry.max_attempts = (a.retry.max_attempts + b.retry.max_attempts) / 2;
        child.mutation = Some(MutationRecord {
            kind: MutationKind::Crossover,
            fields_changed: vec![
                "temperature".to_string(),
                "max_tokens".to_string(),
                "retry.max_attempts".to_string(),
            ],
            magnitude: 0.0,
            seed: None,
        });
        child
    }

    fn pick_weighted(&self, rng: &mut StdRng) -> Option<&StrategyEntry> {
        let total: f64 = self.registry.iter().map(|e| e.weight).sum();
        if total <= 0.0 || self.registry.is_empty() {
            return None;
        }
        let mut x = rng.gen::<f64>() * total;
        for entry in &self.registry {
            if x < entry.weight {
                return Some(entry);
            }
            x -= entry.weight;
        }
        self.registry.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AgentConfig {
        AgentConfig::seed("test-agent", "You are a careful assistant.")
    }

    #[test]
    fn test_mutate_lineage() {
        let mutator = ConfigMutator::default();
        let parent = base();
        let child = mutator.mutate(&parent, &MutateOptions::default());

        assert_ne!(child.id, parent.id);
        assert_eq!(child.version, parent.version + 1);
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        let record = child.mutation.expect("mutation record");
        assert!(!record.fields_changed.is_empty());
    }

    #[test]
    fn test_mutate_seeded_reproducible() {
        let mutator = ConfigMutator::default();
        let parent = base();
        let opts = MutateOptions {
            kind: Some(MutationKind::TemperatureAdjust),
            magnitude: Some(0.5),
            seed: Some(1234),
        };
        let a = mutator.mutate(&parent, &opts);
        let b = mutator.mutate(&parent, &opts);
        assert!((a.temperature - b.temperature).abs() < f64::EPSILON);
        assert_eq!(a.mutation.unwrap().seed, Some(1234));
    }

    #[test]
    fn test_mutate_multiple_versions() {
        let mutator = ConfigMutator::default();
        let parent = base();
        let chain = mutator.mutate_multiple(&parent, 3, &MutateOptions::default());
        let versions: Vec<u32> = chain.iter().map(|c| c.version).collect();
        assert_eq!(
            versions,
            vec![parent.version + 1, parent.version + 2, parent.version + 3]
        );
        assert_eq!(chain[1].parent_id.as_deref(), Some(chain[0].id.as_str()));
    }

    #[test]
    fn test_crossover_averages_numeric_fields() {
        let mutator = ConfigMutator::default();
        let mut a = base();
        a.temperature = 0.3;
        a.max_tokens = 1000;
        let mut b = base();
        b.temperature = 0.9;
        b.max_tokens = 3000;

        let child = mutator.crossover(&a, &b);
        assert!((child.temperature - 0.6).abs() < 1e-9);
        assert_eq!(child.max_tokens, 2000);
        assert_eq!(child.mutation.unwrap().kind, MutationKind::Crossover);
        assert_eq!(child.version, a.version.max(b.version) + 1);
        // 非数值字段取 a 方
        assert_eq!(child.system_prompt, a.system_prompt);
    }

    #[test]
    fn test_unknown_kind_degrades_to_noop() {
        // 空注册表：任何指定策略都找不到
        let mutator = ConfigMutator::new(Vec::new());
        let parent = base();
        let child = mutator.mutate(
            &parent,
            &MutateOptions {
                kind: Some(MutationKind::PromptRefine),
                ..Default::default()
            },
        );
        assert_eq!(child.version, parent.version + 1);
        assert!(child.mutation.unwrap().fields_changed.is_empty());
        assert_eq!(child.system_prompt, parent.system_prompt);
    }

    #[test]
    fn test_strategies_exposed() {
        let mutator = ConfigMutator::default();
        let kinds: Vec<MutationKind> = mutator.strategies().iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&MutationKind::TemperatureAdjust));
        assert!(kinds.contains(&MutationKind::PromptRefine));
        assert!(kinds.contains(&MutationKind::TokenAdjust));
        assert!(kinds.contains(&MutationKind::RetryAdjust));
    }
}
