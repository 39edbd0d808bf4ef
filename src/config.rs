//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MOLT__*` 覆盖（双下划线表示嵌套，
//! 如 `MOLT__BENCHMARK__CONCURRENCY=5`）。阈值默认值即参考行为的观测边界。

use std::path::PathBuf;

use serde::Deserialize;

use crate::benchmark::BenchmarkOptions;
use crate::trace::AnalyzerThresholds;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub analyzer: AnalyzerSection,
    #[serde(default)]
    pub benchmark: BenchmarkSection,
    #[serde(default)]
    pub meta: MetaSection,
}

/// [analyzer] 段：分析阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    /// 模式上报的置信度下限
    pub confidence_floor: f64,
    /// 慢动作判定阈值（毫秒）
    pub slow_action_ms: u64,
    /// 重试循环置信度饱和计数
    pub retry_saturation: usize,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            confidence_floor: 0.6,
            slow_action_ms: 1000,
            retry_saturation: 5,
        }
    }
}

impl From<&AnalyzerSection> for AnalyzerThresholds {
    fn from(section: &AnalyzerSection) -> Self {
        Self {
            confidence_floor: section.confidence_floor,
            slow_action_ms: section.slow_action_ms,
            retry_saturation: section.retry_saturation,
            ..Default::default()
        }
    }
}

/// [benchmark] 段：并发与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkSection {
    pub concurrency: usize,
    pub retry_failed: bool,
    pub max_retries: u32,
}

impl Default for BenchmarkSection {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retry_failed: true,
            max_retries: 2,
        }
    }
}

impl From<&BenchmarkSection> for BenchmarkOptions {
    fn from(section: &BenchmarkSection) -> Self {
        Self {
            concurrency: section.concurrency,
            retry_failed: section.retry_failed,
            max_retries: section.max_retries,
        }
    }
}

/// [meta] 段：改进循环默认参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetaSection {
    pub max_attempts: usize,
    pub attempt_timeout_ms: u64,
    pub quality_threshold: f64,
    pub variant_concurrency: usize,
}

impl Default for MetaSection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout_ms: 30_000,
            quality_threshold: 70.0,
            variant_concurrency: 3,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MOLT__* 可覆盖
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MOLT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
