//! 轨迹层：执行轨迹数据模型与分析器

pub mod analyzer;
pub mod types;

pub use analyzer::{
    AnalyzerThresholds, Bottleneck, BottleneckKind, MultiTraceAnalysis, Pattern, PatternType,
    RootCause, RootCauseCategory, TraceAnalysisResult, TraceAnalyzer,
};
pub use types::{ExecutionTrace, TraceEvent, TraceEventType, TraceMetrics};
