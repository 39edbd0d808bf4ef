//! 跨轮学习日志
//!
//! 仅追加、按插入序保存的内存日志；条目创建后不再修改，追加用互斥锁串行化。
//! 查询是线性过滤（预期量级很小，不建索引）。

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 一条学习记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub insight: String,
    /// 来源（如 meta_loop / manual）
    pub source: String,
    pub confidence: f64,
    /// 关联的模式名（可选，自由文本）
    pub pattern: Option<String>,
    pub actions_applied: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// 查询条件
#[derive(Debug, Clone, Default)]
pub struct LearningQuery {
    /// 精确匹配模式名
    pub pattern: Option<String>,
    /// 置信度下限
    pub min_confidence: Option<f64>,
}

/// 仅追加的学习日志
#[derive(Debug, Default)]
pub struct LearningLog {
    entries: Mutex<Vec<Learning>>,
}

impl LearningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条记录（原子操作，无其它事务约束）
    pub fn record(&self, learning: Learning) {
        // 条目不会写到一半，锁中毒后日志仍然一致，直接恢复
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(learning);
    }

    /// 线性过滤查询，返回克隆（日志本体不外借）
    pub fn query(&self, query: &LearningQuery) -> Vec<Learning> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|l| match &query.pattern {
                Some(p) => l.pattern.as_deref() == Some(p.as_str()),
                None => true,
            })
            .filter(|l| match query.min_confidence {
                Some(min) => l.confidence >= min,
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
