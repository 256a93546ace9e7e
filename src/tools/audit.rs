//! 工具调用审计日志
//!
//! 每次调用（成功或失败）追加一条记录到有界环形缓冲，超出容量时淘汰最旧记录。
//! 参数与输出只保留截断预览，记录一经写入不再修改。

use std::collections::VecDeque;

use serde::Serialize;

/// 预览截断长度（字符）
const PREVIEW_CHARS: usize = 200;

/// 单次工具调用的审计记录
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool: String,
    pub agent: String,
    /// 参数预览（截断）
    pub args: String,
    pub success: bool,
    /// 输出或错误预览（截断）
    pub outcome: String,
    pub duration_ms: u64,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl ToolCallRecord {
    pub fn new(
        tool: impl Into<String>,
        agent: impl Into<String>,
        args: &serde_json::Value,
        success: bool,
        outcome: &str,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: format!("audit_{}", uuid::Uuid::new_v4()),
            tool: tool.into(),
            agent: agent.into(),
            args: preview(&args.to_string()),
            success,
            outcome: preview(outcome),
            duration_ms,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > PREVIEW_CHARS {
        format!("{}...", s.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

/// 审计统计摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditStats {
    pub total: usize,
    pub failures: usize,
    pub total_duration_ms: u64,
}

/// 有界环形审计日志
#[derive(Debug)]
pub struct AuditLog {
    records: VecDeque<ToolCallRecord>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, record: ToolCallRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 最近的 n 条记录（新到旧）
    pub fn recent(&self, n: usize) -> Vec<ToolCallRecord> {
        self.records.iter().rev().take(n).cloned().collect()
    }

    pub fn stats(&self) -> AuditStats {
        AuditStats {
            total: self.records.len(),
            failures: self.records.iter().filter(|r| !r.success).count(),
            total_duration_ms: self.records.iter().map(|r| r.duration_ms).sum(),
        }
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tool: &str, success: bool) -> ToolCallRecord {
        ToolCallRecord::new(tool, "tester", &serde_json::json!({}), success, "out", 5)
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut log = AuditLog::new(3);
        for i in 0..5 {
            log.push(record(&format!("tool{i}"), true));
        }
        assert_eq!(log.len(), 3);
        let recent = log.recent(3);
        assert_eq!(recent[0].tool, "tool4");
        assert_eq!(recent[2].tool, "tool2");
    }

    #[test]
    fn test_stats() {
        let mut log = AuditLog::default();
        log.push(record("a", true));
        log.push(record("b", false));
        let stats = log.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_duration_ms, 10);
    }

    #[test]
    fn test_long_args_truncated() {
        let big = "x".repeat(1000);
        let rec = ToolCallRecord::new("t", "a", &serde_json::json!({ "blob": big }), true, "ok", 1);
        assert!(rec.args.chars().count() <= PREVIEW_CHARS + 3);
    }
}
