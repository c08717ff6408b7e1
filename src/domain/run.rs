// ==========================================
// 批量导入核心 - 运行信号与阶段汇总
// ==========================================
// 红线: 取消为协作式，只在分块边界检查
// ==========================================

use crate::domain::types::EntityType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// ==========================================
// RunSignal - 运行级 "出错或请求停止" 标志
// ==========================================
// 宿主可在另一线程持有克隆并置位；导入本身单线程运行
#[derive(Debug, Clone, Default)]
pub struct RunSignal {
    stop_requested: Arc<AtomicBool>,
    has_error: Arc<AtomicBool>,
    error_count: Arc<AtomicUsize>,
}

impl RunSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn mark_error(&self) {
        self.has_error.store(true, Ordering::SeqCst);
    }

    /// 记录一次错误（计数 + 置错误标志）
    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
        self.mark_error();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> usize {
        self.error_count.load(Ordering::SeqCst)
    }

    /// 分块边界检查点
    pub fn should_halt(&self) -> bool {
        self.stop_requested() || self.has_error()
    }
}

// ==========================================
// PhaseStatus / PhaseSummary - 阶段汇总
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Completed,
    Halted,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Completed => write!(f, "COMPLETED"),
            PhaseStatus::Halted => write!(f, "HALTED"),
            PhaseStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "COMPLETED" => Ok(PhaseStatus::Completed),
            "HALTED" => Ok(PhaseStatus::Halted),
            "FAILED" => Ok(PhaseStatus::Failed),
            other => Err(format!("未知阶段状态: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub entity_type: EntityType,
    pub created: usize,
    pub skipped: usize,
    pub total: usize,
    pub status: PhaseStatus,
    pub elapsed_ms: u64,
    pub message: Option<String>,
}

impl fmt::Display for PhaseSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}/{} created, {} skipped ({})",
            self.phase, self.entity_type, self.created, self.total, self.skipped, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_clones_share_state() {
        let signal = RunSignal::new();
        let host = signal.clone();
        assert!(!signal.should_halt());

        host.request_stop();
        assert!(signal.stop_requested());
        assert!(signal.should_halt());
        assert!(!signal.has_error());
    }

    #[test]
    fn test_record_error_counts_and_flags() {
        let signal = RunSignal::new();
        signal.record_error();
        signal.record_error();
        assert_eq!(signal.error_count(), 2);
        assert!(signal.has_error());
    }

    #[test]
    fn test_summary_display() {
        let summary = PhaseSummary {
            phase: "materialize".to_string(),
            entity_type: EntityType::Item,
            created: 2498,
            skipped: 2,
            total: 2500,
            status: PhaseStatus::Completed,
            elapsed_ms: 10,
            message: None,
        };
        assert_eq!(
            summary.to_string(),
            "[materialize] item: 2498/2500 created, 2 skipped (COMPLETED)"
        );
    }
}
