// ==========================================
// 批量导入核心 - 差异模型
// ==========================================
// 生命周期: 每条受检记录构建一次，交给一个渲染器后即释放
// ==========================================

use crate::domain::types::DiffCode;
use serde::{Deserialize, Serialize};

// ==========================================
// DiffEntry - 单字段比较结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub field: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub code: DiffCode,
}

impl DiffEntry {
    pub fn new(
        field: impl Into<String>,
        before: Option<String>,
        after: Option<String>,
        code: DiffCode,
    ) -> Self {
        Self {
            field: field.into(),
            before,
            after,
            code,
        }
    }

    pub fn changed(&self) -> bool {
        self.code != DiffCode::Unchanged
    }

    pub fn symbol(&self) -> &'static str {
        self.code.symbol()
    }
}

// ==========================================
// DiffReport - 单条记录的差异
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub source_id: String,
    pub resource_kind: Option<String>,
    pub has_error: bool,
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    pub fn changed_count(&self) -> usize {
        self.entries.iter().filter(|e| e.changed()).count()
    }
}
