// ==========================================
// 批量导入核心 - 源记录与目标实体
// ==========================================
// 用途: 源记录（外部来源，只读）与目标库实体（存储形态）
// ==========================================

use crate::domain::types::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 字段名 → 值的有序映射
pub type EntityFields = serde_json::Map<String, Value>;

/// 标签字段名（同时落入目标表的 keep-id 列）
pub const LABEL_FIELD: &str = "label";

// ==========================================
// SourceRecord - 源记录
// ==========================================
// source_id 仅在来源内唯一；层级类型携带 parent_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source_id: String,
    pub parent_id: Option<String>,
    pub fields: EntityFields,
}

impl SourceRecord {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            parent_id: None,
            fields: EntityFields::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.fields.get(LABEL_FIELD).and_then(Value::as_str)
    }
}

// ==========================================
// StoredEntity - 目标库实体
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: i64,
    pub entity_type: EntityType,
    pub label: Option<String>,
    pub owner_id: Option<i64>,
    pub fields: EntityFields,
}

// ==========================================
// ReferenceIssue - 引用无法解析
// ==========================================
// 可恢复：记录告警，省略该链接，所属记录照常创建
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceIssue {
    pub source_id: String,
    pub relation: String,
    pub missing_id: String,
}
