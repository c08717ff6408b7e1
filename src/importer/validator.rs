// ==========================================
// 批量导入核心 - 实体校验器
// ==========================================
// 职责: 暂存前按目标库约束校验字段
// 说明: 校验失败是记录级可恢复问题，返回问题列表而非错误
// ==========================================

use crate::domain::record::{EntityFields, LABEL_FIELD};
use crate::domain::types::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// 目标库 label 列长度上限（字符数）
pub const MAX_LABEL_LENGTH: usize = 190;

// ==========================================
// ValidationIssue - 单条校验问题
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub source_id: String,
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        source_id: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.source_id, self.field, self.message)
    }
}

// ==========================================
// EntityValidator Trait
// ==========================================
// 实现者: DefaultValidator
pub trait EntityValidator {
    /// 校验一条待暂存实体；返回空列表表示通过
    fn validate(
        &self,
        entity_type: EntityType,
        source_id: &str,
        fields: &EntityFields,
    ) -> Vec<ValidationIssue>;
}

// ==========================================
// DefaultValidator - 必填字段 + label 长度
// ==========================================
pub struct DefaultValidator {
    required: HashMap<EntityType, Vec<String>>,
    max_label_length: usize,
}

impl Default for DefaultValidator {
    fn default() -> Self {
        let mut required = HashMap::new();
        required.insert(
            EntityType::Vocabulary,
            vec!["namespace_uri".to_string(), "prefix".to_string(), LABEL_FIELD.to_string()],
        );
        required.insert(EntityType::CustomVocab, vec![LABEL_FIELD.to_string()]);
        required.insert(EntityType::ResourceTemplate, vec![LABEL_FIELD.to_string()]);
        required.insert(EntityType::Property, vec!["local_name".to_string(), LABEL_FIELD.to_string()]);
        required.insert(EntityType::ResourceClass, vec!["local_name".to_string(), LABEL_FIELD.to_string()]);

        Self {
            required,
            max_label_length: MAX_LABEL_LENGTH,
        }
    }
}

impl DefaultValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加某实体类型的必填字段
    pub fn require(mut self, entity_type: EntityType, field: impl Into<String>) -> Self {
        self.required.entry(entity_type).or_default().push(field.into());
        self
    }

    pub fn with_max_label_length(mut self, max: usize) -> Self {
        self.max_label_length = max;
        self
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_blank),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

impl EntityValidator for DefaultValidator {
    fn validate(
        &self,
        entity_type: EntityType,
        source_id: &str,
        fields: &EntityFields,
    ) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if let Some(required) = self.required.get(&entity_type) {
            for field in required {
                if fields.get(field).map_or(true, is_blank) {
                    issues.push(ValidationIssue::new(source_id, field.as_str(), "必填字段缺失"));
                }
            }
        }

        match fields.get(LABEL_FIELD) {
            Some(Value::String(label)) => {
                let len = label.chars().count();
                if len > self.max_label_length {
                    issues.push(ValidationIssue::new(
                        source_id,
                        LABEL_FIELD,
                        format!("长度 {} 超过上限 {}", len, self.max_label_length),
                    ));
                }
            }
            Some(Value::Null) | None => {}
            Some(_) => {
                issues.push(ValidationIssue::new(source_id, LABEL_FIELD, "label 必须为文本"));
            }
        }

        issues
    }
}
