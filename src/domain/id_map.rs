// ==========================================
// 批量导入核心 - 标识映射 (IdMap)
// ==========================================
// 职责: (实体类型, 源 id) → 目标 id
// 红线: 同一次运行内，已分配的目标 id 不可被改派
// ==========================================

use crate::domain::types::EntityType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 改派已分配目标 id 的尝试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("目标 id 不可改派 (源 id {source_id}): 已映射 {existing}，尝试映射 {attempted}")]
pub struct IdMapConflict {
    pub source_id: String,
    pub existing: i64,
    pub attempted: i64,
}

// ==========================================
// TypeIdMap - 单一实体类型的映射切片
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeIdMap {
    entries: BTreeMap<String, Option<i64>>,
}

impl TypeIdMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记源 id（目标 id 暂为空）；已存在时不变
    pub fn reserve(&mut self, source_id: impl Into<String>) {
        self.entries.entry(source_id.into()).or_insert(None);
    }

    /// 分配目标 id
    ///
    /// 重复分配同一个值是幂等的；分配不同的值返回冲突。
    pub fn assign(&mut self, source_id: &str, destination_id: i64) -> Result<(), IdMapConflict> {
        match self.entries.get_mut(source_id) {
            Some(Some(existing)) if *existing != destination_id => Err(IdMapConflict {
                source_id: source_id.to_string(),
                existing: *existing,
                attempted: destination_id,
            }),
            Some(slot) => {
                *slot = Some(destination_id);
                Ok(())
            }
            None => {
                self.entries
                    .insert(source_id.to_string(), Some(destination_id));
                Ok(())
            }
        }
    }

    pub fn get(&self, source_id: &str) -> Option<i64> {
        self.entries.get(source_id).copied().flatten()
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.entries.contains_key(source_id)
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 尚未分配目标 id 的源 id
    pub fn unresolved(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<i64>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==========================================
// IdMap - 整次运行的映射
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdMap {
    types: BTreeMap<EntityType, TypeIdMap>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_type(&self, entity_type: EntityType) -> Option<&TypeIdMap> {
        self.types.get(&entity_type)
    }

    pub fn for_type_mut(&mut self, entity_type: EntityType) -> &mut TypeIdMap {
        self.types.entry(entity_type).or_default()
    }

    pub fn get(&self, entity_type: EntityType, source_id: &str) -> Option<i64> {
        self.types.get(&entity_type).and_then(|m| m.get(source_id))
    }

    pub fn clear(&mut self) {
        self.types.clear();
    }
}
