// ==========================================
// 批量导入核心 - 具名实体冲突消解
// ==========================================
// 职责: 词汇表 / 自定义词表 / 资源模板 的 复用 / 重命名新建 / 新建 决策
// 相等: 结构相等（剥离目标库专有字段，规范化嵌套集合后逐字段比较）
// 红线: 每个决策记一条日志；从不静默丢弃记录
// ==========================================

use crate::domain::id_map::TypeIdMap;
use crate::domain::named::{CustomVocab, NamedEntity, ResourceTemplate, Vocabulary, DESTINATION_ONLY_FIELDS};
use crate::domain::record::LABEL_FIELD;
use crate::importer::error::ImportResult;
use crate::repository::entity_store::{EntityStore, SearchFilter};
use chrono::Local;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

// ==========================================
// Resolution - 冲突消解决策
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// 目标库已有语义相同的实体：映射到它，不新建
    Reuse { id: i64 },
    /// 名称冲突但内容不同：改名后新建
    RenameAndCreate { new_label: String },
    /// 无冲突：新建
    Create,
}

impl Resolution {
    pub fn kind(&self) -> &'static str {
        match self {
            Resolution::Reuse { .. } => "reuse",
            Resolution::RenameAndCreate { .. } => "rename",
            Resolution::Create => "create",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Reuse { id } => write!(f, "reuse #{}", id),
            Resolution::RenameAndCreate { new_label } => write!(f, "rename → {}", new_label),
            Resolution::Create => write!(f, "create"),
        }
    }
}

// ==========================================
// 结构规范化
// ==========================================

/// 剥离目标库专有字段、去除空字段、数组排序（递归）
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let normalized: Map<String, Value> = map
                .iter()
                .filter(|(k, _)| !DESTINATION_ONLY_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), normalize(v)))
                .filter(|(_, v)| !is_empty_value(v))
                .collect();
            Value::Object(normalized)
        }
        Value::Array(items) => {
            let mut normalized: Vec<Value> = items
                .iter()
                .map(normalize)
                .filter(|v| !is_empty_value(v))
                .collect();
            normalized.sort_by_cached_key(|v| v.to_string());
            Value::Array(normalized)
        }
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

pub fn structurally_equal(a: &Value, b: &Value) -> bool {
    normalize(a) == normalize(b)
}

/// 去掉 label 后的结构相等（用于比对改名后的副本）
fn content_equal<E: NamedEntity>(a: &E, b: &E) -> bool {
    let strip = |e: &E| -> Option<Value> {
        let mut fields = e.to_fields().ok()?;
        fields.remove(LABEL_FIELD);
        Some(Value::Object(fields))
    };
    match (strip(a), strip(b)) {
        (Some(a), Some(b)) => structurally_equal(&a, &b),
        _ => false,
    }
}

/// label 是否为 base 的改名副本（`base [YYYYmmdd HHMMSS xxxx]`，形状须与 rename_label 一致）
pub fn is_renamed_variant(label: &str, base: &str) -> bool {
    label
        .strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(" ["))
        .and_then(|rest| rest.strip_suffix(']'))
        .is_some_and(is_rename_stamp)
}

fn is_rename_stamp(stamp: &str) -> bool {
    fn all(s: &str, len: usize, f: fn(&u8) -> bool) -> bool {
        s.len() == len && s.as_bytes().iter().all(f)
    }
    let parts: Vec<&str> = stamp.split(' ').collect();
    matches!(parts.as_slice(), [date, time, suffix]
        if all(date, 8, u8::is_ascii_digit)
            && all(time, 6, u8::is_ascii_digit)
            && all(suffix, 4, u8::is_ascii_hexdigit))
}

/// 同名或改名副本
fn same_name(existing: &str, candidate: &str) -> bool {
    existing == candidate || is_renamed_variant(existing, candidate)
}

// ==========================================
// ConflictKey - 各具名实体的身份与内容比较
// ==========================================
pub trait ConflictKey: NamedEntity {
    /// 是否与已有实体语义相同（可复用）
    fn matches_existing(&self, existing: &Self) -> bool;

    /// 是否与已有实体名称冲突
    fn collides_with(&self, existing: &Self) -> bool {
        existing.label() == self.label()
    }

    /// 决定复用后调用（记录源与目标的非身份差异）
    fn on_reuse(&self, _existing: &Self) {}
}

impl ConflictKey for Vocabulary {
    /// 以命名空间为身份，前缀不参与
    fn matches_existing(&self, existing: &Self) -> bool {
        self.normalized_namespace() == existing.normalized_namespace()
    }

    fn collides_with(&self, existing: &Self) -> bool {
        existing.label == self.label || existing.prefix == self.prefix
    }

    /// 前缀不一致时沿用目标库前缀
    fn on_reuse(&self, existing: &Self) {
        if existing.prefix != self.prefix {
            warn!(
                namespace = %self.namespace_uri,
                source_prefix = %self.prefix,
                destination_prefix = %existing.prefix,
                "词汇表前缀不一致，沿用目标库前缀"
            );
        }
    }
}

impl ConflictKey for CustomVocab {
    fn matches_existing(&self, existing: &Self) -> bool {
        same_name(&existing.label, &self.label)
            && existing.lang == self.lang
            && existing.normalized_terms() == self.normalized_terms()
            && existing.normalized_uris() == self.normalized_uris()
    }
}

impl ConflictKey for ResourceTemplate {
    fn matches_existing(&self, existing: &Self) -> bool {
        same_name(&existing.label, &self.label) && content_equal(self, existing)
    }
}

// ==========================================
// ConflictResolver
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// 决策：复用优先，其次按名称冲突改名，否则新建
    pub fn resolve<E: ConflictKey>(&self, candidate: &E, existing: &[E]) -> Resolution {
        for entity in existing {
            let Some(id) = entity.id() else { continue };
            if candidate.matches_existing(entity) {
                candidate.on_reuse(entity);
                return Resolution::Reuse { id };
            }
        }

        if existing.iter().any(|e| candidate.collides_with(e)) {
            return Resolution::RenameAndCreate {
                new_label: rename_label(candidate.label()),
            };
        }

        Resolution::Create
    }
}

/// `label [YYYYmmdd HHMMSS xxxx]`
pub fn rename_label(label: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{} [{} {}]",
        label,
        Local::now().format("%Y%m%d %H%M%S"),
        &suffix[..4]
    )
}

// ==========================================
// NamedEntityImporter - 执行决策
// ==========================================
pub struct NamedEntityImporter<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    resolver: ConflictResolver,
}

impl<'a, S: EntityStore + ?Sized> NamedEntityImporter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            resolver: ConflictResolver::new(),
        }
    }

    /// 目标库中该类的全部实体（无法还原的行记告警后跳过）
    pub fn load_existing<E: NamedEntity>(&self) -> ImportResult<Vec<E>> {
        let stored = self.store.search(E::ENTITY_TYPE, &SearchFilter::default())?;
        let mut entities = Vec::with_capacity(stored.len());
        for row in &stored {
            match E::from_stored(row) {
                Ok(entity) => entities.push(entity),
                Err(e) => warn!(
                    entity_type = %E::ENTITY_TYPE,
                    id = row.id,
                    error = %e,
                    "目标库实体无法解析，不参与冲突比较"
                ),
            }
        }
        Ok(entities)
    }

    /// 导入一个具名实体，返回决策与目标 id
    pub fn import<E: ConflictKey>(
        &self,
        source_id: &str,
        mut candidate: E,
        ids: &mut TypeIdMap,
    ) -> ImportResult<(Resolution, i64)> {
        let existing = self.load_existing::<E>()?;
        let resolution = self.resolver.resolve(&candidate, &existing);

        let destination_id = match &resolution {
            Resolution::Reuse { id } => {
                info!(
                    entity_type = %E::ENTITY_TYPE,
                    source_id,
                    destination_id = id,
                    label = candidate.label(),
                    "已复用目标库中的同一实体"
                );
                *id
            }
            Resolution::RenameAndCreate { new_label } => {
                let original = candidate.label().to_string();
                candidate.set_label(new_label.clone());
                let id = self.store.create(E::ENTITY_TYPE, &candidate.to_fields()?)?;
                info!(
                    entity_type = %E::ENTITY_TYPE,
                    source_id,
                    destination_id = id,
                    original_label = %original,
                    new_label = %new_label,
                    "名称冲突，已改名新建"
                );
                id
            }
            Resolution::Create => {
                let id = self.store.create(E::ENTITY_TYPE, &candidate.to_fields()?)?;
                info!(
                    entity_type = %E::ENTITY_TYPE,
                    source_id,
                    destination_id = id,
                    label = candidate.label(),
                    "已新建"
                );
                id
            }
        };

        ids.assign(source_id, destination_id)?;
        Ok((resolution, destination_id))
    }
}
