// ==========================================
// 批量导入核心 - 结构差异引擎
// ==========================================
// 职责: 同一逻辑记录 前/后 两态逐字段比较，输出带标记的差异
// 输入: before / after 字段映射
// 输出: DiffEntry 列表（重复值按位置逐个比较）
// 标量提取优先级: 资源引用 id > URI > 字面值 > null
// ==========================================

use crate::domain::diff::{DiffEntry, DiffReport};
use crate::domain::record::EntityFields;
use crate::domain::types::DiffCode;
use crate::engine::flatten::flatten_leaves;
use serde_json::Value;

const RESOURCE_ID_KEY: &str = "value_resource_id";
const URI_KEY: &str = "@id";
const LITERAL_KEY: &str = "@value";

// ==========================================
// Scalar - 可比较的标量
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scalar {
    Null,
    Resource(String),
    Uri(String),
    Literal(String),
    /// 无法有意义比较的形状（保留原始 JSON 用于展示）
    Incomparable(String),
}

impl Scalar {
    pub fn text(&self) -> Option<String> {
        match self {
            Scalar::Null => None,
            Scalar::Resource(s) | Scalar::Uri(s) | Scalar::Literal(s) | Scalar::Incomparable(s) => {
                Some(s.clone())
            }
        }
    }
}

fn plain_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 值对象 / 裸值 → 标量
pub fn extract_scalar(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Null,
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            plain_text(value).map_or(Scalar::Null, Scalar::Literal)
        }
        Value::Array(_) => Scalar::Incomparable(value.to_string()),
        Value::Object(map) => {
            if let Some(id) = map.get(RESOURCE_ID_KEY).and_then(plain_text) {
                return Scalar::Resource(id);
            }
            if let Some(uri) = map.get(URI_KEY).and_then(plain_text) {
                return Scalar::Uri(uri);
            }
            match map.get(LITERAL_KEY) {
                Some(Value::Array(_)) | Some(Value::Object(_)) => {
                    Scalar::Incomparable(value.to_string())
                }
                Some(literal) => plain_text(literal).map_or(Scalar::Null, Scalar::Literal),
                None => Scalar::Null,
            }
        }
    }
}

/// 两个标量的差异代码
pub fn compare(before: &Scalar, after: &Scalar) -> DiffCode {
    match (before, after) {
        (Scalar::Incomparable(_), _) | (_, Scalar::Incomparable(_)) => DiffCode::Error,
        (Scalar::Null, Scalar::Null) => DiffCode::Unchanged,
        (Scalar::Null, _) => DiffCode::Added,
        (_, Scalar::Null) => DiffCode::Removed,
        (Scalar::Resource(a), Scalar::Resource(b)) => equal_code(a == b),
        // 资源引用与 URI/字面值不可比
        (Scalar::Resource(_), _) | (_, Scalar::Resource(_)) => DiffCode::Error,
        (a, b) => equal_code(a.text() == b.text()),
    }
}

fn equal_code(equal: bool) -> DiffCode {
    if equal {
        DiffCode::Unchanged
    } else {
        DiffCode::Changed
    }
}

/// 逐字段比较
///
/// 字段顺序: before 的字段顺序，随后是仅出现在 after 中的字段。
/// 多值字段展平后按位置比较，每个位置一条 DiffEntry（字段名重复）。
pub fn diff(before: &EntityFields, after: &EntityFields) -> Vec<DiffEntry> {
    let names = before
        .keys()
        .chain(after.keys().filter(|k| !before.contains_key(*k)));

    let mut entries = Vec::new();
    for name in names {
        let left = before.get(name).map(flatten_leaves).unwrap_or_default();
        let right = after.get(name).map(flatten_leaves).unwrap_or_default();
        let width = left.len().max(right.len()).max(1);

        for i in 0..width {
            let b = left.get(i).map_or(Scalar::Null, |v| extract_scalar(v));
            let a = right.get(i).map_or(Scalar::Null, |v| extract_scalar(v));
            let code = compare(&b, &a);
            entries.push(DiffEntry::new(name.clone(), b.text(), a.text(), code));
        }
    }
    entries
}

/// 单条记录的差异报告
pub fn diff_record(
    source_id: impl Into<String>,
    resource_kind: Option<&str>,
    before: &EntityFields,
    after: &EntityFields,
) -> DiffReport {
    let entries = diff(before, after);
    DiffReport {
        source_id: source_id.into(),
        resource_kind: resource_kind.map(str::to_string),
        has_error: entries.iter().any(|e| e.code == DiffCode::Error),
        entries,
    }
}
