// ==========================================
// 批量导入核心 - 值树展平
// ==========================================
// 嵌套数组递归折叠为一层；每个顶层字段得到一个叶子列表
// ==========================================

use crate::domain::record::EntityFields;
use serde_json::Value;

/// 展平单个值：数组递归展开，其余值作为叶子
pub fn flatten_leaves(value: &Value) -> Vec<&Value> {
    let mut leaves = Vec::new();
    collect(value, &mut leaves);
    leaves
}

fn collect<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect(item, out)),
        other => out.push(other),
    }
}

/// 按字段顺序展平整条记录
pub fn flatten_fields(fields: &EntityFields) -> Vec<(&str, Vec<&Value>)> {
    fields
        .iter()
        .map(|(name, value)| (name.as_str(), flatten_leaves(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_arrays_collapse_in_order() {
        let value = json!([["a", ["b"]], [], "c", {"@value": "d"}]);
        let leaves = flatten_leaves(&value);
        assert_eq!(
            leaves,
            vec![&json!("a"), &json!("b"), &json!("c"), &json!({"@value": "d"})]
        );
    }

    #[test]
    fn test_scalar_is_single_leaf() {
        assert_eq!(flatten_leaves(&json!(3)), vec![&json!(3)]);
    }

    #[test]
    fn test_flatten_fields_keeps_field_order() {
        let fields = match json!({"z": [1, [2]], "a": "x"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let flat = flatten_fields(&fields);
        assert_eq!(flat[0].0, "z");
        assert_eq!(flat[0].1.len(), 2);
        assert_eq!(flat[1].0, "a");
    }
}
