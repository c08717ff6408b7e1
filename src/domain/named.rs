// ==========================================
// 批量导入核心 - 具名实体领域模型
// ==========================================
// 用途: 词汇表 / 自定义词表 / 资源模板
// 说明: 这三类实体以名称唯一，导入前需经冲突消解
// ==========================================

use crate::domain::record::{EntityFields, StoredEntity};
use crate::domain::types::EntityType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// 仅存在于目标库的字段（结构比较时剥离）
pub const DESTINATION_ONLY_FIELDS: [&str; 6] = ["id", "owner_id", "o:id", "@id", "o:owner", "@context"];

// ==========================================
// NamedEntity Trait
// ==========================================
pub trait NamedEntity: Serialize + DeserializeOwned + Clone {
    const ENTITY_TYPE: EntityType;

    fn id(&self) -> Option<i64>;

    fn label(&self) -> &str;

    fn set_label(&mut self, label: String);

    /// 转换为落库字段（不含 id / owner_id）
    fn to_fields(&self) -> Result<EntityFields, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(mut map) => {
                map.remove("id");
                map.remove("owner_id");
                Ok(map)
            }
            _ => Ok(EntityFields::new()),
        }
    }

    /// 从目标库实体还原
    fn from_stored(stored: &StoredEntity) -> Result<Self, serde_json::Error> {
        let mut map = stored.fields.clone();
        map.insert("id".to_string(), Value::from(stored.id));
        map.insert("owner_id".to_string(), serde_json::to_value(stored.owner_id)?);
        if let Some(label) = &stored.label {
            map.insert("label".to_string(), Value::from(label.clone()));
        }
        serde_json::from_value(Value::Object(map))
    }
}

// ==========================================
// Vocabulary - 词汇表
// ==========================================
// 以命名空间 URI 为身份；前缀仅为显示用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub id: Option<i64>,
    pub namespace_uri: String,
    pub prefix: String,
    pub label: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

impl Vocabulary {
    /// 忽略末尾 `#` / `/` 的命名空间
    pub fn normalized_namespace(&self) -> &str {
        self.namespace_uri
            .trim()
            .trim_end_matches(&['#', '/'][..])
    }
}

impl NamedEntity for Vocabulary {
    const ENTITY_TYPE: EntityType = EntityType::Vocabulary;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }
}

// ==========================================
// CustomVocab - 自定义词表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomVocab {
    #[serde(default)]
    pub id: Option<i64>,
    pub label: String,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub uris: Vec<String>,
    #[serde(default)]
    pub item_set_id: Option<i64>,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

impl CustomVocab {
    /// 去首尾空白、去空行后的词项集合（区分大小写）
    pub fn normalized_terms(&self) -> BTreeSet<String> {
        normalize_term_list(&self.terms)
    }

    pub fn normalized_uris(&self) -> BTreeSet<String> {
        normalize_term_list(&self.uris)
    }
}

fn normalize_term_list(list: &[String]) -> BTreeSet<String> {
    list.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl NamedEntity for CustomVocab {
    const ENTITY_TYPE: EntityType = EntityType::CustomVocab;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }
}

// ==========================================
// ResourceTemplate - 资源模板
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateProperty {
    pub property: String, // 属性术语，如 dcterms:title
    #[serde(default)]
    pub alternate_label: Option<String>,
    #[serde(default)]
    pub alternate_comment: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub data_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTemplate {
    #[serde(default)]
    pub id: Option<i64>,
    pub label: String,
    #[serde(default)]
    pub resource_class: Option<String>,
    #[serde(default)]
    pub title_property: Option<String>,
    #[serde(default)]
    pub description_property: Option<String>,
    #[serde(default)]
    pub properties: Vec<TemplateProperty>,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

impl NamedEntity for ResourceTemplate {
    const ENTITY_TYPE: EntityType = EntityType::ResourceTemplate;

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn set_label(&mut self, label: String) {
        self.label = label;
    }
}
