// ==========================================
// 批量导入核心 - 记录转换策略
// ==========================================
// PassThroughConverter: 字段直通（可重命名），剥离目标库专有字段
// ConceptLinkConverter: 叙词表概念，按 ThesaurusTree 生成上下位链接
// ==========================================

use crate::domain::id_map::TypeIdMap;
use crate::domain::named::DESTINATION_ONLY_FIELDS;
use crate::domain::record::{EntityFields, ReferenceIssue, SourceRecord};
use crate::domain::types::EntityType;
use crate::engine::thesaurus::ThesaurusTree;
use crate::importer::materializer::RecordConverter;
use crate::importer::validator::ValidationIssue;
use crate::repository::entity_store::FlushedWrite;
use tracing::warn;
use serde_json::{json, Value};

pub const BROADER_TERM: &str = "skos:broader";
pub const NARROWER_TERM: &str = "skos:narrower";
pub const TOP_CONCEPT_OF_TERM: &str = "skos:topConceptOf";
pub const IN_SCHEME_TERM: &str = "skos:inScheme";

/// 资源引用值对象
pub fn resource_link(destination_id: i64) -> Value {
    json!({
        "type": "resource",
        "value_resource_id": destination_id,
    })
}

// ==========================================
// PassThroughConverter
// ==========================================
pub struct PassThroughConverter {
    entity_type: EntityType,
    renames: Vec<(String, String)>,
}

impl PassThroughConverter {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            renames: Vec::new(),
        }
    }

    /// 源字段名 → 目标字段名
    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renames.push((from.into(), to.into()));
        self
    }
}

impl RecordConverter for PassThroughConverter {
    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn convert(&mut self, record: &SourceRecord) -> Result<EntityFields, Vec<ValidationIssue>> {
        let mut fields = EntityFields::new();
        for (name, value) in &record.fields {
            if DESTINATION_ONLY_FIELDS.contains(&name.as_str()) {
                continue;
            }
            let target = self
                .renames
                .iter()
                .find(|(from, _)| from == name)
                .map(|(_, to)| to.clone())
                .unwrap_or_else(|| name.clone());
            if fields.contains_key(&target) {
                return Err(vec![ValidationIssue::new(
                    record.source_id.as_str(),
                    target,
                    "字段重命名后重复",
                )]);
            }
            fields.insert(target, value.clone());
        }
        Ok(fields)
    }
}

// ==========================================
// ConceptLinkConverter
// ==========================================
pub struct ConceptLinkConverter<'t> {
    tree: &'t ThesaurusTree,
    ids: TypeIdMap,
    scheme_id: Option<i64>,
    issues: Vec<ReferenceIssue>,
}

impl<'t> ConceptLinkConverter<'t> {
    /// # 参数
    /// - ids: 概念类型的 IdMap 快照（占位分配后）；之后只按每次 flush 的增量更新
    pub fn new(tree: &'t ThesaurusTree, ids: &TypeIdMap) -> Self {
        Self {
            tree,
            ids: ids.clone(),
            scheme_id: None,
            issues: Vec::new(),
        }
    }

    /// 所属概念体系（目标 id）
    pub fn with_scheme(mut self, scheme_id: i64) -> Self {
        self.scheme_id = Some(scheme_id);
        self
    }
}

impl RecordConverter for ConceptLinkConverter<'_> {
    fn entity_type(&self) -> EntityType {
        EntityType::Item
    }

    fn convert(&mut self, record: &SourceRecord) -> Result<EntityFields, Vec<ValidationIssue>> {
        let mut fields: EntityFields = record
            .fields
            .iter()
            .filter(|(name, _)| !DESTINATION_ONLY_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for term in [BROADER_TERM, NARROWER_TERM, TOP_CONCEPT_OF_TERM, IN_SCHEME_TERM] {
            fields.remove(term);
        }

        let links = self.tree.resolve_links(&record.source_id, &self.ids);
        self.issues.extend(links.issues);

        if let Some(parent) = links.broader {
            fields.insert(BROADER_TERM.to_string(), json!([resource_link(parent)]));
        }
        if !links.narrower.is_empty() {
            let narrower: Vec<Value> = links.narrower.into_iter().map(resource_link).collect();
            fields.insert(NARROWER_TERM.to_string(), Value::Array(narrower));
        }
        if let Some(scheme) = self.scheme_id {
            fields.insert(IN_SCHEME_TERM.to_string(), json!([resource_link(scheme)]));
            if links.is_top {
                fields.insert(TOP_CONCEPT_OF_TERM.to_string(), json!([resource_link(scheme)]));
            }
        }

        Ok(fields)
    }

    fn refresh(&mut self, flushed: &[FlushedWrite]) {
        for write in flushed {
            if let Err(conflict) = self.ids.assign(&write.source_id, write.destination_id) {
                warn!(error = %conflict, "概念 id 映射与快照不一致，保留快照中的值");
            }
        }
    }

    fn take_reference_issues(&mut self) -> Vec<ReferenceIssue> {
        std::mem::take(&mut self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::NarrowerSort;
    use crate::engine::thesaurus::ConceptNode;

    #[test]
    fn test_pass_through_strips_and_renames() {
        let mut converter = PassThroughConverter::new(EntityType::Item).rename("title", "dcterms:title");
        let record = SourceRecord::new("1")
            .with_field("o:id", 5)
            .with_field("title", "Moby Dick");

        let fields = converter.convert(&record).unwrap();
        assert!(!fields.contains_key("o:id"));
        assert_eq!(fields["dcterms:title"], json!("Moby Dick"));
    }

    #[test]
    fn test_rename_collision_is_issue() {
        let mut converter = PassThroughConverter::new(EntityType::Item).rename("title", "label");
        let record = SourceRecord::new("1")
            .with_field("label", "a")
            .with_field("title", "b");
        let issues = converter.convert(&record).unwrap_err();
        assert_eq!(issues[0].field, "label");
    }

    #[test]
    fn test_concept_links_and_missing_parent() {
        let tree = ThesaurusTree::linearize(
            vec![
                ConceptNode::new("1", None, "root"),
                ConceptNode::new("2", Some("1"), "child"),
                ConceptNode::new("3", Some("404"), "orphan"),
            ],
            NarrowerSort::None,
        );
        let mut ids = TypeIdMap::new();
        ids.assign("1", 10).unwrap();
        ids.assign("2", 20).unwrap();
        ids.assign("3", 30).unwrap();

        let mut converter = ConceptLinkConverter::new(&tree, &ids).with_scheme(99);

        let root = converter.convert(&SourceRecord::new("1")).unwrap();
        assert_eq!(root[NARROWER_TERM], json!([{"type": "resource", "value_resource_id": 20}]));
        assert_eq!(root[TOP_CONCEPT_OF_TERM][0]["value_resource_id"], json!(99));

        let child = converter.convert(&SourceRecord::new("2")).unwrap();
        assert_eq!(child[BROADER_TERM][0]["value_resource_id"], json!(10));
        assert!(!child.contains_key(TOP_CONCEPT_OF_TERM));

        let orphan = converter.convert(&SourceRecord::new("3")).unwrap();
        assert!(!orphan.contains_key(BROADER_TERM));
        let issues = converter.take_reference_issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].relation, "broader");
        assert!(converter.take_reference_issues().is_empty());
    }

    #[test]
    fn test_refresh_applies_flushed_ids_only() {
        let tree = ThesaurusTree::linearize(
            vec![ConceptNode::new("1", None, "root"), ConceptNode::new("2", Some("1"), "child")],
            NarrowerSort::None,
        );
        let mut snapshot = TypeIdMap::new();
        snapshot.reserve("1");
        snapshot.reserve("2");
        let mut converter = ConceptLinkConverter::new(&tree, &snapshot);

        // 父节点尚未落库: 链接省略并记为引用问题
        let child = converter.convert(&SourceRecord::new("2")).unwrap();
        assert!(!child.contains_key(BROADER_TERM));
        assert_eq!(converter.take_reference_issues().len(), 1);

        converter.refresh(&[FlushedWrite {
            source_id: "1".to_string(),
            entity_type: EntityType::Item,
            destination_id: 41,
        }]);
        assert_eq!(converter.ids.get("1"), Some(41));
        assert_eq!(converter.ids.get("2"), None);

        let child = converter.convert(&SourceRecord::new("2")).unwrap();
        assert_eq!(child[BROADER_TERM][0]["value_resource_id"], json!(41));
    }
}
