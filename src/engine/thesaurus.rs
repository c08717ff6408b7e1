// ==========================================
// 批量导入核心 - 层级（叙词表）线性化引擎
// ==========================================
// 职责: 扁平 父指针记录 → tops / parents / narrowers 三视图
// 输入: (id, parent_id, label) 序列 + 子节点排序策略
// 输出: ThesaurusTree（构建后冻结，只读）
// 红线: 父节点不在源集合中的记录不提升为顶层；链接生成时省略并告警
// ==========================================

use crate::domain::id_map::TypeIdMap;
use crate::domain::record::{ReferenceIssue, SourceRecord};
use crate::domain::types::NarrowerSort;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument, warn};

// ==========================================
// ConceptNode - 线性化输入
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptNode {
    pub id: String,
    /// None 表示无父节点（空串与 "0" 视为无）
    pub parent_id: Option<String>,
    pub label: String,
}

impl ConceptNode {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id
                .map(str::trim)
                .filter(|p| !is_falsy_parent(p))
                .map(str::to_string),
            label: label.into(),
        }
    }

    pub fn from_record(record: &SourceRecord) -> Self {
        Self::new(
            record.source_id.clone(),
            record.parent_id.as_deref(),
            record.label().unwrap_or_default(),
        )
    }
}

fn is_falsy_parent(parent: &str) -> bool {
    parent.is_empty() || parent == "0"
}

/// id 排序：都可解析为整数时按数值，整数排在非整数之前，其余按文本
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// ==========================================
// ThesaurusTree
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThesaurusTree {
    tops: Vec<String>,
    parents: BTreeMap<String, String>,
    narrowers: BTreeMap<String, Vec<String>>,
}

/// 链接生成结果（目标 id）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConceptLinks {
    pub broader: Option<i64>,
    pub narrower: Vec<i64>,
    pub is_top: bool,
    pub issues: Vec<ReferenceIssue>,
}

impl ThesaurusTree {
    /// 单遍构建
    ///
    /// 重复 id 只保留首次声明
    #[instrument(skip(nodes))]
    pub fn linearize<I>(nodes: I, sort: NarrowerSort) -> Self
    where
        I: IntoIterator<Item = ConceptNode>,
    {
        let mut seen = HashSet::new();
        let mut tops = Vec::new();
        let mut parents = BTreeMap::new();
        // parent → [(child id, "{label} <{id}>")]
        let mut pending: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();

        for node in nodes {
            if !seen.insert(node.id.clone()) {
                warn!(id = %node.id, "重复的概念 id，保留首次声明");
                continue;
            }
            match node.parent_id {
                None => tops.push(node.id),
                Some(parent) => {
                    let sort_key = format!("{} <{}>", node.label, node.id);
                    parents.insert(node.id.clone(), parent.clone());
                    pending.entry(parent).or_default().push((node.id, sort_key));
                }
            }
        }

        let narrowers = pending
            .into_iter()
            .map(|(parent, children)| {
                let mut unique = HashSet::new();
                let mut children: Vec<(String, String)> = children
                    .into_iter()
                    .filter(|(id, _)| unique.insert(id.clone()))
                    .collect();
                match sort {
                    NarrowerSort::None => {}
                    NarrowerSort::ById => children.sort_by(|a, b| compare_ids(&a.0, &b.0)),
                    NarrowerSort::ByLabel => children.sort_by_cached_key(|(_, key)| key.to_lowercase()),
                }
                (parent, children.into_iter().map(|(id, _)| id).collect())
            })
            .collect();

        let tree = Self {
            tops,
            parents,
            narrowers,
        };
        debug!(tops = tree.tops.len(), children = tree.parents.len(), "层级线性化完成");
        tree
    }

    pub fn tops(&self) -> &[String] {
        &self.tops
    }

    pub fn parents(&self) -> &BTreeMap<String, String> {
        &self.parents
    }

    pub fn narrowers(&self) -> &BTreeMap<String, Vec<String>> {
        &self.narrowers
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    pub fn narrowers_of(&self, id: &str) -> &[String] {
        self.narrowers.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_top(&self, id: &str) -> bool {
        self.tops.iter().any(|t| t == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.contains_key(id) || self.is_top(id)
    }

    /// 节点总数
    pub fn len(&self) -> usize {
        self.tops.len() + self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 父节点不在源集合中的节点
    pub fn orphans(&self) -> Vec<&str> {
        self.parents
            .iter()
            .filter(|(_, parent)| !self.contains(parent))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// 按概念 IdMap 生成链接；无法解析的引用记为问题并省略
    pub fn resolve_links(&self, id: &str, ids: &TypeIdMap) -> ConceptLinks {
        let mut links = ConceptLinks {
            is_top: self.is_top(id),
            ..ConceptLinks::default()
        };

        if let Some(parent) = self.parent_of(id) {
            match ids.get(parent) {
                Some(parent_id) => links.broader = Some(parent_id),
                None => links.issues.push(ReferenceIssue {
                    source_id: id.to_string(),
                    relation: "broader".to_string(),
                    missing_id: parent.to_string(),
                }),
            }
        }

        for child in self.narrowers_of(id) {
            match ids.get(child) {
                Some(child_id) => links.narrower.push(child_id),
                None => links.issues.push(ReferenceIssue {
                    source_id: id.to_string(),
                    relation: "narrower".to_string(),
                    missing_id: child.clone(),
                }),
            }
        }

        links
    }
}
