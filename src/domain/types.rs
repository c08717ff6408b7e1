// ==========================================
// 批量导入核心 - 领域类型定义
// ==========================================
// 职责: 实体类型、更新模式、层级排序策略、差异代码
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 实体类型 (Entity Type)
// ==========================================
// 目标库中可被导入的实体种类，IdMap 以此分区
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Item,             // 条目
    ItemSet,          // 条目集
    Media,            // 媒体
    Asset,            // 资产文件
    Vocabulary,       // 词汇表
    Property,         // 属性
    ResourceClass,    // 资源类
    CustomVocab,      // 自定义词表
    ResourceTemplate, // 资源模板
}

impl EntityType {
    pub const ALL: [EntityType; 9] = [
        EntityType::Item,
        EntityType::ItemSet,
        EntityType::Media,
        EntityType::Asset,
        EntityType::Vocabulary,
        EntityType::Property,
        EntityType::ResourceClass,
        EntityType::CustomVocab,
        EntityType::ResourceTemplate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Item => "item",
            EntityType::ItemSet => "item_set",
            EntityType::Media => "media",
            EntityType::Asset => "asset",
            EntityType::Vocabulary => "vocabulary",
            EntityType::Property => "property",
            EntityType::ResourceClass => "resource_class",
            EntityType::CustomVocab => "custom_vocab",
            EntityType::ResourceTemplate => "resource_template",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("未知实体类型: {}", s))
    }
}

// ==========================================
// 更新模式 (Update Mode)
// ==========================================
// 决定已存在记录的处理方式，同时决定是否执行差异计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    Append,  // 追加值
    Revise,  // 修订（仅覆盖非空值）
    Update,  // 更新（覆盖同名字段）
    Replace, // 整体替换
    Create,  // 仅新建
}

impl UpdateMode {
    /// 是否需要对 before/after 计算差异
    ///
    /// 新建模式下不存在 "before" 状态，跳过差异计算。
    pub fn requires_diff(&self) -> bool {
        !matches!(self, UpdateMode::Create)
    }
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateMode::Append => write!(f, "append"),
            UpdateMode::Revise => write!(f, "revise"),
            UpdateMode::Update => write!(f, "update"),
            UpdateMode::Replace => write!(f, "replace"),
            UpdateMode::Create => write!(f, "create"),
        }
    }
}

impl FromStr for UpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(UpdateMode::Append),
            "revise" => Ok(UpdateMode::Revise),
            "update" => Ok(UpdateMode::Update),
            "replace" => Ok(UpdateMode::Replace),
            "create" => Ok(UpdateMode::Create),
            other => Err(format!("未知更新模式: {}", other)),
        }
    }
}

// ==========================================
// 下位词排序策略 (Narrower Sort)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NarrowerSort {
    #[default]
    None,    // 保持首次出现顺序
    ById,    // 按 id 数值升序
    ByLabel, // 按标签（忽略大小写）字母序
}

impl fmt::Display for NarrowerSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NarrowerSort::None => write!(f, "none"),
            NarrowerSort::ById => write!(f, "by-id"),
            NarrowerSort::ByLabel => write!(f, "by-label"),
        }
    }
}

impl FromStr for NarrowerSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(NarrowerSort::None),
            "by-id" | "id" => Ok(NarrowerSort::ById),
            "by-label" | "label" | "alpha" => Ok(NarrowerSort::ByLabel),
            other => Err(format!("未知排序策略: {}", other)),
        }
    }
}

// ==========================================
// 差异代码 (Diff Code)
// ==========================================
// 渲染为单字符符号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffCode {
    Unchanged, // =
    Added,     // +
    Removed,   // -
    Changed,   // ≠
    Error,     // ×
    Unknown,   // ?
}

impl DiffCode {
    pub fn symbol(&self) -> &'static str {
        match self {
            DiffCode::Unchanged => "=",
            DiffCode::Added => "+",
            DiffCode::Removed => "-",
            DiffCode::Changed => "≠",
            DiffCode::Error => "×",
            DiffCode::Unknown => "?",
        }
    }

    /// 符号反解析；无法识别的符号落入 Unknown
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            "=" => DiffCode::Unchanged,
            "+" => DiffCode::Added,
            "-" => DiffCode::Removed,
            "≠" => DiffCode::Changed,
            "×" => DiffCode::Error,
            _ => DiffCode::Unknown,
        }
    }
}

impl fmt::Display for DiffCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
