// ==========================================
// 批量导入核心 - 实体存储 / 批量持久化上下文 Trait
// ==========================================
// 职责: 定义目标库访问接口（不包含实现）
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::domain::record::{EntityFields, StoredEntity};
use crate::domain::types::EntityType;
use crate::repository::error::RepositoryResult;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;
use serde_json::Value;

// ==========================================
// SqlValue - 绑定参数 / 查询结果单元
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        v.map(SqlValue::Integer).unwrap_or(SqlValue::Null)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::from(rusqlite::types::Null),
            SqlValue::Integer(i) => ToSqlOutput::from(*i),
            SqlValue::Real(f) => ToSqlOutput::from(*f),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for SqlValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                SqlValue::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}

// ==========================================
// Statement - 参数化语句
// ==========================================
// 值一律通过绑定参数传入，SQL 文本只包含经过校验的标识符
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

// ==========================================
// TableBinding - 实体类型 → 数据表绑定
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub table: String,
    /// 占位行写入标记值的列
    pub keep_id_column: String,
    /// 共享表的类型鉴别列及取值（如 resource.resource_type = 'item'）
    pub discriminator: Option<(String, String)>,
}

impl TableBinding {
    pub fn new(table: impl Into<String>, keep_id_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            keep_id_column: keep_id_column.into(),
            discriminator: None,
        }
    }

    pub fn with_discriminator(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.discriminator = Some((column.into(), value.into()));
        self
    }
}

// ==========================================
// SearchFilter - 检索条件
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub label: Option<String>,
    pub field_equals: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

impl SearchFilter {
    pub fn by_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field_equals.push((name.into(), value.into()));
        self
    }

    pub fn matches_fields(&self, fields: &EntityFields) -> bool {
        self.field_equals
            .iter()
            .all(|(name, expected)| fields.get(name) == Some(expected))
    }
}

// ==========================================
// EntityStore Trait
// ==========================================
// 实现者: SqliteEntityStore（使用 rusqlite）
pub trait EntityStore {
    /// 实体类型的数据表绑定；未绑定返回 None
    fn binding(&self, entity_type: EntityType) -> Option<&TableBinding>;

    /// 新建实体，返回目标 id
    fn create(&self, entity_type: EntityType, fields: &EntityFields) -> RepositoryResult<i64>;

    /// 按 id 读取；不存在返回 RepositoryError::NotFound
    fn read(&self, entity_type: EntityType, id: i64) -> RepositoryResult<StoredEntity>;

    fn search(
        &self,
        entity_type: EntityType,
        filter: &SearchFilter,
    ) -> RepositoryResult<Vec<StoredEntity>>;

    /// 覆盖写入字段（标签列随 label 字段同步）
    fn update(
        &self,
        entity_type: EntityType,
        id: i64,
        fields: &EntityFields,
    ) -> RepositoryResult<()>;

    /// 底层语句执行（仅供占位分配器使用）
    fn execute_statement(&self, statement: &Statement) -> RepositoryResult<usize>;

    /// 底层查询（仅供占位分配器使用）
    fn execute_query(&self, statement: &Statement) -> RepositoryResult<Vec<Vec<SqlValue>>>;
}

// ==========================================
// PendingWrite - 待持久化写入
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    /// 新建行
    New,
    /// 填充已有行（占位行）
    Existing(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub source_id: String,
    pub entity_type: EntityType,
    pub target: WriteTarget,
    pub fields: EntityFields,
}

/// 已落库的写入：源 id → 目标 id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedWrite {
    pub source_id: String,
    pub entity_type: EntityType,
    pub destination_id: i64,
}

// ==========================================
// BatchContext Trait - 批量持久化上下文
// ==========================================
// 实现者: SqliteBatchContext
pub trait BatchContext {
    /// 暂存写入（不落库）
    fn stage(&mut self, write: PendingWrite);

    /// 将暂存写入持久化，按暂存顺序返回结果
    fn flush(&mut self) -> RepositoryResult<Vec<FlushedWrite>>;

    /// 释放已跟踪的内存实体
    fn clear(&mut self);

    /// 查找实体（先查跟踪集，再查目标库）；不存在返回 None
    fn find(&mut self, entity_type: EntityType, id: i64) -> RepositoryResult<Option<StoredEntity>>;

    fn staged_len(&self) -> usize;
}
