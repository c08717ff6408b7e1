// ==========================================
// 批量导入核心 - 实体存储 SQLite 实现
// ==========================================
// 职责: 实现 EntityStore（使用 rusqlite）
// 红线: Repository 不含业务规则，只做数据 CRUD
// 约束: 所有值使用参数绑定；表名/列名经 quote_identifier 校验
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::record::{EntityFields, StoredEntity, LABEL_FIELD};
use crate::domain::types::EntityType;
use crate::repository::entity_store::{EntityStore, SearchFilter, SqlValue, Statement, TableBinding};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::statement_builder::quote_identifier;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// SqliteEntityStore
// ==========================================
pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
    bindings: HashMap<EntityType, TableBinding>,
}

impl SqliteEntityStore {
    /// 创建新的 Store 实例（使用默认表绑定）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self::from_connection(Arc::new(Mutex::new(conn))))
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self::with_bindings(conn, Self::default_bindings())
    }

    pub fn with_bindings(
        conn: Arc<Mutex<Connection>>,
        bindings: HashMap<EntityType, TableBinding>,
    ) -> Self {
        Self { conn, bindings }
    }

    /// 默认表绑定（与 db::init_schema 建表一致）
    pub fn default_bindings() -> HashMap<EntityType, TableBinding> {
        EntityType::ALL
            .iter()
            .map(|t| {
                let binding = match t {
                    EntityType::Item | EntityType::ItemSet | EntityType::Media => {
                        TableBinding::new("resource", "label")
                            .with_discriminator("resource_type", t.as_str())
                    }
                    _ => TableBinding::new(t.as_str(), "label"),
                };
                (*t, binding)
            })
            .collect()
    }

    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// 在持有连接锁的情况下执行操作
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        f(&conn)
    }

    pub(crate) fn binding_or_err(&self, entity_type: EntityType) -> RepositoryResult<&TableBinding> {
        self.bindings
            .get(&entity_type)
            .ok_or_else(|| RepositoryError::UnknownBinding(entity_type.to_string()))
    }

    /// 在给定连接（或事务）上插入一行
    pub(crate) fn insert_row(
        conn: &Connection,
        binding: &TableBinding,
        fields: &EntityFields,
    ) -> RepositoryResult<i64> {
        let mut columns = vec![quote_identifier(&binding.keep_id_column)?, quote_identifier("fields_json")?];
        let mut values = vec![label_of(fields), SqlValue::Text(serde_json::to_string(fields)?)];
        if let Some((column, value)) = &binding.discriminator {
            columns.push(quote_identifier(column)?);
            values.push(SqlValue::Text(value.clone()));
        }

        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&binding.table)?,
            columns.join(", "),
            placeholders
        );

        conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    /// 在给定连接（或事务）上覆盖一行的字段
    pub(crate) fn update_row(
        conn: &Connection,
        binding: &TableBinding,
        entity_type: EntityType,
        id: i64,
        fields: &EntityFields,
    ) -> RepositoryResult<()> {
        let (where_sql, mut params) = id_condition(binding, id, 3)?;
        let sql = format!(
            "UPDATE {} SET {} = ?1, \"fields_json\" = ?2, \"updated_at\" = datetime('now') WHERE {}",
            quote_identifier(&binding.table)?,
            quote_identifier(&binding.keep_id_column)?,
            where_sql
        );

        let mut values = vec![label_of(fields), SqlValue::Text(serde_json::to_string(fields)?)];
        values.append(&mut params);

        let affected = conn.execute(&sql, params_from_iter(values.iter()))?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: entity_type.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn read_row(
        conn: &Connection,
        binding: &TableBinding,
        entity_type: EntityType,
        id: i64,
    ) -> RepositoryResult<StoredEntity> {
        let (where_sql, params) = id_condition(binding, id, 1)?;
        let sql = format!(
            "SELECT \"id\", {}, \"owner_id\", \"fields_json\" FROM {} WHERE {}",
            quote_identifier(&binding.keep_id_column)?,
            quote_identifier(&binding.table)?,
            where_sql
        );

        let row = conn.query_row(&sql, params_from_iter(params.iter()), read_raw_row);
        match row {
            Ok(raw) => raw.into_entity(entity_type),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                entity: entity_type.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// 标签字段 → keep-id 列值
fn label_of(fields: &EntityFields) -> SqlValue {
    match fields.get(LABEL_FIELD) {
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        _ => SqlValue::Null,
    }
}

/// `id = ?n [AND 鉴别列 = ?n+1]`
fn id_condition(
    binding: &TableBinding,
    id: i64,
    first_param: usize,
) -> RepositoryResult<(String, Vec<SqlValue>)> {
    let mut sql = format!("\"id\" = ?{}", first_param);
    let mut params = vec![SqlValue::Integer(id)];
    if let Some((column, value)) = &binding.discriminator {
        sql.push_str(&format!(" AND {} = ?{}", quote_identifier(column)?, first_param + 1));
        params.push(SqlValue::Text(value.clone()));
    }
    Ok((sql, params))
}

// 行映射的中间结构：JSON 解析放在 rusqlite 闭包之外
struct RawRow {
    id: i64,
    label: Option<String>,
    owner_id: Option<i64>,
    fields_json: String,
}

impl RawRow {
    fn into_entity(self, entity_type: EntityType) -> RepositoryResult<StoredEntity> {
        let fields = match serde_json::from_str::<Value>(&self.fields_json)? {
            Value::Object(map) => map,
            _ => EntityFields::new(),
        };
        Ok(StoredEntity {
            id: self.id,
            entity_type,
            label: self.label,
            owner_id: self.owner_id,
            fields,
        })
    }
}

fn read_raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        label: row.get(1)?,
        owner_id: row.get(2)?,
        fields_json: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "{}".to_string()),
    })
}

impl EntityStore for SqliteEntityStore {
    fn binding(&self, entity_type: EntityType) -> Option<&TableBinding> {
        self.bindings.get(&entity_type)
    }

    fn create(&self, entity_type: EntityType, fields: &EntityFields) -> RepositoryResult<i64> {
        let binding = self.binding_or_err(entity_type)?;
        self.with_conn(|conn| Self::insert_row(conn, binding, fields))
    }

    fn read(&self, entity_type: EntityType, id: i64) -> RepositoryResult<StoredEntity> {
        let binding = self.binding_or_err(entity_type)?;
        self.with_conn(|conn| Self::read_row(conn, binding, entity_type, id))
    }

    fn search(
        &self,
        entity_type: EntityType,
        filter: &SearchFilter,
    ) -> RepositoryResult<Vec<StoredEntity>> {
        let binding = self.binding_or_err(entity_type)?;
        let label_column = quote_identifier(&binding.keep_id_column)?;

        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some((column, value)) = &binding.discriminator {
            params.push(SqlValue::Text(value.clone()));
            conditions.push(format!("{} = ?{}", quote_identifier(column)?, params.len()));
        }
        if let Some(label) = &filter.label {
            params.push(SqlValue::Text(label.clone()));
            conditions.push(format!("{} = ?{}", label_column, params.len()));
        }
        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT \"id\", {}, \"owner_id\", \"fields_json\" FROM {}{} ORDER BY \"id\"",
            label_column,
            quote_identifier(&binding.table)?,
            where_sql
        );

        let raw_rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(params.iter()), read_raw_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let mut entities = Vec::new();
        for raw in raw_rows {
            let entity = raw.into_entity(entity_type)?;
            if !filter.matches_fields(&entity.fields) {
                continue;
            }
            entities.push(entity);
            if filter.limit.is_some_and(|limit| entities.len() >= limit) {
                break;
            }
        }

        Ok(entities)
    }

    fn update(
        &self,
        entity_type: EntityType,
        id: i64,
        fields: &EntityFields,
    ) -> RepositoryResult<()> {
        let binding = self.binding_or_err(entity_type)?;
        self.with_conn(|conn| Self::update_row(conn, binding, entity_type, id, fields))
    }

    fn execute_statement(&self, statement: &Statement) -> RepositoryResult<usize> {
        self.with_conn(|conn| {
            let affected = conn.execute(&statement.sql, params_from_iter(statement.params.iter()))?;
            Ok(affected)
        })
    }

    fn execute_query(&self, statement: &Statement) -> RepositoryResult<Vec<Vec<SqlValue>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&statement.sql)?;
            let width = stmt.column_count();
            let rows = stmt
                .query_map(params_from_iter(statement.params.iter()), |row| {
                    (0..width)
                        .map(|i| row.get::<_, SqlValue>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
