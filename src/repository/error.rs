// ==========================================
// 批量导入核心 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束违反: {0}")]
    ForeignKeyViolation(String),

    // ===== 语句构建错误 =====
    #[error("非法标识符: {0}")]
    InvalidIdentifier(String),

    #[error("非法语句: {0}")]
    InvalidStatement(String),

    #[error("实体类型未绑定数据表: {0}")]
    UnknownBinding(String),

    // ===== 数据质量错误 =====
    #[error("字段序列化失败: {0}")]
    SerializationError(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, Some(msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueConstraintViolation(msg)
                } else if msg.contains("FOREIGN KEY") {
                    RepositoryError::ForeignKeyViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::SqliteFailure(_, Some(msg)) => RepositoryError::DatabaseQueryError(msg),
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "row".to_string(),
                id: "?".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_primary_key_collision_maps_to_unique_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t (id) VALUES (1);")
            .unwrap();
        let err: RepositoryError = conn.execute("INSERT INTO t (id) VALUES (1)", []).unwrap_err().into();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }

    #[test]
    fn test_dangling_reference_maps_to_foreign_key_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id INTEGER PRIMARY KEY);
             CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id));",
        )
        .unwrap();
        let err: RepositoryError = conn
            .execute("INSERT INTO child (id, parent_id) VALUES (1, 99)", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        let err: RepositoryError = conn
            .query_row("SELECT 1 WHERE 0", [], |row| row.get::<_, i64>(0))
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
