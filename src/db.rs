// ==========================================
// 批量导入核心 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少宿主并发读取时的偶发 busy 错误
// - 提供目标库最小建表脚本（实体表 + 配置表 + 运行日志表）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

// 实体表统一结构：label 列兼作占位行的 keep-id 列
const ENTITY_TABLES: [&str; 7] = [
    "asset",
    "vocabulary",
    "property",
    "resource_class",
    "custom_vocab",
    "resource_template",
    "resource",
];

fn entity_table_ddl(table: &str) -> String {
    let discriminator = if table == "resource" {
        "    resource_type TEXT NOT NULL,\n"
    } else {
        ""
    };
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n\
         \x20   id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
         {discriminator}\
         \x20   label TEXT,\n\
         \x20   owner_id INTEGER,\n\
         \x20   fields_json TEXT NOT NULL DEFAULT '{{}}',\n\
         \x20   created_at TEXT NOT NULL DEFAULT (datetime('now')),\n\
         \x20   updated_at TEXT NOT NULL DEFAULT (datetime('now'))\n\
         );\n\
         CREATE INDEX IF NOT EXISTS idx_{table}_label ON {table}(label);\n",
    )
}

const SUPPORT_TABLES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS import_run_log (
    log_id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    phase TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    created INTEGER NOT NULL,
    skipped INTEGER NOT NULL,
    total INTEGER NOT NULL,
    status TEXT NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    message TEXT,
    logged_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_import_run_log_run ON import_run_log(run_id);
"#;

/// 初始化目标库结构（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let mut ddl = String::from(SUPPORT_TABLES_DDL);
    for table in ENTITY_TABLES {
        ddl.push_str(&entity_table_ddl(table));
    }
    ddl.push_str(
        "CREATE INDEX IF NOT EXISTS idx_resource_type ON resource(resource_type);\n",
    );
    conn.execute_batch(&ddl)?;

    if read_schema_version(conn)?.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 读取 schema_version（若表不存在或为空则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_entity_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for table in ENTITY_TABLES {
            let exists: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "缺少表 {}", table);
        }
    }

    #[test]
    fn test_schema_version_absent_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);
    }
}
