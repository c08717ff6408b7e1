// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================

#![allow(dead_code)]

use bulk_import::db::{init_schema, open_sqlite_connection};
use bulk_import::domain::SourceRecord;
use bulk_import::repository::{SqlValue, SqliteEntityStore};
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = open_sqlite_connection(&db_path)?;
    init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开共享连接（同一连接供 store / 配置 / 运行日志使用）
pub fn shared_connection(db_path: &str) -> Arc<Mutex<Connection>> {
    let conn = open_sqlite_connection(db_path).expect("Failed to open test db");
    Arc::new(Mutex::new(conn))
}

pub fn open_store(db_path: &str) -> SqliteEntityStore {
    SqliteEntityStore::new(db_path).expect("Failed to create SqliteEntityStore")
}

/// 占位行默认值
pub fn placeholder_defaults() -> Vec<(&'static str, SqlValue)> {
    vec![("owner_id", SqlValue::Integer(1))]
}

pub fn count_rows(store: &SqliteEntityStore, table: &str) -> i64 {
    let conn = store.connection();
    let conn = conn.lock().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap()
}

/// 当前连接上残留的暂存表数量
pub fn count_scratch_tables(store: &SqliteEntityStore) -> i64 {
    let conn = store.connection();
    let conn = conn.lock().unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_temp_master WHERE name LIKE 'bulk_import_scratch_%'",
        [],
        |row| row.get(0),
    )
    .unwrap()
}

/// 生成 n 条带标题的条目记录（源 id 从 1 开始）
pub fn item_records(n: usize) -> Vec<SourceRecord> {
    (1..=n)
        .map(|i| {
            SourceRecord::new(i.to_string())
                .with_field("label", format!("Item {}", i))
                .with_field("dcterms:title", format!("Title {}", i))
        })
        .collect()
}

/// 小型叙词表: 1 → (2, 3)，2 → 4，5 为顶层，6 的父节点缺失
pub fn concept_records() -> Vec<SourceRecord> {
    vec![
        SourceRecord::new("1").with_parent("0").with_field("label", "Animals"),
        SourceRecord::new("2").with_parent("1").with_field("label", "Mammals"),
        SourceRecord::new("3").with_parent("1").with_field("label", "Birds"),
        SourceRecord::new("4").with_parent("2").with_field("label", "Cats"),
        SourceRecord::new("5").with_field("label", "Plants"),
        SourceRecord::new("6").with_parent("99").with_field("label", "Lost"),
    ]
}
