// ==========================================
// 批量导入核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config::{
    check_chunk_size, default_report_dir, ImportConfigReader, DEFAULT_ENTITY_CHUNK_SIZE,
    DEFAULT_INSERT_CHUNK_SIZE,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::{NarrowerSort, UpdateMode};
use crate::importer::error::{ImportError, ImportResult};
use rusqlite::{params, Connection};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ImportResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ImportResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| lock_error(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| lock_error(e.to_string()))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ImportError::ConfigReadError {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供宿主复用）
    pub fn get_global_config_value(&self, key: &str) -> ImportResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ImportResult<()> {
        let conn = self.conn.lock().map_err(|e| lock_error(e.to_string()))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        debug!(config_key = key, value, "配置已写入");
        Ok(())
    }

    /// 读取并解析配置；缺失时使用默认值，格式非法时报错
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ImportResult<T>
    where
        T: FromStr,
        T::Err: ToString,
    {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) if raw.trim().is_empty() => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|e| ImportError::ConfigValueError {
                key: key.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            }),
        }
    }

    fn get_chunk_size(&self, key: &str, default: usize) -> ImportResult<usize> {
        let raw = self.get_config_value(key)?;
        let size = match raw.as_deref().map(str::trim) {
            None | Some("") => default as i64,
            Some(value) => value.parse::<i64>().map_err(|e| ImportError::ConfigValueError {
                key: key.to_string(),
                value: value.to_string(),
                message: e.to_string(),
            })?,
        };

        if size <= 0 {
            return Err(ImportError::ConfigValueError {
                key: key.to_string(),
                value: size.to_string(),
                message: "分块大小必须为正数".to_string(),
            });
        }
        check_chunk_size(key, size as usize)
    }
}

fn lock_error(message: String) -> ImportError {
    ImportError::ConfigReadError {
        key: "*".to_string(),
        message: format!("锁获取失败: {}", message),
    }
}

// ==========================================
// ImportConfigReader 实现
// ==========================================
impl ImportConfigReader for ConfigManager {
    fn get_entity_chunk_size(&self) -> ImportResult<usize> {
        self.get_chunk_size(config_keys::ENTITY_CHUNK_SIZE, DEFAULT_ENTITY_CHUNK_SIZE)
    }

    fn get_insert_chunk_size(&self) -> ImportResult<usize> {
        self.get_chunk_size(config_keys::INSERT_CHUNK_SIZE, DEFAULT_INSERT_CHUNK_SIZE)
    }

    fn get_narrower_sort(&self) -> ImportResult<NarrowerSort> {
        self.get_parsed_or_default(config_keys::NARROWER_SORT, NarrowerSort::None)
    }

    fn get_update_mode(&self) -> ImportResult<UpdateMode> {
        self.get_parsed_or_default(config_keys::UPDATE_MODE, UpdateMode::Update)
    }

    fn get_report_dir(&self) -> ImportResult<PathBuf> {
        Ok(self
            .get_config_value(config_keys::REPORT_DIR)?
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_report_dir))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 分块
    pub const ENTITY_CHUNK_SIZE: &str = "import/entity_chunk_size";
    pub const INSERT_CHUNK_SIZE: &str = "import/insert_chunk_size";

    // 层级
    pub const NARROWER_SORT: &str = "import/narrower_sort";

    // 更新模式与报告
    pub const UPDATE_MODE: &str = "import/update_mode";
    pub const REPORT_DIR: &str = "import/report_dir";
}
