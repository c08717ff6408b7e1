// ==========================================
// 批量导入核心 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分级: 配置 / 冲突 / 中止 为阶段级致命错误；
//       校验与引用问题是记录级可恢复问题，不走此类型
// ==========================================

use crate::domain::id_map::IdMapConflict;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 配置错误 =====
    #[error("配置错误 ({entity_type}): {message}")]
    Configuration { entity_type: String, message: String },

    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 标识冲突 =====
    #[error("显式 id 与目标库已有 id 冲突 ({entity_type}): {ids:?}")]
    IdConflict { entity_type: String, ids: Vec<i64> },

    #[error(transparent)]
    IdReassigned(#[from] IdMapConflict),

    // ===== 运行中止 =====
    #[error("阶段 {phase} ({entity_type}) 已中止: 运行出错或收到停止请求")]
    Halted { phase: String, entity_type: String },

    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xls/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("字段映射失败 (行 {row}): {message}")]
    FieldMappingError { row: usize, message: String },

    // ===== 报告输出错误 =====
    #[error("报告输出失败 ({path}): {message}")]
    ReportIo { path: String, message: String },

    #[error("序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),

    // ===== 数据库错误 =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn configuration(entity_type: impl ToString, message: impl Into<String>) -> Self {
        ImportError::Configuration {
            entity_type: entity_type.to_string(),
            message: message.into(),
        }
    }

    /// 是否为阶段级致命错误（需置位运行错误标志）
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ImportError::Halted { .. })
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<rusqlite::Error>（经仓储层分类）
impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Repository(RepositoryError::from(err))
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
