// ==========================================
// 批量导入核心 - 导入配置
// ==========================================
// 职责: 导入运行所需配置项 + 配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::{NarrowerSort, UpdateMode};
use crate::importer::error::{ImportError, ImportResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 实体 flush 分块默认大小
pub const DEFAULT_ENTITY_CHUNK_SIZE: usize = 100;

/// 占位行批量插入分块默认大小
pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 500;

/// 分块大小上限（两类分块共用）
pub const MAX_CHUNK_SIZE: usize = 10_000;

// ==========================================
// ImportConfig - 单次运行的配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    pub entity_chunk_size: usize,
    pub insert_chunk_size: usize,
    pub narrower_sort: NarrowerSort,
    pub update_mode: UpdateMode,
    pub report_dir: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            entity_chunk_size: DEFAULT_ENTITY_CHUNK_SIZE,
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
            narrower_sort: NarrowerSort::None,
            update_mode: UpdateMode::Update,
            report_dir: default_report_dir(),
        }
    }
}

/// 默认报告目录: <用户数据目录>/bulk-import/reports，取不到时退回当前目录
pub fn default_report_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bulk-import")
        .join("reports")
}

impl ImportConfig {
    /// 通过读取接口装配配置（逐项读取，任一项非法即失败）
    pub fn load(reader: &dyn ImportConfigReader) -> ImportResult<Self> {
        Ok(Self {
            entity_chunk_size: reader.get_entity_chunk_size()?,
            insert_chunk_size: reader.get_insert_chunk_size()?,
            narrower_sort: reader.get_narrower_sort()?,
            update_mode: reader.get_update_mode()?,
            report_dir: reader.get_report_dir()?,
        })
    }

    pub fn with_entity_chunk_size(mut self, size: usize) -> Self {
        self.entity_chunk_size = size;
        self
    }

    pub fn with_report_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.report_dir = dir.into();
        self
    }

    /// 分块大小非正时报错；超过上限时收紧到上限
    pub fn validated(mut self) -> ImportResult<Self> {
        self.entity_chunk_size = check_chunk_size("entity_chunk_size", self.entity_chunk_size)?;
        self.insert_chunk_size = check_chunk_size("insert_chunk_size", self.insert_chunk_size)?;
        Ok(self)
    }
}

/// 分块大小校验（供配置读取实现复用）
pub fn check_chunk_size(key: &str, size: usize) -> ImportResult<usize> {
    if size == 0 {
        return Err(ImportError::ConfigValueError {
            key: key.to_string(),
            value: size.to_string(),
            message: "分块大小必须为正数".to_string(),
        });
    }
    Ok(size.min(MAX_CHUNK_SIZE))
}

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入运行所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
pub trait ImportConfigReader {
    /// 获取实体 flush 分块大小
    ///
    /// # 默认值
    /// - 100
    fn get_entity_chunk_size(&self) -> ImportResult<usize>;

    /// 获取占位行批量插入分块大小
    ///
    /// # 默认值
    /// - 500
    fn get_insert_chunk_size(&self) -> ImportResult<usize>;

    /// 获取层级子节点排序策略
    ///
    /// # 默认值
    /// - none（保持首次出现顺序）
    fn get_narrower_sort(&self) -> ImportResult<NarrowerSort>;

    /// 获取更新模式（决定是否计算差异）
    ///
    /// # 默认值
    /// - update
    fn get_update_mode(&self) -> ImportResult<UpdateMode>;

    fn get_report_dir(&self) -> ImportResult<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.entity_chunk_size, 100);
        assert_eq!(config.insert_chunk_size, 500);
        assert_eq!(config.narrower_sort, NarrowerSort::None);
        assert_eq!(config.update_mode, UpdateMode::Update);
        assert!(config.report_dir.ends_with("reports"));
    }

    #[test]
    fn test_validated_rejects_zero_and_clamps() {
        let zero = ImportConfig::default().with_entity_chunk_size(0);
        assert!(matches!(
            zero.validated(),
            Err(ImportError::ConfigValueError { .. })
        ));

        let huge = ImportConfig::default()
            .with_entity_chunk_size(MAX_CHUNK_SIZE * 3)
            .validated()
            .unwrap();
        assert_eq!(huge.entity_chunk_size, MAX_CHUNK_SIZE);
    }
}
