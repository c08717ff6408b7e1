// ==========================================
// 批量导入核心 - 核心库
// ==========================================
// 职责: 外部结构化记录导入关系型实体库
// 技术栈: Rust + SQLite
// 范围: 标识占位 / 冲突决策 / 分块落库 / 层级线性化 / 结构差异
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录、映射与类型
pub mod domain;

// 数据仓储层 - 实体库与批量上下文
pub mod repository;

// 引擎层 - 层级线性化与结构差异
pub mod engine;

// 导入层 - 分配、决策、落库
pub mod importer;

// 报告层 - 差异渲染与输出
pub mod report;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{DiffCode, EntityType, NarrowerSort, UpdateMode};

// 领域实体
pub use domain::{
    DiffEntry, DiffReport, EntityFields, IdMap, PhaseSummary, RunSignal, SourceRecord, TypeIdMap,
};

// 引擎
pub use engine::{diff, diff_record, ThesaurusTree};

// 导入
pub use importer::{
    ConflictResolver, IdAllocator, ImportContext, ImportError, ImportResult, Materializer,
    Resolution,
};

// 报告
pub use report::{DiffChecker, JsonReportSink, TabularReportSink};

// ==========================================
// 常量定义
// ==========================================

// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
