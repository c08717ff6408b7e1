// ==========================================
// 批量导入核心 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供目标库访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,标识符集中校验
// ==========================================

pub mod batch_context;
pub mod entity_store;
pub mod error;
pub mod run_log_repo;
pub mod sqlite_store;
pub mod statement_builder;

// 重导出核心仓储
pub use batch_context::SqliteBatchContext;
pub use entity_store::{
    BatchContext, EntityStore, FlushedWrite, PendingWrite, SearchFilter, SqlValue, Statement,
    TableBinding, WriteTarget,
};
pub use error::{RepositoryError, RepositoryResult};
pub use run_log_repo::RunLogRepository;
pub use sqlite_store::SqliteEntityStore;
pub use statement_builder::{quote_identifier, BulkInsertBuilder, MAX_BOUND_PARAMETERS};
