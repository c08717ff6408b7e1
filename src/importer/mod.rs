// ==========================================
// 批量导入核心 - 导入层
// ==========================================
// 职责: 占位分配 → 具名实体冲突决策 → 分块落库
// 支持: CSV / Excel 源文件读取
// ==========================================

// 模块声明
pub mod allocator;
pub mod conflict_resolver;
pub mod context;
pub mod converters;
pub mod error;
pub mod file_source;
pub mod materializer;
pub mod validator;

// 重导出核心类型
pub use allocator::{generate_run_prefix, AllocationReport, IdAllocator, IdSource};
pub use conflict_resolver::{ConflictKey, ConflictResolver, NamedEntityImporter, Resolution};
pub use context::{ImportContext, RunOutcome};
pub use converters::{ConceptLinkConverter, PassThroughConverter};
pub use error::{ImportError, ImportResult};
pub use file_source::{read_source_file, CsvSource, ExcelSource, SourceLayout};
pub use materializer::{MaterializeStats, Materializer, RecordConverter};
pub use validator::{DefaultValidator, EntityValidator, ValidationIssue};
