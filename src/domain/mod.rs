// ==========================================
// 批量导入核心 - 领域模型层
// ==========================================
// 职责: 定义源记录、标识映射、具名实体、差异与运行状态
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod diff;
pub mod id_map;
pub mod named;
pub mod record;
pub mod run;
pub mod types;

// 重导出核心类型
pub use diff::{DiffEntry, DiffReport};
pub use id_map::{IdMap, IdMapConflict, TypeIdMap};
pub use named::{CustomVocab, NamedEntity, ResourceTemplate, TemplateProperty, Vocabulary};
pub use record::{EntityFields, ReferenceIssue, SourceRecord, StoredEntity, LABEL_FIELD};
pub use run::{PhaseStatus, PhaseSummary, RunSignal};
pub use types::{DiffCode, EntityType, NarrowerSort, UpdateMode};
