// ==========================================
// 批量导入核心 - 引擎层
// ==========================================
// 职责: 纯算法（层级线性化、结构差异），不访问目标库
// 红线: Engine 不拼 SQL
// ==========================================

pub mod diff;
pub mod flatten;
pub mod thesaurus;

// 重导出核心引擎
pub use diff::{compare, diff, diff_record, extract_scalar, Scalar};
pub use flatten::{flatten_fields, flatten_leaves};
pub use thesaurus::{ConceptLinks, ConceptNode, ThesaurusTree};
