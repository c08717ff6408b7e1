// ==========================================
// 批量导入核心 - 差异报告层
// ==========================================
// renderer: 行布局 / 列布局
// sinks: JSON 与表格输出端
// checker: 按更新模式驱动差异检查
// ==========================================

pub mod checker;
pub mod renderer;
pub mod sinks;

pub use checker::{DiffChecker, DiffOutcome, DiffPair};
pub use renderer::{escape_formula, render_rows, Cell, ColumnKey, ColumnSet, FlatCell, FlatRow, Layout};
pub use sinks::{JsonReportSink, TabularPaths, TabularReportSink};
