// ==========================================
// 批量导入核心 - 差异报告渲染器
// ==========================================
// 职责: DiffReport → 两种互补的表格布局
// 行布局: 每条记录 表头(字段名) / 前值 / 后值 / 符号 四行
// 列布局: 每个字段拆为 /1 /2 /? 三个子列，每条记录一行
// 红线: 文本单元格以公式触发字符开头时加 ' 前缀，防止表格软件求值
// ==========================================

use crate::domain::diff::DiffReport;
use crate::domain::types::DiffCode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// 固定前置列（标识、资源种类、错误标志）
pub const PREFERRED_COLUMNS: [&str; 3] = ["source_id", "resource_kind", "has_error"];

const FORMULA_TRIGGERS: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

// ==========================================
// Cell - 渲染后的单元格
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Text(String),
    Empty,
}

impl Cell {
    /// 文本单元格（已转义）
    pub fn text(value: impl AsRef<str>) -> Self {
        Cell::Text(escape_formula(value.as_ref()))
    }

    pub fn optional(value: Option<&str>) -> Self {
        value.map_or(Cell::Empty, Cell::text)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Cell::Text(s) => s,
            Cell::Empty => "",
        }
    }
}

pub fn escape_formula(value: &str) -> String {
    if value.starts_with(&FORMULA_TRIGGERS[..]) {
        format!("'{}", value)
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Row,
    Column,
}

// ==========================================
// ColumnKey - 字段列（重复字段按出现位置区分）
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub name: String,
    /// 同一记录内第几次出现（从 1 开始）
    pub occurrence: usize,
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.occurrence <= 1 {
            f.write_str(&self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.occurrence)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatCell {
    pub before: Option<String>,
    pub after: Option<String>,
    pub code: DiffCode,
}

/// 列布局的一行（可序列化，便于落盘暂存）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRow {
    pub source_id: String,
    pub resource_kind: Option<String>,
    pub has_error: bool,
    pub cells: Vec<(ColumnKey, FlatCell)>,
}

impl FlatRow {
    pub fn from_report(report: &DiffReport) -> Self {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let cells = report
            .entries
            .iter()
            .map(|entry| {
                let occurrence = seen.entry(entry.field.as_str()).or_insert(0);
                *occurrence += 1;
                (
                    ColumnKey {
                        name: entry.field.clone(),
                        occurrence: *occurrence,
                    },
                    FlatCell {
                        before: entry.before.clone(),
                        after: entry.after.clone(),
                        code: entry.code,
                    },
                )
            })
            .collect();

        Self {
            source_id: report.source_id.clone(),
            resource_kind: report.resource_kind.clone(),
            has_error: report.has_error,
            cells,
        }
    }

    fn prefix_cells(&self) -> Vec<Cell> {
        vec![
            Cell::text(&self.source_id),
            Cell::optional(self.resource_kind.as_deref()),
            Cell::text(if self.has_error { "1" } else { "0" }),
        ]
    }
}

// ==========================================
// 行布局
// ==========================================

/// 单条记录的四行: 表头 / 前值 / 后值 / 符号
pub fn render_rows(report: &DiffReport) -> Vec<Vec<Cell>> {
    let flat = FlatRow::from_report(report);
    let prefix = flat.prefix_cells();

    let mut header: Vec<Cell> = PREFERRED_COLUMNS.iter().map(|c| Cell::text(c)).collect();
    let mut before = prefix.clone();
    let mut after = prefix.clone();
    let mut symbols = prefix;

    for (key, cell) in &flat.cells {
        header.push(Cell::text(key.to_string()));
        before.push(Cell::optional(cell.before.as_deref()));
        after.push(Cell::optional(cell.after.as_deref()));
        symbols.push(Cell::text(cell.code.symbol()));
    }

    vec![header, before, after, symbols]
}

// ==========================================
// 列布局
// ==========================================

/// 列集合：前置列固定在前，其余按首次出现顺序
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    keys: Vec<ColumnKey>,
    known: HashSet<ColumnKey>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, row: &FlatRow) {
        for (key, _) in &row.cells {
            if self.known.insert(key.clone()) {
                self.keys.push(key.clone());
            }
        }
    }

    pub fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    pub fn header(&self) -> Vec<Cell> {
        let mut header: Vec<Cell> = PREFERRED_COLUMNS.iter().map(|c| Cell::text(c)).collect();
        for key in &self.keys {
            for suffix in ["/1", "/2", "/?"] {
                header.push(Cell::text(format!("{}{}", key, suffix)));
            }
        }
        header
    }

    /// 按列集合展开一行；记录中缺失的字段留空
    pub fn render(&self, row: &FlatRow) -> Vec<Cell> {
        let by_key: HashMap<&ColumnKey, &FlatCell> = row.cells.iter().map(|(k, c)| (k, c)).collect();
        let mut cells = row.prefix_cells();
        for key in &self.keys {
            match by_key.get(key) {
                Some(cell) => {
                    cells.push(Cell::optional(cell.before.as_deref()));
                    cells.push(Cell::optional(cell.after.as_deref()));
                    cells.push(Cell::text(cell.code.symbol()));
                }
                None => cells.extend([Cell::Empty, Cell::Empty, Cell::Empty]),
            }
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diff::DiffEntry;

    fn report(source_id: &str, entries: Vec<DiffEntry>) -> DiffReport {
        DiffReport {
            source_id: source_id.to_string(),
            resource_kind: Some("item".to_string()),
            has_error: entries.iter().any(|e| e.code == DiffCode::Error),
            entries,
        }
    }

    fn texts(cells: &[Cell]) -> Vec<&str> {
        cells.iter().map(Cell::as_str).collect()
    }

    #[test]
    fn test_formula_prefixes_are_escaped() {
        assert_eq!(escape_formula("=SUM(A1)"), "'=SUM(A1)");
        assert_eq!(escape_formula("@cmd"), "'@cmd");
        assert_eq!(escape_formula("-1"), "'-1");
        assert_eq!(escape_formula("plain"), "plain");
        assert_eq!(Cell::text("+"), Cell::Text("'+".to_string()));
    }

    #[test]
    fn test_row_layout() {
        let r = report(
            "7",
            vec![
                DiffEntry::new("title", Some("X".into()), Some("Y".into()), DiffCode::Changed),
                DiffEntry::new("note", None, Some("n".into()), DiffCode::Added),
            ],
        );
        let rows = render_rows(&r);
        assert_eq!(rows.len(), 4);
        assert_eq!(texts(&rows[0]), vec!["source_id", "resource_kind", "has_error", "title", "note"]);
        assert_eq!(texts(&rows[1]), vec!["7", "item", "0", "X", ""]);
        assert_eq!(texts(&rows[2]), vec!["7", "item", "0", "Y", "n"]);
        assert_eq!(texts(&rows[3]), vec!["7", "item", "0", "≠", "'+"]);
    }

    #[test]
    fn test_repeated_fields_are_positional() {
        let r = report(
            "1",
            vec![
                DiffEntry::new("subject", Some("a".into()), Some("a".into()), DiffCode::Unchanged),
                DiffEntry::new("subject", None, Some("b".into()), DiffCode::Added),
            ],
        );
        let flat = FlatRow::from_report(&r);
        let names: Vec<String> = flat.cells.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(names, vec!["subject", "subject[2]"]);
    }

    #[test]
    fn test_column_layout_first_seen_order_and_gaps() {
        let first = FlatRow::from_report(&report(
            "1",
            vec![DiffEntry::new("title", Some("X".into()), Some("X".into()), DiffCode::Unchanged)],
        ));
        let second = FlatRow::from_report(&report(
            "2",
            vec![
                DiffEntry::new("date", None, Some("2020".into()), DiffCode::Added),
                DiffEntry::new("title", Some("A".into()), None, DiffCode::Removed),
            ],
        ));

        let mut columns = ColumnSet::new();
        columns.observe(&first);
        columns.observe(&second);

        assert_eq!(
            texts(&columns.header()),
            vec![
                "source_id", "resource_kind", "has_error",
                "title/1", "title/2", "title/?",
                "date/1", "date/2", "date/?",
            ]
        );
        assert_eq!(
            texts(&columns.render(&first)),
            vec!["1", "item", "0", "X", "X", "'=", "", "", ""]
        );
        assert_eq!(
            texts(&columns.render(&second)),
            vec!["2", "item", "0", "A", "", "'-", "", "2020", "'+"]
        );
    }
}
