// ==========================================
// 批量导入核心 - 报告输出端
// ==========================================
// JsonReportSink: 原始差异集合，流式写出 JSON 数组
// TabularReportSink: 行布局直接写出；列布局先落盘暂存，结束时补表头一次写出
// 约束: 一次性写入（create_new），文件名带时间戳 + 随机后缀；结束时输出路径日志
// ==========================================

use crate::domain::diff::DiffReport;
use crate::importer::error::{ImportError, ImportResult};
use crate::report::renderer::{render_rows, Cell, ColumnSet, FlatRow, Layout};
use chrono::Local;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

fn report_io(path: &Path, err: impl ToString) -> ImportError {
    ImportError::ReportIo {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// <stem>-<YYYYmmdd-HHMMSS>-<6 hex>
fn unique_base(dir: &Path, stem: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    let suffix = &Uuid::new_v4().simple().to_string()[..6];
    dir.join(format!("{}-{}-{}", stem, stamp, suffix))
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn create_new(path: &Path) -> ImportResult<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| report_io(parent, e))?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| report_io(path, e))
}

// ==========================================
// JsonReportSink
// ==========================================
pub struct JsonReportSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl JsonReportSink {
    pub fn create(dir: &Path, stem: &str) -> ImportResult<Self> {
        let path = with_suffix(&unique_base(dir, stem), ".json");
        let mut writer = BufWriter::new(create_new(&path)?);
        writer.write_all(b"[").map_err(|e| report_io(&path, e))?;
        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> ImportResult<()> {
        if self.written > 0 {
            self.writer.write_all(b",").map_err(|e| report_io(&self.path, e))?;
        }
        self.writer.write_all(b"\n").map_err(|e| report_io(&self.path, e))?;
        serde_json::to_writer(&mut self.writer, item)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(mut self) -> ImportResult<PathBuf> {
        self.writer.write_all(b"\n]\n").map_err(|e| report_io(&self.path, e))?;
        self.writer.flush().map_err(|e| report_io(&self.path, e))?;
        info!(path = %self.path.display(), records = self.written, "JSON 报告已写出");
        Ok(self.path)
    }

    /// 单个文档（非数组），如 IdMap 导出
    pub fn write_document<T: Serialize>(dir: &Path, stem: &str, value: &T) -> ImportResult<PathBuf> {
        let path = with_suffix(&unique_base(dir, stem), ".json");
        let mut writer = BufWriter::new(create_new(&path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| report_io(&path, e))?;
        Ok(path)
    }
}

// ==========================================
// TabularReportSink
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularPaths {
    pub rows: PathBuf,
    pub columns: PathBuf,
}

impl TabularPaths {
    pub fn path(&self, layout: Layout) -> &Path {
        match layout {
            Layout::Row => &self.rows,
            Layout::Column => &self.columns,
        }
    }
}

pub struct TabularReportSink {
    paths: TabularPaths,
    rows: csv::Writer<File>,
    columns_file: File,
    columns: ColumnSet,
    spool: BufWriter<File>,
    written: usize,
}

fn cell_strings(cells: &[Cell]) -> Vec<&str> {
    cells.iter().map(Cell::as_str).collect()
}

impl TabularReportSink {
    pub fn create(dir: &Path, stem: &str) -> ImportResult<Self> {
        let base = unique_base(dir, stem);
        let paths = TabularPaths {
            rows: with_suffix(&base, "-rows.csv"),
            columns: with_suffix(&base, "-columns.csv"),
        };
        let rows = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(create_new(&paths.rows)?);
        let columns_file = create_new(&paths.columns)?;
        let spool = tempfile::tempfile().map_err(|e| report_io(&paths.columns, e))?;
        debug!(rows = %paths.rows.display(), "表格报告已创建");

        Ok(Self {
            paths,
            rows,
            columns_file,
            columns: ColumnSet::new(),
            spool: BufWriter::new(spool),
            written: 0,
        })
    }

    pub fn write(&mut self, report: &DiffReport) -> ImportResult<()> {
        for row in render_rows(report) {
            self.rows
                .write_record(cell_strings(&row))
                .map_err(|e| report_io(&self.paths.rows, e))?;
        }

        let flat = FlatRow::from_report(report);
        self.columns.observe(&flat);
        serde_json::to_writer(&mut self.spool, &flat)?;
        self.spool
            .write_all(b"\n")
            .map_err(|e| report_io(&self.paths.columns, e))?;
        self.written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> ImportResult<TabularPaths> {
        self.rows.flush().map_err(|e| report_io(&self.paths.rows, e))?;

        let columns_path = self.paths.columns.clone();
        let mut spool = self
            .spool
            .into_inner()
            .map_err(|e| report_io(&columns_path, e.error()))?;
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| report_io(&columns_path, e))?;

        let mut out = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(BufWriter::new(self.columns_file));
        out.write_record(cell_strings(&self.columns.header()))
            .map_err(|e| report_io(&columns_path, e))?;
        for line in BufReader::new(spool).lines() {
            let line = line.map_err(|e| report_io(&columns_path, e))?;
            let flat: FlatRow = serde_json::from_str(&line)?;
            out.write_record(cell_strings(&self.columns.render(&flat)))
                .map_err(|e| report_io(&columns_path, e))?;
        }
        out.flush().map_err(|e| report_io(&columns_path, e))?;

        info!(
            rows = %self.paths.rows.display(),
            columns = %self.paths.columns.display(),
            records = self.written,
            "表格报告已写出"
        );
        Ok(self.paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::diff::DiffEntry;
    use crate::domain::types::DiffCode;

    fn sample(source_id: &str, field: &str) -> DiffReport {
        DiffReport {
            source_id: source_id.to_string(),
            resource_kind: None,
            has_error: false,
            entries: vec![DiffEntry::new(field, None, Some("=cmd".into()), DiffCode::Added)],
        }
    }

    #[test]
    fn test_json_sink_writes_array() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonReportSink::create(dir.path(), "diff").unwrap();
        sink.write(&sample("1", "title")).unwrap();
        sink.write(&sample("2", "title")).unwrap();
        let path = sink.finish().unwrap();

        let parsed: Vec<DiffReport> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].source_id, "2");
    }

    #[test]
    fn test_empty_json_sink_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = JsonReportSink::create(dir.path(), "diff").unwrap().finish().unwrap();
        let parsed: Vec<DiffReport> = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_tabular_sink_writes_both_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = TabularReportSink::create(dir.path(), "diff").unwrap();
        sink.write(&sample("1", "title")).unwrap();
        sink.write(&sample("2", "date")).unwrap();
        let paths = sink.finish().unwrap();

        let rows = fs::read_to_string(paths.path(Layout::Row)).unwrap();
        assert_eq!(rows.lines().count(), 8);
        assert!(rows.contains("'=cmd"));

        let columns = fs::read_to_string(paths.path(Layout::Column)).unwrap();
        let lines: Vec<&str> = columns.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("source_id,resource_kind,has_error,title/1"));
        assert!(lines[0].ends_with("date/1,date/2,date/?"));
    }
}
