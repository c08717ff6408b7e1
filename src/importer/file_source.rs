// ==========================================
// 批量导入核心 - 表格文件源读取
// ==========================================
// 支持: Excel (.xlsx/.xls) / CSV (.csv)
// 职责: 通用表格 → SourceRecord（不含任何特定来源的字段映射）
// ==========================================

use crate::domain::record::SourceRecord;
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook, Reader, Xlsx};
use csv::ReaderBuilder;
use serde_json::Value;
use std::fs::File;
use std::path::Path;

// ==========================================
// SourceLayout - 列角色
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    /// 源 id 列
    pub id_column: String,
    /// 父 id 列（层级类型）
    pub parent_column: Option<String>,
    /// 多值单元格分隔符；None 表示不拆分
    pub multivalue_separator: Option<char>,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            id_column: "id".to_string(),
            parent_column: None,
            multivalue_separator: None,
        }
    }
}

impl SourceLayout {
    pub fn with_parent_column(mut self, column: impl Into<String>) -> Self {
        self.parent_column = Some(column.into());
        self
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.multivalue_separator = Some(separator);
        self
    }

    /// 一行（表头 + 单元格）→ 源记录；完全空白的行返回 None
    ///
    /// # 参数
    /// - row: 数据行号（1 起，不含表头），用于报错定位
    fn build_record(
        &self,
        row: usize,
        headers: &[String],
        cells: &[String],
    ) -> ImportResult<Option<SourceRecord>> {
        if cells.iter().all(|c| c.trim().is_empty()) {
            return Ok(None);
        }

        let mut source_id = None;
        let mut parent_id = None;
        let mut record_fields = Vec::new();

        for (header, cell) in headers.iter().zip(cells) {
            let value = cell.trim();
            if *header == self.id_column {
                source_id = Some(value.to_string()).filter(|v| !v.is_empty());
            } else if self.parent_column.as_deref() == Some(header.as_str()) {
                parent_id = Some(value.to_string()).filter(|v| !v.is_empty());
            } else if !value.is_empty() && !header.is_empty() {
                record_fields.push((header.clone(), self.cell_value(value)));
            }
        }

        let source_id = source_id.ok_or_else(|| ImportError::FieldMappingError {
            row,
            message: format!("源 id 列 {} 为空", self.id_column),
        })?;

        let mut record = SourceRecord::new(source_id);
        record.parent_id = parent_id;
        for (name, value) in record_fields {
            record.fields.insert(name, value);
        }
        Ok(Some(record))
    }

    fn cell_value(&self, value: &str) -> Value {
        match self.multivalue_separator {
            Some(sep) if value.contains(sep) => Value::Array(
                value
                    .split(sep)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(Value::from)
                    .collect(),
            ),
            _ => Value::from(value),
        }
    }

    fn check_headers(&self, headers: &[String]) -> ImportResult<()> {
        if !headers.iter().any(|h| *h == self.id_column) {
            return Err(ImportError::FieldMappingError {
                row: 0,
                message: format!("表头缺少源 id 列: {}", self.id_column),
            });
        }
        Ok(())
    }
}

fn check_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV 源
// ==========================================
pub struct CsvSource {
    layout: SourceLayout,
}

impl CsvSource {
    pub fn new(layout: SourceLayout) -> Self {
        Self { layout }
    }

    pub fn read(&self, path: &Path) -> ImportResult<Vec<SourceRecord>> {
        check_exists(path)?;
        let ext = extension_of(path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        self.layout.check_headers(&headers)?;

        let mut records = Vec::new();
        for (idx, result) in reader.records().enumerate() {
            let row = result?;
            let cells: Vec<String> = row.iter().map(str::to_string).collect();
            if let Some(record) = self.layout.build_record(idx + 1, &headers, &cells)? {
                records.push(record);
            }
        }

        Ok(records)
    }
}

// ==========================================
// Excel 源（读取第一个工作表）
// ==========================================
pub struct ExcelSource {
    layout: SourceLayout,
}

impl ExcelSource {
    pub fn new(layout: SourceLayout) -> Self {
        Self { layout }
    }

    pub fn read(&self, path: &Path) -> ImportResult<Vec<SourceRecord>> {
        check_exists(path)?;
        let ext = extension_of(path);
        if ext != "xlsx" && ext != "xls" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook: Xlsx<_> = open_workbook(path)
            .map_err(|e: calamine::XlsxError| ImportError::ExcelParseError(e.to_string()))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ImportError::ExcelParseError(e.to_string()))?;

        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无数据行".to_string()))?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();
        self.layout.check_headers(&headers)?;

        let mut records = Vec::new();
        for (idx, data_row) in rows.enumerate() {
            let cells: Vec<String> = data_row.iter().map(|c| c.to_string()).collect();
            if let Some(record) = self.layout.build_record(idx + 1, &headers, &cells)? {
                records.push(record);
            }
        }

        Ok(records)
    }
}

/// 按扩展名选择读取器
pub fn read_source_file<P: AsRef<Path>>(
    path: P,
    layout: SourceLayout,
) -> ImportResult<Vec<SourceRecord>> {
    let path = path.as_ref();
    match extension_of(path).as_str() {
        "csv" => CsvSource::new(layout).read(path),
        "xlsx" | "xls" => ExcelSource::new(layout).read(path),
        other => Err(ImportError::UnsupportedFormat(other.to_string())),
    }
}
