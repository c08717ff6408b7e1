// ==========================================
// 批量导入核心 - 差异检查
// ==========================================
// 职责: 前/后 记录对逐条比较，同时写入 JSON 与表格两个输出端
// 红线: 仅在更新模式需要时运行（create 模式跳过）
// 红线: 输出端打不开或写失败时记录错误、置位运行错误标志，不使进程崩溃
// ==========================================

use crate::config::ImportConfig;
use crate::domain::record::EntityFields;
use crate::domain::run::RunSignal;
use crate::domain::types::UpdateMode;
use crate::engine::diff::diff_record;
use crate::importer::error::ImportResult;
use crate::report::sinks::{JsonReportSink, TabularReportSink};
use std::path::PathBuf;
use tracing::{error, info, instrument};

/// 一条受检记录的前后两态
#[derive(Debug, Clone)]
pub struct DiffPair {
    pub source_id: String,
    pub resource_kind: Option<String>,
    pub before: EntityFields,
    pub after: EntityFields,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOutcome {
    pub json_path: PathBuf,
    pub rows_path: PathBuf,
    pub columns_path: PathBuf,
    pub records: usize,
    pub changed_records: usize,
    pub error_records: usize,
}

pub struct DiffChecker {
    mode: UpdateMode,
    report_dir: PathBuf,
    stem: String,
}

impl DiffChecker {
    pub fn new(config: &ImportConfig, stem: impl Into<String>) -> Self {
        Self {
            mode: config.update_mode,
            report_dir: config.report_dir.clone(),
            stem: stem.into(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.mode.requires_diff()
    }

    /// # 返回
    /// - None: 模式不需要差异 / 输出失败（已计入运行错误）
    #[instrument(skip(self, pairs, signal), fields(mode = %self.mode))]
    pub fn run<I>(&self, pairs: I, signal: &RunSignal) -> Option<DiffOutcome>
    where
        I: IntoIterator<Item = DiffPair>,
    {
        if !self.enabled() {
            info!("当前更新模式不需要差异检查，跳过");
            return None;
        }
        match self.write_reports(pairs) {
            Ok(outcome) => {
                info!(
                    records = outcome.records,
                    changed = outcome.changed_records,
                    errors = outcome.error_records,
                    "差异检查完成"
                );
                Some(outcome)
            }
            Err(e) => {
                signal.record_error();
                error!(error = %e, "差异报告输出失败");
                None
            }
        }
    }

    fn write_reports<I>(&self, pairs: I) -> ImportResult<DiffOutcome>
    where
        I: IntoIterator<Item = DiffPair>,
    {
        let mut json = JsonReportSink::create(&self.report_dir, &self.stem)?;
        let mut tabular = TabularReportSink::create(&self.report_dir, &self.stem)?;

        let (mut records, mut changed_records, mut error_records) = (0, 0, 0);
        for pair in pairs {
            let report = diff_record(
                pair.source_id,
                pair.resource_kind.as_deref(),
                &pair.before,
                &pair.after,
            );
            json.write(&report)?;
            tabular.write(&report)?;

            records += 1;
            if report.changed_count() > 0 {
                changed_records += 1;
            }
            if report.has_error {
                error_records += 1;
            }
        }

        let json_path = json.finish()?;
        let tabular_paths = tabular.finish()?;
        Ok(DiffOutcome {
            json_path,
            rows_path: tabular_paths.rows,
            columns_path: tabular_paths.columns,
            records,
            changed_records,
            error_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::fs;

    fn fields(value: Value) -> EntityFields {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn pair(id: &str, before: Value, after: Value) -> DiffPair {
        DiffPair {
            source_id: id.to_string(),
            resource_kind: Some("item".to_string()),
            before: fields(before),
            after: fields(after),
        }
    }

    #[test]
    fn test_create_mode_skips_diff() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ImportConfig::default().with_report_dir(dir.path());
        config.update_mode = UpdateMode::Create;
        let checker = DiffChecker::new(&config, "diff");
        let signal = RunSignal::new();

        let outcome = checker.run(vec![pair("1", json!({}), json!({"a": "b"}))], &signal);
        assert!(outcome.is_none());
        assert_eq!(signal.error_count(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_counts_changed_and_error_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = ImportConfig::default().with_report_dir(dir.path());
        let checker = DiffChecker::new(&config, "diff");
        let signal = RunSignal::new();

        let pairs = vec![
            pair("1", json!({"title": "X"}), json!({"title": "X"})),
            pair("2", json!({"title": "X"}), json!({"title": "Y"})),
            pair("3", json!({"s": {"value_resource_id": 1}}), json!({"s": "lit"})),
        ];
        let outcome = checker.run(pairs, &signal).unwrap();
        assert_eq!(outcome.records, 3);
        assert_eq!(outcome.changed_records, 2);
        assert_eq!(outcome.error_records, 1);
        assert!(outcome.json_path.exists());
        assert!(outcome.columns_path.exists());
    }

    #[test]
    fn test_unwritable_dir_counts_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let config = ImportConfig::default().with_report_dir(&blocker);
        let checker = DiffChecker::new(&config, "diff");
        let signal = RunSignal::new();

        assert!(checker.run(Vec::new(), &signal).is_none());
        assert_eq!(signal.error_count(), 1);
        assert!(signal.has_error());
    }
}
