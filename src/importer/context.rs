// ==========================================
// 批量导入核心 - 运行上下文
// ==========================================
// 职责: 持有一次运行的 IdMap / 运行信号 / 阶段汇总，按阶段编排各组件
// 红线: 组件只拿到所需的切片（单类型 IdMap、信号只读引用），不共享全局状态
// 红线: 阶段级致命错误置位运行错误标志，并输出一条指明阶段与实体类型的错误日志
// ==========================================

use crate::config::ImportConfig;
use crate::domain::id_map::IdMap;
use crate::domain::record::SourceRecord;
use crate::domain::run::{PhaseStatus, PhaseSummary, RunSignal};
use crate::domain::types::EntityType;
use crate::engine::thesaurus::{ConceptNode, ThesaurusTree};
use crate::importer::allocator::{generate_run_prefix, AllocationReport, IdAllocator, IdSource};
use crate::importer::conflict_resolver::{ConflictKey, NamedEntityImporter, Resolution};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::materializer::{MaterializeStats, Materializer, RecordConverter};
use crate::importer::validator::EntityValidator;
use crate::report::sinks::JsonReportSink;
use crate::repository::entity_store::{BatchContext, EntityStore, SqlValue};
use crate::repository::run_log_repo::RunLogRepository;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const PHASE_ALLOCATE: &str = "allocate";
pub const PHASE_MATERIALIZE: &str = "materialize";
pub const PHASE_NAMED: &str = "named";

// ==========================================
// RunOutcome - 运行结束时的汇总
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    pub summaries: Vec<PhaseSummary>,
    pub error_count: usize,
    pub halted: bool,
    pub id_map: IdMap,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        !self.halted && self.error_count == 0
    }
}

// ==========================================
// ImportContext
// ==========================================
pub struct ImportContext {
    run_id: String,
    run_prefix: String,
    config: ImportConfig,
    ids: IdMap,
    signal: RunSignal,
    summaries: Vec<PhaseSummary>,
}

impl ImportContext {
    pub fn new(config: ImportConfig) -> Self {
        Self::with_signal(config, RunSignal::new())
    }

    /// 宿主持有 signal 的克隆，可在另一线程请求停止
    pub fn with_signal(config: ImportConfig, signal: RunSignal) -> Self {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, "导入运行开始");
        Self {
            run_id,
            run_prefix: generate_run_prefix(),
            config,
            ids: IdMap::new(),
            signal,
            summaries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    pub fn ids(&self) -> &IdMap {
        &self.ids
    }

    pub fn ids_mut(&mut self) -> &mut IdMap {
        &mut self.ids
    }

    pub fn signal(&self) -> &RunSignal {
        &self.signal
    }

    pub fn summaries(&self) -> &[PhaseSummary] {
        &self.summaries
    }

    // ==========================================
    // 阶段: 占位分配
    // ==========================================

    #[instrument(skip(self, store, defaults, source), fields(run_id = %self.run_id))]
    pub fn allocate<S: EntityStore + ?Sized>(
        &mut self,
        store: &S,
        entity_type: EntityType,
        defaults: &[(&str, SqlValue)],
        source: IdSource,
    ) -> ImportResult<AllocationReport> {
        self.check_signal(PHASE_ALLOCATE, entity_type)?;
        let started = Instant::now();

        let allocator = IdAllocator::new(store, self.config.insert_chunk_size, &self.run_prefix);
        let result = allocator.allocate(entity_type, defaults, source, self.ids.for_type_mut(entity_type));

        match result {
            Ok(report) => {
                self.push_summary(
                    PHASE_ALLOCATE,
                    entity_type,
                    (report.created, report.requested.saturating_sub(report.created), report.requested),
                    PhaseStatus::Completed,
                    started,
                    report.degraded.then(|| "沿用源 id 失败，已改由目标库分配".to_string()),
                );
                Ok(report)
            }
            Err(e) => Err(self.fail(PHASE_ALLOCATE, entity_type, started, e)),
        }
    }

    // ==========================================
    // 阶段: 分块落库
    // ==========================================

    #[instrument(skip_all, fields(run_id = %self.run_id, entity_type = %converter.entity_type()))]
    pub fn materialize<C, B, I>(
        &mut self,
        converter: &mut C,
        batch: &mut B,
        records: I,
        total: usize,
        validator: &dyn EntityValidator,
    ) -> ImportResult<MaterializeStats>
    where
        C: RecordConverter + ?Sized,
        B: BatchContext + ?Sized,
        I: IntoIterator<Item = SourceRecord>,
    {
        let entity_type = converter.entity_type();
        self.check_signal(PHASE_MATERIALIZE, entity_type)?;
        let started = Instant::now();

        let materializer = Materializer::new(self.config.entity_chunk_size, validator);
        let result = materializer.run(
            converter,
            batch,
            records,
            total,
            self.ids.for_type_mut(entity_type),
            &self.signal,
        );

        match result {
            Ok(stats) if stats.halted => {
                self.push_summary(
                    PHASE_MATERIALIZE,
                    entity_type,
                    (stats.created, stats.skipped, stats.total),
                    PhaseStatus::Halted,
                    started,
                    None,
                );
                Err(ImportError::Halted {
                    phase: PHASE_MATERIALIZE.to_string(),
                    entity_type: entity_type.to_string(),
                })
            }
            Ok(stats) => {
                let message = (stats.reference_issues > 0)
                    .then(|| format!("{} 个引用无法解析", stats.reference_issues));
                self.push_summary(
                    PHASE_MATERIALIZE,
                    entity_type,
                    (stats.created, stats.skipped, stats.total),
                    PhaseStatus::Completed,
                    started,
                    message,
                );
                Ok(stats)
            }
            Err(e) => Err(self.fail(PHASE_MATERIALIZE, entity_type, started, e)),
        }
    }

    // ==========================================
    // 阶段: 具名实体（冲突决策）
    // ==========================================

    /// 逐个导入具名实体；每个实体一条决策日志
    #[instrument(skip_all, fields(run_id = %self.run_id, entity_type = %E::ENTITY_TYPE))]
    pub fn import_named<E, S>(
        &mut self,
        store: &S,
        entities: Vec<(String, E)>,
    ) -> ImportResult<Vec<Resolution>>
    where
        E: ConflictKey,
        S: EntityStore + ?Sized,
    {
        let entity_type = E::ENTITY_TYPE;
        self.check_signal(PHASE_NAMED, entity_type)?;
        let started = Instant::now();

        let total = entities.len();
        let importer = NamedEntityImporter::new(store);
        let mut resolutions = Vec::with_capacity(total);
        let mut created = 0;

        for (source_id, entity) in entities {
            match importer.import(&source_id, entity, self.ids.for_type_mut(entity_type)) {
                Ok((resolution, _)) => {
                    if !matches!(resolution, Resolution::Reuse { .. }) {
                        created += 1;
                    }
                    resolutions.push(resolution);
                }
                Err(e) => return Err(self.fail(PHASE_NAMED, entity_type, started, e)),
            }
        }

        self.push_summary(
            PHASE_NAMED,
            entity_type,
            (created, total - created, total),
            PhaseStatus::Completed,
            started,
            None,
        );
        Ok(resolutions)
    }

    // ==========================================
    // 层级线性化
    // ==========================================

    /// 构建叙词表树，并把全部概念 id 登记到该类型的 IdMap（待占位分配）
    pub fn linearize(&mut self, entity_type: EntityType, records: &[SourceRecord]) -> ThesaurusTree {
        let tree = ThesaurusTree::linearize(
            records.iter().map(ConceptNode::from_record),
            self.config.narrower_sort,
        );
        let slice = self.ids.for_type_mut(entity_type);
        for record in records {
            slice.reserve(record.source_id.clone());
        }
        let orphans = tree.orphans();
        if !orphans.is_empty() {
            warn!(
                entity_type = %entity_type,
                count = orphans.len(),
                "部分概念的父节点不在源集合中，不提升为顶层"
            );
        }
        tree
    }

    // ==========================================
    // IdMap 导出 / 运行日志
    // ==========================================

    /// IdMap 写入 JSON 文件；写入失败计入运行错误，不中断进程
    pub fn export_id_map(&self) -> Option<PathBuf> {
        let stem = format!("idmap-{}", self.run_id);
        match JsonReportSink::write_document(&self.config.report_dir, &stem, &self.ids) {
            Ok(path) => {
                info!(path = %path.display(), "IdMap 已导出");
                Some(path)
            }
            Err(e) => {
                self.signal.record_error();
                error!(error = %e, "IdMap 导出失败");
                None
            }
        }
    }

    pub fn persist_summaries(&self, repo: &RunLogRepository) -> ImportResult<usize> {
        for summary in &self.summaries {
            repo.insert_summary(&self.run_id, summary)?;
        }
        Ok(self.summaries.len())
    }

    pub fn finish(self) -> RunOutcome {
        let halted = self
            .summaries
            .iter()
            .any(|s| s.status == PhaseStatus::Halted)
            || self.signal.stop_requested();
        let outcome = RunOutcome {
            run_id: self.run_id,
            summaries: self.summaries,
            error_count: self.signal.error_count(),
            halted,
            id_map: self.ids,
        };
        info!(
            run_id = %outcome.run_id,
            phases = outcome.summaries.len(),
            errors = outcome.error_count,
            halted = outcome.halted,
            "导入运行结束"
        );
        outcome
    }

    // ==========================================
    // 内部
    // ==========================================

    fn check_signal(&mut self, phase: &str, entity_type: EntityType) -> ImportResult<()> {
        if !self.signal.should_halt() {
            return Ok(());
        }
        warn!(phase, entity_type = %entity_type, "运行出错或收到停止请求，跳过该阶段");
        self.push_summary(phase, entity_type, (0, 0, 0), PhaseStatus::Halted, Instant::now(), None);
        Err(ImportError::Halted {
            phase: phase.to_string(),
            entity_type: entity_type.to_string(),
        })
    }

    fn fail(&mut self, phase: &str, entity_type: EntityType, started: Instant, err: ImportError) -> ImportError {
        if err.is_fatal() {
            self.signal.record_error();
            error!(phase, entity_type = %entity_type, error = %err, "阶段失败");
            self.push_summary(
                phase,
                entity_type,
                (0, 0, 0),
                PhaseStatus::Failed,
                started,
                Some(err.to_string()),
            );
        }
        err
    }

    /// counts: (created, skipped, total)
    fn push_summary(
        &mut self,
        phase: &str,
        entity_type: EntityType,
        counts: (usize, usize, usize),
        status: PhaseStatus,
        started: Instant,
        message: Option<String>,
    ) {
        let (created, skipped, total) = counts;
        let summary = PhaseSummary {
            phase: phase.to_string(),
            entity_type,
            created,
            skipped,
            total,
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            message,
        };
        info!(run_id = %self.run_id, "{}", summary);
        self.summaries.push(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::validator::DefaultValidator;
    use crate::repository::entity_store::{FlushedWrite, PendingWrite, WriteTarget};
    use crate::domain::record::StoredEntity;
    use crate::repository::error::RepositoryResult;

    #[derive(Default)]
    struct MemoryBatch {
        staged: Vec<PendingWrite>,
        next_id: i64,
    }

    impl BatchContext for MemoryBatch {
        fn stage(&mut self, write: PendingWrite) {
            self.staged.push(write);
        }

        fn flush(&mut self) -> RepositoryResult<Vec<FlushedWrite>> {
            Ok(std::mem::take(&mut self.staged)
                .into_iter()
                .map(|w| {
                    self.next_id += 1;
                    FlushedWrite {
                        source_id: w.source_id,
                        entity_type: w.entity_type,
                        destination_id: match w.target {
                            WriteTarget::Existing(id) => id,
                            WriteTarget::New => self.next_id,
                        },
                    }
                })
                .collect())
        }

        fn clear(&mut self) {}

        fn find(&mut self, _: EntityType, _: i64) -> RepositoryResult<Option<StoredEntity>> {
            Ok(None)
        }

        fn staged_len(&self) -> usize {
            self.staged.len()
        }
    }

    fn records(n: usize) -> Vec<SourceRecord> {
        (1..=n)
            .map(|i| SourceRecord::new(i.to_string()).with_field("label", format!("r{}", i)))
            .collect()
    }

    #[test]
    fn test_materialize_records_summary() {
        let mut ctx = ImportContext::new(ImportConfig::default().with_entity_chunk_size(2));
        let mut converter = crate::importer::converters::PassThroughConverter::new(EntityType::Item);
        let mut batch = MemoryBatch::default();
        let validator = DefaultValidator::new();

        let stats = ctx
            .materialize(&mut converter, &mut batch, records(5), 5, &validator)
            .unwrap();
        assert_eq!(stats.created, 5);
        assert_eq!(ctx.ids().for_type(EntityType::Item).unwrap().len(), 5);

        let summary = &ctx.summaries()[0];
        assert_eq!(summary.phase, PHASE_MATERIALIZE);
        assert_eq!(summary.status, PhaseStatus::Completed);
        assert_eq!(summary.created, 5);
    }

    #[test]
    fn test_stop_request_halts_next_phase() {
        let signal = RunSignal::new();
        let mut ctx = ImportContext::with_signal(ImportConfig::default(), signal.clone());
        signal.request_stop();

        let mut converter = crate::importer::converters::PassThroughConverter::new(EntityType::Item);
        let mut batch = MemoryBatch::default();
        let validator = DefaultValidator::new();
        let err = ctx
            .materialize(&mut converter, &mut batch, records(3), 3, &validator)
            .unwrap_err();

        assert!(matches!(err, ImportError::Halted { .. }));
        assert!(!err.is_fatal());
        let outcome = ctx.finish();
        assert!(outcome.halted);
        assert_eq!(outcome.error_count, 0);
        assert_eq!(outcome.summaries[0].status, PhaseStatus::Halted);
    }

    #[test]
    fn test_linearize_reserves_concept_ids() {
        let mut ctx = ImportContext::new(ImportConfig::default());
        let input = vec![
            SourceRecord::new("1").with_field("label", "root"),
            SourceRecord::new("2").with_parent("1").with_field("label", "child"),
        ];
        let tree = ctx.linearize(EntityType::Item, &input);
        assert_eq!(tree.tops(), &["1".to_string()]);

        let slice = ctx.ids().for_type(EntityType::Item).unwrap();
        assert_eq!(slice.unresolved(), vec!["1", "2"]);
    }

    #[test]
    fn test_export_id_map_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ImportContext::new(ImportConfig::default().with_report_dir(dir.path()));
        ctx.ids_mut().for_type_mut(EntityType::Vocabulary).assign("v1", 3).unwrap();

        let path = ctx.export_id_map().unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"v1\""));
        assert_eq!(ctx.signal().error_count(), 0);
    }
}
