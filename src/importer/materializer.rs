// ==========================================
// 批量导入核心 - 分块落库器
// ==========================================
// 职责: 源记录 → 转换 → 校验 → 暂存；每满一块 flush + clear + 刷新引用
// 红线: 分块按"成功暂存数"计数，不按迭代下标
// 红线: flush 前检查运行信号；置位时立即停止，不 flush 在途分块
// ==========================================

use crate::domain::id_map::TypeIdMap;
use crate::domain::record::{EntityFields, ReferenceIssue, SourceRecord};
use crate::domain::run::RunSignal;
use crate::domain::types::EntityType;
use crate::importer::error::ImportResult;
use crate::importer::validator::{EntityValidator, ValidationIssue};
use crate::repository::entity_store::{BatchContext, FlushedWrite, PendingWrite, WriteTarget};
use tracing::{info, warn};

// ==========================================
// RecordConverter Trait - 按实体类型的转换策略
// ==========================================
// 每个导入阶段选定一次，不按记录分派
pub trait RecordConverter {
    fn entity_type(&self) -> EntityType;

    /// 源记录 → 目标字段；转换失败返回问题列表（记录被跳过）
    fn convert(&mut self, record: &SourceRecord) -> Result<EntityFields, Vec<ValidationIssue>>;

    /// 每次 flush 后调用，仅传入本次落库的写入（增量刷新缓存的交叉引用）
    fn refresh(&mut self, _flushed: &[FlushedWrite]) {}

    /// 取走转换过程中记录的引用问题
    fn take_reference_issues(&mut self) -> Vec<ReferenceIssue> {
        Vec::new()
    }
}

// ==========================================
// MaterializeStats - 阶段统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub created: usize,
    pub skipped: usize,
    /// 声明的源记录总数
    pub total: usize,
    /// 实际迭代的记录数
    pub processed: usize,
    pub flushes: usize,
    pub reference_issues: usize,
    pub halted: bool,
}

// ==========================================
// Materializer
// ==========================================
pub struct Materializer<'v> {
    chunk_size: usize,
    validator: &'v dyn EntityValidator,
}

impl<'v> Materializer<'v> {
    pub fn new(chunk_size: usize, validator: &'v dyn EntityValidator) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            validator,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// 按源顺序落库一个实体类型
    ///
    /// # 参数
    /// - total: 声明的源记录总数（用于进度）
    /// - ids: 该类型的 IdMap 切片；已有占位行的记录填充占位行，否则新建
    ///
    /// # 返回
    /// - stats.halted = true: 运行信号置位，已停止
    pub fn run<C, B, I>(
        &self,
        converter: &mut C,
        ctx: &mut B,
        records: I,
        total: usize,
        ids: &mut TypeIdMap,
        signal: &RunSignal,
    ) -> ImportResult<MaterializeStats>
    where
        C: RecordConverter + ?Sized,
        B: BatchContext + ?Sized,
        I: IntoIterator<Item = SourceRecord>,
    {
        let entity_type = converter.entity_type();
        let mut stats = MaterializeStats {
            total,
            ..MaterializeStats::default()
        };
        let mut staged_in_chunk = 0;

        for record in records {
            stats.processed += 1;

            let fields = match converter.convert(&record) {
                Ok(fields) => fields,
                Err(issues) => {
                    self.skip(&mut stats, entity_type, &issues);
                    continue;
                }
            };
            self.drain_reference_issues(converter, &mut stats);

            let issues = self.validator.validate(entity_type, &record.source_id, &fields);
            if !issues.is_empty() {
                self.skip(&mut stats, entity_type, &issues);
                continue;
            }

            let target = match ids.get(&record.source_id) {
                Some(id) => WriteTarget::Existing(id),
                None => WriteTarget::New,
            };
            ctx.stage(PendingWrite {
                source_id: record.source_id,
                entity_type,
                target,
                fields,
            });
            staged_in_chunk += 1;

            if staged_in_chunk == self.chunk_size {
                if signal.should_halt() {
                    stats.halted = true;
                    break;
                }
                self.flush_chunk(converter, ctx, ids, &mut stats)?;
                staged_in_chunk = 0;
            }
        }

        if !stats.halted && staged_in_chunk > 0 {
            if signal.should_halt() {
                stats.halted = true;
            } else {
                self.flush_chunk(converter, ctx, ids, &mut stats)?;
            }
        }

        if stats.halted {
            warn!(
                entity_type = %entity_type,
                created = stats.created,
                total = stats.total,
                "运行出错或收到停止请求，落库中止"
            );
        } else {
            info!(
                entity_type = %entity_type,
                created = stats.created,
                skipped = stats.skipped,
                total = stats.total,
                "{}/{} created, {} skipped",
                stats.created,
                stats.total,
                stats.skipped
            );
        }

        Ok(stats)
    }

    fn flush_chunk<C, B>(
        &self,
        converter: &mut C,
        ctx: &mut B,
        ids: &mut TypeIdMap,
        stats: &mut MaterializeStats,
    ) -> ImportResult<()>
    where
        C: RecordConverter + ?Sized,
        B: BatchContext + ?Sized,
    {
        let flushed = ctx.flush()?;
        for write in &flushed {
            ids.assign(&write.source_id, write.destination_id)?;
        }
        ctx.clear();
        converter.refresh(&flushed);

        stats.created += flushed.len();
        stats.flushes += 1;
        info!(
            entity_type = %converter.entity_type(),
            flush = stats.flushes,
            "{}/{} created",
            stats.created,
            stats.total
        );
        Ok(())
    }

    fn skip(&self, stats: &mut MaterializeStats, entity_type: EntityType, issues: &[ValidationIssue]) {
        stats.skipped += 1;
        for issue in issues {
            warn!(
                entity_type = %entity_type,
                source_id = %issue.source_id,
                field = %issue.field,
                "记录校验失败，已跳过: {}",
                issue.message
            );
        }
    }

    fn drain_reference_issues<C: RecordConverter + ?Sized>(
        &self,
        converter: &mut C,
        stats: &mut MaterializeStats,
    ) {
        let issues = converter.take_reference_issues();
        stats.reference_issues += issues.len();
        for issue in issues {
            warn!(
                source_id = %issue.source_id,
                relation = %issue.relation,
                missing_id = %issue.missing_id,
                "引用无法解析，已省略该链接"
            );
        }
    }
}
