// ==========================================
// 批量导入核心 - 标识占位分配器
// ==========================================
// 职责: 字段值未知前先批量创建空占位行，持久化 源 id → 目标 id
// 流程: 冲突检查 → 暂存表分块写入 → INSERT ... SELECT 建占位行
//       → 按运行前缀回收映射 → 清除标记
// 红线: 显式 id 冲突时不创建任何占位行；暂存表无论成败都释放
// ==========================================

use crate::domain::id_map::TypeIdMap;
use crate::domain::types::EntityType;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::entity_store::{EntityStore, SqlValue, Statement, TableBinding};
use crate::repository::statement_builder::{
    numbered_placeholders, quote_identifier, BulkInsertBuilder, MAX_BOUND_PARAMETERS,
};
use std::collections::HashSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

const SAVEPOINT: &str = "bulk_import_allocate";

// ==========================================
// IdSource - 占位行 id 来源
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdSource {
    /// 显式 id 列表：源 id 即期望的目标 id（必须为正整数）
    Explicit(Vec<String>),
    /// 取 IdMap 中尚未分配的源 id；keep_same_id 时尽量沿用源 id 作为目标 id
    Derived { keep_same_id: bool },
}

// ==========================================
// AllocationReport - 分配结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationReport {
    pub entity_type: EntityType,
    pub requested: usize,
    pub created: usize,
    pub kept_same_id: bool,
    /// 沿用源 id 的尝试因冲突被放弃
    pub degraded: bool,
}

impl AllocationReport {
    fn empty(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            requested: 0,
            created: 0,
            kept_same_id: false,
            degraded: false,
        }
    }
}

// ==========================================
// ScratchTable - 暂存表（Drop 时释放）
// ==========================================
struct ScratchTable<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    name: String,
}

impl<'a, S: EntityStore + ?Sized> ScratchTable<'a, S> {
    fn create(store: &'a S) -> ImportResult<Self> {
        let name = format!("bulk_import_scratch_{}", &Uuid::new_v4().simple().to_string()[..12]);
        store.execute_statement(&Statement::new(
            format!(
                "CREATE TEMP TABLE {} (\"source_id\" TEXT NOT NULL, \"dest_id\" INTEGER)",
                quote_identifier(&name)?
            ),
            vec![],
        ))?;
        Ok(Self { store, name })
    }

    fn qualified(&self) -> String {
        format!("temp.{}", self.name)
    }
}

impl<S: EntityStore + ?Sized> Drop for ScratchTable<'_, S> {
    fn drop(&mut self) {
        let sql = format!("DROP TABLE IF EXISTS temp.\"{}\"", self.name);
        match self.store.execute_statement(&Statement::new(sql, vec![])) {
            Ok(_) => debug!(table = %self.name, "暂存表已释放"),
            Err(e) => warn!(table = %self.name, error = %e, "暂存表释放失败"),
        }
    }
}

// ==========================================
// IdAllocator
// ==========================================
pub struct IdAllocator<'a, S: EntityStore + ?Sized> {
    store: &'a S,
    insert_chunk_size: usize,
    run_prefix: &'a str,
}

impl<'a, S: EntityStore + ?Sized> IdAllocator<'a, S> {
    /// # 参数
    /// - insert_chunk_size: 单条批量语句的行数上限
    /// - run_prefix: 运行级随机前缀（标记值 = 前缀 + 源 id）
    pub fn new(store: &'a S, insert_chunk_size: usize, run_prefix: &'a str) -> Self {
        Self {
            store,
            insert_chunk_size: insert_chunk_size.max(1),
            run_prefix,
        }
    }

    /// 为一个实体类型创建占位行并更新该类型的 IdMap
    ///
    /// # 参数
    /// - defaults: 占位行其余列的默认值（不可为空，不可覆盖 id / keep-id / 鉴别列）
    ///
    /// # 返回
    /// - Err(Configuration): 未绑定数据表 / 缺少默认值 / 显式 id 非法
    /// - Err(IdConflict): 显式 id 与已有 id 冲突（未创建任何行）
    #[instrument(skip(self, defaults, ids), fields(entity_type = %entity_type))]
    pub fn allocate(
        &self,
        entity_type: EntityType,
        defaults: &[(&str, SqlValue)],
        source: IdSource,
        ids: &mut TypeIdMap,
    ) -> ImportResult<AllocationReport> {
        let binding = self
            .store
            .binding(entity_type)
            .cloned()
            .ok_or_else(|| ImportError::configuration(entity_type, "实体类型未绑定数据表"))?;
        check_defaults(entity_type, &binding, defaults)?;

        let explicit = matches!(source, IdSource::Explicit(_));
        let (requested, mut keep_same_id) = match source {
            IdSource::Explicit(list) => {
                if list.is_empty() {
                    warn!("显式 id 列表为空，跳过占位分配");
                    return Ok(AllocationReport::empty(entity_type));
                }
                (list, true)
            }
            IdSource::Derived { keep_same_id } => (
                ids.unresolved().into_iter().map(str::to_string).collect(),
                keep_same_id,
            ),
        };

        let mut seen = HashSet::new();
        let source_ids: Vec<String> = requested
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        if source_ids.is_empty() {
            debug!("无待分配源 id");
            return Ok(AllocationReport::empty(entity_type));
        }

        // ===== 1. 冲突检查 =====
        let mut degraded = false;
        let mut wanted_ids = Vec::new();
        if keep_same_id {
            let numeric: Option<Vec<i64>> = source_ids
                .iter()
                .map(|s| s.parse::<i64>().ok().filter(|v| *v > 0))
                .collect();
            match numeric {
                None if explicit => {
                    return Err(ImportError::configuration(entity_type, "显式 id 必须为正整数"));
                }
                None => {
                    warn!("源 id 含非数字值，改由目标库分配新 id");
                    keep_same_id = false;
                    degraded = true;
                }
                Some(wanted) if has_duplicate(&wanted) => {
                    if explicit {
                        return Err(ImportError::configuration(
                            entity_type,
                            "显式 id 列表中存在数值相同的 id（如 1 与 01）",
                        ));
                    }
                    warn!("多个源 id 解析为同一数值，改由目标库分配新 id");
                    keep_same_id = false;
                    degraded = true;
                }
                Some(wanted) => {
                    let taken = self.existing_ids(&binding, &wanted)?;
                    if !taken.is_empty() && explicit {
                        error!(conflicts = taken.len(), "显式 id 与目标库已有 id 冲突，未创建占位行");
                        return Err(ImportError::IdConflict {
                            entity_type: entity_type.to_string(),
                            ids: taken,
                        });
                    }
                    if !taken.is_empty() {
                        warn!(conflicts = taken.len(), "源 id 与目标库已有 id 冲突，改由目标库分配新 id");
                        keep_same_id = false;
                        degraded = true;
                    } else {
                        wanted_ids = wanted;
                    }
                }
            }
        }

        // ===== 2. 暂存表 + 占位行（单个保存点内） =====
        let scratch = ScratchTable::create(self.store)?;
        self.execute(format!("SAVEPOINT {}", SAVEPOINT), vec![])?;
        let outcome = self.fill_scratch(&scratch, &source_ids, &wanted_ids).and_then(|_| {
            let created = self.insert_placeholders(&binding, &scratch, defaults, keep_same_id, source_ids.len())?;
            let recovered = self.recover(&binding)?;
            self.strip_markers(&binding)?;
            Ok((created, recovered))
        });

        let (created, recovered) = match outcome {
            Ok(done) => {
                self.execute(format!("RELEASE {}", SAVEPOINT), vec![])?;
                done
            }
            Err(e) => {
                let _ = self.execute(format!("ROLLBACK TO {}", SAVEPOINT), vec![]);
                let _ = self.execute(format!("RELEASE {}", SAVEPOINT), vec![]);
                return Err(e);
            }
        };
        drop(scratch);

        if recovered.len() != source_ids.len() {
            return Err(ImportError::InternalError(format!(
                "{} 占位映射回收不完整: 期望 {}，实际 {}",
                entity_type,
                source_ids.len(),
                recovered.len()
            )));
        }

        // ===== 3. 写入 IdMap =====
        for (source_id, destination_id) in &recovered {
            ids.assign(source_id, *destination_id)?;
        }

        info!(
            requested = source_ids.len(),
            created,
            kept_same_id = keep_same_id,
            degraded,
            "占位行已创建"
        );

        Ok(AllocationReport {
            entity_type,
            requested: source_ids.len(),
            created,
            kept_same_id: keep_same_id,
            degraded,
        })
    }

    fn execute(&self, sql: String, params: Vec<SqlValue>) -> ImportResult<usize> {
        Ok(self.store.execute_statement(&Statement::new(sql, params))?)
    }

    /// 目标表中已存在的 id（集合交集）
    fn existing_ids(&self, binding: &TableBinding, wanted: &[i64]) -> ImportResult<Vec<i64>> {
        let table = quote_identifier(&binding.table)?;
        let chunk = self.insert_chunk_size.min(MAX_BOUND_PARAMETERS);

        let mut taken = Vec::new();
        for ids in wanted.chunks(chunk) {
            let sql = format!(
                "SELECT \"id\" FROM {} WHERE \"id\" IN ({})",
                table,
                numbered_placeholders(1, ids.len())
            );
            let params = ids.iter().map(|id| SqlValue::Integer(*id)).collect();
            let rows = self.store.execute_query(&Statement::new(sql, params))?;
            taken.extend(rows.iter().filter_map(|row| row.first().and_then(SqlValue::as_i64)));
        }

        taken.sort_unstable();
        taken.dedup();
        Ok(taken)
    }

    fn fill_scratch(
        &self,
        scratch: &ScratchTable<'_, S>,
        source_ids: &[String],
        wanted_ids: &[i64],
    ) -> ImportResult<()> {
        let builder = BulkInsertBuilder::new(
            &scratch.qualified(),
            &["source_id", "dest_id"],
            self.insert_chunk_size,
        )?;
        let rows: Vec<Vec<SqlValue>> = source_ids
            .iter()
            .enumerate()
            .map(|(i, sid)| {
                vec![
                    SqlValue::Text(sid.clone()),
                    SqlValue::from(wanted_ids.get(i).copied()),
                ]
            })
            .collect();

        for statement in builder.build(&rows)? {
            self.store.execute_statement(&statement)?;
        }
        Ok(())
    }

    /// INSERT ... SELECT，按暂存表 rowid 区间分块
    fn insert_placeholders(
        &self,
        binding: &TableBinding,
        scratch: &ScratchTable<'_, S>,
        defaults: &[(&str, SqlValue)],
        keep_same_id: bool,
        row_count: usize,
    ) -> ImportResult<usize> {
        let mut columns = Vec::new();
        let mut selects = Vec::new();
        let mut params = Vec::new();

        if keep_same_id {
            columns.push(quote_identifier("id")?);
            selects.push("\"dest_id\"".to_string());
        }

        columns.push(quote_identifier(&binding.keep_id_column)?);
        params.push(SqlValue::Text(self.run_prefix.to_string()));
        selects.push(format!("?{} || \"source_id\"", params.len()));

        if let Some((column, value)) = &binding.discriminator {
            columns.push(quote_identifier(column)?);
            params.push(SqlValue::Text(value.clone()));
            selects.push(format!("?{}", params.len()));
        }

        for (column, value) in defaults {
            columns.push(quote_identifier(column)?);
            params.push(value.clone());
            selects.push(format!("?{}", params.len()));
        }

        let lower = params.len() + 1;
        let sql = format!(
            "INSERT INTO {} ({}) SELECT {} FROM temp.{} WHERE rowid > ?{} AND rowid <= ?{} ORDER BY rowid",
            quote_identifier(&binding.table)?,
            columns.join(", "),
            selects.join(", "),
            quote_identifier(&scratch.name)?,
            lower,
            lower + 1
        );

        let mut created = 0;
        let mut start = 0;
        while start < row_count {
            let end = (start + self.insert_chunk_size).min(row_count);
            let mut chunk_params = params.clone();
            chunk_params.push(SqlValue::Integer(start as i64));
            chunk_params.push(SqlValue::Integer(end as i64));
            created += self.store.execute_statement(&Statement::new(sql.clone(), chunk_params))?;
            debug!(from = start, to = end, "占位行分块已写入");
            start = end;
        }
        Ok(created)
    }

    /// 按标记前缀回收 (源 id, 目标 id)
    fn recover(&self, binding: &TableBinding) -> ImportResult<Vec<(String, i64)>> {
        let keep = quote_identifier(&binding.keep_id_column)?;
        let prefix_len = self.run_prefix.chars().count() as i64;

        let mut sql = format!(
            "SELECT \"id\", substr({keep}, ?1) FROM {} WHERE substr({keep}, 1, ?2) = ?3",
            quote_identifier(&binding.table)?,
        );
        let mut params = vec![
            SqlValue::Integer(prefix_len + 1),
            SqlValue::Integer(prefix_len),
            SqlValue::Text(self.run_prefix.to_string()),
        ];
        if let Some((column, value)) = &binding.discriminator {
            sql.push_str(&format!(" AND {} = ?4", quote_identifier(column)?));
            params.push(SqlValue::Text(value.clone()));
        }

        let rows = self.store.execute_query(&Statement::new(sql, params))?;
        rows.into_iter()
            .map(|row| match (row.first().and_then(SqlValue::as_i64), row.get(1).and_then(SqlValue::as_str)) {
                (Some(id), Some(source_id)) => Ok((source_id.to_string(), id)),
                _ => Err(ImportError::InternalError("占位映射行格式异常".to_string())),
            })
            .collect()
    }

    fn strip_markers(&self, binding: &TableBinding) -> ImportResult<usize> {
        let keep = quote_identifier(&binding.keep_id_column)?;
        let sql = format!(
            "UPDATE {} SET {keep} = NULL WHERE substr({keep}, 1, ?1) = ?2",
            quote_identifier(&binding.table)?,
        );
        self.execute(
            sql,
            vec![
                SqlValue::Integer(self.run_prefix.chars().count() as i64),
                SqlValue::Text(self.run_prefix.to_string()),
            ],
        )
    }
}

fn check_defaults(
    entity_type: EntityType,
    binding: &TableBinding,
    defaults: &[(&str, SqlValue)],
) -> ImportResult<()> {
    if defaults.is_empty() {
        return Err(ImportError::configuration(entity_type, "缺少占位行默认值"));
    }

    let reserved_discriminator = binding.discriminator.as_ref().map(|(c, _)| c.as_str());
    for (column, _) in defaults {
        if *column == "id"
            || *column == binding.keep_id_column
            || Some(*column) == reserved_discriminator
        {
            return Err(ImportError::configuration(
                entity_type,
                format!("默认值不可覆盖列 {}", column),
            ));
        }
        quote_identifier(column)?;
    }
    Ok(())
}

/// 数值重复（不同写法的源 id 解析为同一目标 id）
fn has_duplicate(ids: &[i64]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().any(|id| !seen.insert(*id))
}

/// 生成运行级随机前缀（两段 v4 UUID，≥128 位随机）
pub fn generate_run_prefix() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
