// ==========================================
// 批量导入核心 - 批量持久化上下文 SQLite 实现
// ==========================================
// 职责: 暂存写入 → 单事务 flush → 释放跟踪集
// 约束: flush 失败时整个事务回滚，暂存写入随之丢弃
// ==========================================

use crate::domain::record::{StoredEntity, LABEL_FIELD};
use crate::domain::types::EntityType;
use crate::repository::entity_store::{BatchContext, FlushedWrite, PendingWrite, WriteTarget};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sqlite_store::SqliteEntityStore;
use std::collections::HashMap;
use tracing::debug;

pub struct SqliteBatchContext<'a> {
    store: &'a SqliteEntityStore,
    staged: Vec<PendingWrite>,
    tracked: HashMap<(EntityType, i64), StoredEntity>,
    flush_count: usize,
    clear_count: usize,
}

impl<'a> SqliteBatchContext<'a> {
    pub fn new(store: &'a SqliteEntityStore) -> Self {
        Self {
            store,
            staged: Vec::new(),
            tracked: HashMap::new(),
            flush_count: 0,
            clear_count: 0,
        }
    }

    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    pub fn clear_count(&self) -> usize {
        self.clear_count
    }

    pub fn tracked_len(&self) -> usize {
        self.tracked.len()
    }
}

impl BatchContext for SqliteBatchContext<'_> {
    fn stage(&mut self, write: PendingWrite) {
        self.staged.push(write);
    }

    fn flush(&mut self) -> RepositoryResult<Vec<FlushedWrite>> {
        self.flush_count += 1;
        let writes = std::mem::take(&mut self.staged);
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let store = self.store;
        let flushed = store.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

            let mut flushed = Vec::with_capacity(writes.len());
            for write in &writes {
                let binding = store.binding_or_err(write.entity_type)?;
                let destination_id = match write.target {
                    WriteTarget::New => SqliteEntityStore::insert_row(&tx, binding, &write.fields)?,
                    WriteTarget::Existing(id) => {
                        SqliteEntityStore::update_row(&tx, binding, write.entity_type, id, &write.fields)?;
                        id
                    }
                };
                flushed.push(FlushedWrite {
                    source_id: write.source_id.clone(),
                    entity_type: write.entity_type,
                    destination_id,
                });
            }

            tx.commit()
                .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
            Ok(flushed)
        })?;

        for (write, done) in writes.into_iter().zip(&flushed) {
            let label = write
                .fields
                .get(LABEL_FIELD)
                .and_then(|v| v.as_str())
                .map(str::to_string);
            self.tracked.insert(
                (write.entity_type, done.destination_id),
                StoredEntity {
                    id: done.destination_id,
                    entity_type: write.entity_type,
                    label,
                    owner_id: None,
                    fields: write.fields,
                },
            );
        }

        debug!(count = flushed.len(), flush = self.flush_count, "批量写入已提交");
        Ok(flushed)
    }

    fn clear(&mut self) {
        self.clear_count += 1;
        self.tracked.clear();
    }

    fn find(&mut self, entity_type: EntityType, id: i64) -> RepositoryResult<Option<StoredEntity>> {
        if let Some(entity) = self.tracked.get(&(entity_type, id)) {
            return Ok(Some(entity.clone()));
        }

        let binding = self.store.binding_or_err(entity_type)?;
        let loaded = self
            .store
            .with_conn(|conn| SqliteEntityStore::read_row(conn, binding, entity_type, id));
        match loaded {
            Ok(entity) => {
                self.tracked.insert((entity_type, id), entity.clone());
                Ok(Some(entity))
            }
            Err(RepositoryError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn staged_len(&self) -> usize {
        self.staged.len()
    }
}
