// ==========================================
// 批量导入核心 - 运行日志数据仓储
// ==========================================
// 依据: import_run_log 表
// 用途: 每个阶段结束时落一条汇总，供运维回看
// ==========================================

use crate::domain::run::{PhaseStatus, PhaseSummary};
use crate::domain::types::EntityType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// RunLogRepository - 运行日志仓储
// ==========================================
pub struct RunLogRepository {
    conn: Arc<Mutex<Connection>>,
}

// 查询行的原始形态（枚举解析放在 rusqlite 闭包之外）
struct RunLogRow {
    phase: String,
    entity_type: String,
    created: i64,
    skipped: i64,
    total: i64,
    status: String,
    elapsed_ms: i64,
    message: Option<String>,
}

impl RunLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入一条阶段汇总
    ///
    /// # 返回
    /// - `Ok(log_id)`: 自增主键
    pub fn insert_summary(&self, run_id: &str, summary: &PhaseSummary) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO import_run_log (
                run_id, phase, entity_type, created, skipped, total,
                status, elapsed_ms, message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                run_id,
                summary.phase,
                summary.entity_type.as_str(),
                summary.created as i64,
                summary.skipped as i64,
                summary.total as i64,
                summary.status.to_string(),
                summary.elapsed_ms as i64,
                summary.message,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 按写入顺序读取某次运行的全部汇总
    pub fn list_by_run(&self, run_id: &str) -> RepositoryResult<Vec<PhaseSummary>> {
        let rows = {
            let conn = self.get_conn()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT phase, entity_type, created, skipped, total,
                       status, elapsed_ms, message
                FROM import_run_log
                WHERE run_id = ?
                ORDER BY log_id
                "#,
            )?;

            let rows = stmt
                .query_map(params![run_id], map_row)?
                .collect::<SqliteResult<Vec<_>>>()?;
            rows
        };

        rows.into_iter().map(into_summary).collect()
    }

    /// 某次运行是否存在失败阶段
    pub fn has_failure(&self, run_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM import_run_log WHERE run_id = ?1 AND status = ?2",
            params![run_id, PhaseStatus::Failed.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn map_row(row: &Row<'_>) -> SqliteResult<RunLogRow> {
    Ok(RunLogRow {
        phase: row.get(0)?,
        entity_type: row.get(1)?,
        created: row.get(2)?,
        skipped: row.get(3)?,
        total: row.get(4)?,
        status: row.get(5)?,
        elapsed_ms: row.get(6)?,
        message: row.get(7)?,
    })
}

fn into_summary(row: RunLogRow) -> RepositoryResult<PhaseSummary> {
    let entity_type = row
        .entity_type
        .parse::<EntityType>()
        .map_err(RepositoryError::SerializationError)?;
    let status = row
        .status
        .parse::<PhaseStatus>()
        .map_err(RepositoryError::SerializationError)?;

    Ok(PhaseSummary {
        phase: row.phase,
        entity_type,
        created: row.created.max(0) as usize,
        skipped: row.skipped.max(0) as usize,
        total: row.total.max(0) as usize,
        status,
        elapsed_ms: row.elapsed_ms.max(0) as u64,
        message: row.message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn setup() -> RunLogRepository {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        RunLogRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn summary(phase: &str, status: PhaseStatus) -> PhaseSummary {
        PhaseSummary {
            phase: phase.to_string(),
            entity_type: EntityType::Item,
            created: 9,
            skipped: 1,
            total: 10,
            status,
            elapsed_ms: 42,
            message: None,
        }
    }

    #[test]
    fn test_insert_and_list_in_order() {
        let repo = setup();
        repo.insert_summary("run-1", &summary("allocate", PhaseStatus::Completed)).unwrap();
        repo.insert_summary("run-1", &summary("materialize", PhaseStatus::Halted)).unwrap();
        repo.insert_summary("run-2", &summary("allocate", PhaseStatus::Completed)).unwrap();

        let logs = repo.list_by_run("run-1").unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].phase, "allocate");
        assert_eq!(logs[1].status, PhaseStatus::Halted);
        assert_eq!(logs[1].created, 9);
        assert!(!repo.has_failure("run-1").unwrap());
    }

    #[test]
    fn test_has_failure() {
        let repo = setup();
        repo.insert_summary("run-3", &summary("allocate", PhaseStatus::Failed)).unwrap();
        assert!(repo.has_failure("run-3").unwrap());
    }
}
