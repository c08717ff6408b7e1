// ==========================================
// 端到端导入 集成测试
// ==========================================
// 测试目标: 文件读取 → 具名实体 → 占位分配 → 分块落库 → 差异检查 → IdMap 导出 → 运行日志
// ==========================================

mod test_helpers;

use bulk_import::config::{config_keys, ConfigManager, ImportConfig};
use bulk_import::domain::{EntityType, PhaseStatus, Vocabulary};
use bulk_import::importer::{
    read_source_file, DefaultValidator, IdSource, ImportContext, ImportError,
    PassThroughConverter, SourceLayout,
};
use bulk_import::logging;
use bulk_import::report::{DiffChecker, DiffPair};
use bulk_import::repository::{EntityStore, RunLogRepository, SqliteBatchContext, SqliteEntityStore};
use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use tempfile::Builder;
use test_helpers::{count_rows, create_test_db, placeholder_defaults, shared_connection};

fn csv_source(content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

fn dublin_core() -> Vocabulary {
    Vocabulary {
        id: None,
        namespace_uri: "http://purl.org/dc/terms/".to_string(),
        prefix: "dcterms".to_string(),
        label: "Dublin Core".to_string(),
        comment: None,
        owner_id: None,
    }
}

#[test]
fn test_full_import_run() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let report_dir = tempfile::tempdir().unwrap();

    let conn = shared_connection(&db_path);
    let store = SqliteEntityStore::from_connection(conn.clone());
    let manager = ConfigManager::from_connection(conn.clone()).unwrap();
    manager.set_global_config_value(config_keys::ENTITY_CHUNK_SIZE, "2").unwrap();
    manager
        .set_global_config_value(config_keys::REPORT_DIR, report_dir.path().to_str().unwrap())
        .unwrap();
    let config = ImportConfig::load(&manager).unwrap();

    let source = csv_source(
        "id,label,dcterms:title,dcterms:subject\n\
         101,First,Title one,history|maps\n\
         102,Second,Title two,\n\
         103,Third,Title three,art\n",
    );
    let records = read_source_file(source.path(), SourceLayout::default().with_separator('|')).unwrap();
    assert_eq!(records.len(), 3);

    let mut ctx = ImportContext::new(config);

    // 具名实体
    ctx.import_named(&store, vec![("dc".to_string(), dublin_core())]).unwrap();
    assert!(ctx.ids().get(EntityType::Vocabulary, "dc").is_some());

    // 占位分配（沿用源 id）
    for record in &records {
        ctx.ids_mut().for_type_mut(EntityType::Item).reserve(record.source_id.clone());
    }
    let report = ctx
        .allocate(
            &store,
            EntityType::Item,
            &placeholder_defaults(),
            IdSource::Derived { keep_same_id: true },
        )
        .unwrap();
    assert_eq!(report.created, 3);
    assert!(!report.degraded);
    assert_eq!(ctx.ids().get(EntityType::Item, "102"), Some(102));

    // 分块落库
    let validator = DefaultValidator::new();
    let mut converter = PassThroughConverter::new(EntityType::Item);
    let mut batch = SqliteBatchContext::new(&store);
    let stats = ctx
        .materialize(&mut converter, &mut batch, records.clone(), records.len(), &validator)
        .unwrap();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.flushes, 2);
    assert_eq!(count_rows(&store, "resource"), 3);

    let stored = store.read(EntityType::Item, 101).unwrap();
    assert_eq!(stored.label.as_deref(), Some("First"));
    assert_eq!(stored.fields["dcterms:subject"], json!(["history", "maps"]));

    // 差异检查: 库中现状 vs 本次修订
    let checker = DiffChecker::new(ctx.config(), "revise");
    let pairs: Vec<DiffPair> = [101_i64, 103]
        .iter()
        .map(|id| {
            let before = store.read(EntityType::Item, *id).unwrap().fields;
            let mut after = before.clone();
            after.insert("dcterms:title".to_string(), Value::String(format!("Revised {}", id)));
            DiffPair {
                source_id: id.to_string(),
                resource_kind: Some("item".to_string()),
                before,
                after,
            }
        })
        .collect();
    let outcome = checker.run(pairs, ctx.signal()).unwrap();
    assert_eq!(outcome.records, 2);
    assert_eq!(outcome.changed_records, 2);
    assert_eq!(outcome.error_records, 0);

    // IdMap 导出
    let id_map_path = ctx.export_id_map().unwrap();
    let exported: Value = serde_json::from_str(&fs::read_to_string(&id_map_path).unwrap()).unwrap();
    assert!(exported.to_string().contains("101"));

    // 运行日志
    let repo = RunLogRepository::new(conn.clone());
    assert_eq!(ctx.persist_summaries(&repo).unwrap(), 3);
    let logged = repo.list_by_run(ctx.run_id()).unwrap();
    assert_eq!(logged.len(), 3);
    assert!(logged.iter().all(|s| s.status == PhaseStatus::Completed));
    assert!(!repo.has_failure(ctx.run_id()).unwrap());

    let outcome = ctx.finish();
    assert!(outcome.is_success());
    assert_eq!(outcome.error_count, 0);
    assert_eq!(outcome.id_map.get(EntityType::Item, "103"), Some(103));
}

#[test]
fn test_failed_phase_halts_following_phases() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let report_dir = tempfile::tempdir().unwrap();
    let conn = shared_connection(&db_path);
    let store = SqliteEntityStore::from_connection(conn.clone());
    let config = ImportConfig::default().with_report_dir(report_dir.path());

    let mut ctx = ImportContext::new(config);
    ctx.allocate(
        &store,
        EntityType::Item,
        &placeholder_defaults(),
        IdSource::Explicit(vec!["7".to_string()]),
    )
    .unwrap();

    // 同一 id 再次显式分配 → 冲突，运行置错
    let err = ctx
        .allocate(
            &store,
            EntityType::Item,
            &placeholder_defaults(),
            IdSource::Explicit(vec!["7".to_string()]),
        )
        .unwrap_err();
    assert!(matches!(err, ImportError::IdConflict { .. }));
    assert!(err.is_fatal());
    assert!(ctx.signal().has_error());

    // 后续阶段不再执行
    let validator = DefaultValidator::new();
    let mut converter = PassThroughConverter::new(EntityType::Item);
    let mut batch = SqliteBatchContext::new(&store);
    let halted = ctx
        .materialize(&mut converter, &mut batch, Vec::new(), 0, &validator)
        .unwrap_err();
    assert!(matches!(halted, ImportError::Halted { .. }));
    assert!(!halted.is_fatal());

    let repo = RunLogRepository::new(conn.clone());
    ctx.persist_summaries(&repo).unwrap();
    assert!(repo.has_failure(ctx.run_id()).unwrap());

    let outcome = ctx.finish();
    assert!(!outcome.is_success());
    assert!(outcome.halted);
    assert_eq!(count_rows(&store, "resource"), 1);
}
