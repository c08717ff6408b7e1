// ==========================================
// 具名实体冲突消解 集成测试
// ==========================================
// 测试目标: 复用 / 改名新建 / 新建 决策，重跑幂等，复用时的前缀告警
// ==========================================

mod test_helpers;

use bulk_import::domain::{
    CustomVocab, EntityType, NamedEntity, ResourceTemplate, TemplateProperty, TypeIdMap, Vocabulary,
};
use bulk_import::importer::{NamedEntityImporter, Resolution};
use bulk_import::logging;
use bulk_import::repository::{EntityStore, SearchFilter};
use std::io;
use std::sync::{Arc, Mutex};
use test_helpers::{count_rows, create_test_db, open_store};
use tracing_subscriber::fmt::MakeWriter;

fn vocabulary(ns: &str, prefix: &str, label: &str) -> Vocabulary {
    Vocabulary {
        id: None,
        namespace_uri: ns.to_string(),
        prefix: prefix.to_string(),
        label: label.to_string(),
        comment: None,
        owner_id: None,
    }
}

fn template(label: &str, properties: &[&str]) -> ResourceTemplate {
    ResourceTemplate {
        id: None,
        label: label.to_string(),
        resource_class: None,
        title_property: None,
        description_property: None,
        properties: properties
            .iter()
            .map(|p| TemplateProperty {
                property: p.to_string(),
                alternate_label: None,
                alternate_comment: None,
                is_required: false,
                is_private: false,
                data_types: vec![],
            })
            .collect(),
        owner_id: None,
    }
}

#[test]
fn test_create_then_reuse_is_idempotent() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let importer = NamedEntityImporter::new(&store);

    let mut ids = TypeIdMap::new();
    let candidate = vocabulary("http://purl.org/dc/terms/", "dcterms", "Dublin Core");
    let (first, id) = importer.import("dc", candidate.clone(), &mut ids).unwrap();
    assert_eq!(first, Resolution::Create);

    // 第二次运行（新的 IdMap）
    let mut rerun = TypeIdMap::new();
    let (second, reused) = importer.import("dc", candidate, &mut rerun).unwrap();
    assert_eq!(second, Resolution::Reuse { id });
    assert_eq!(reused, id);
    assert_eq!(count_rows(&store, "vocabulary"), 1);
}

#[test]
fn test_vocabulary_namespace_ignores_trailing_separator() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let importer = NamedEntityImporter::new(&store);
    let mut ids = TypeIdMap::new();

    importer
        .import("skos", vocabulary("http://www.w3.org/2004/02/skos/core#", "skos", "SKOS"), &mut ids)
        .unwrap();
    let (resolution, _) = importer
        .import("skos2", vocabulary("http://www.w3.org/2004/02/skos/core", "sk", "SKOS again"), &mut ids)
        .unwrap();
    assert!(matches!(resolution, Resolution::Reuse { .. }));
}

#[test]
fn test_label_collision_renames_and_rerun_reuses() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let importer = NamedEntityImporter::new(&store);
    let mut ids = TypeIdMap::new();

    importer.import("t1", template("Book", &["dcterms:title"]), &mut ids).unwrap();

    let candidate = template("Book", &["dcterms:title", "dcterms:creator"]);
    let (resolution, renamed_id) = importer.import("t2", candidate.clone(), &mut ids).unwrap();
    let new_label = match resolution {
        Resolution::RenameAndCreate { new_label } => new_label,
        other => panic!("expected rename, got {other}"),
    };
    assert!(new_label.starts_with("Book ["));
    let stored = store.read(EntityType::ResourceTemplate, renamed_id).unwrap();
    assert_eq!(stored.label.as_deref(), Some(new_label.as_str()));

    // 重跑: 改名副本内容相同，复用
    let mut rerun = TypeIdMap::new();
    let (again, id) = importer.import("t2", candidate, &mut rerun).unwrap();
    assert_eq!(again, Resolution::Reuse { id: renamed_id });
    assert_eq!(id, renamed_id);
    assert_eq!(count_rows(&store, "resource_template"), 2);
}

#[test]
fn test_custom_vocab_term_sets() {
    logging::init_test();
    let (_tmp, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let importer = NamedEntityImporter::new(&store);
    let mut ids = TypeIdMap::new();

    let colors = |terms: &[&str]| CustomVocab {
        id: None,
        label: "Colors".to_string(),
        lang: None,
        terms: terms.iter().map(|t| t.to_string()).collect(),
        uris: vec![],
        item_set_id: None,
        owner_id: None,
    };

    importer.import("c1", colors(&["red", "green"]), &mut ids).unwrap();
    let (same, _) = importer.import("c2", colors(&[" green", "red ", ""]), &mut ids).unwrap();
    assert!(matches!(same, Resolution::Reuse { .. }));

    let (different, _) = importer.import("c3", colors(&["Red", "green"]), &mut ids).unwrap();
    assert!(matches!(different, Resolution::RenameAndCreate { .. }));

    let all = store.search(EntityType::CustomVocab, &SearchFilter::default()).unwrap();
    assert_eq!(all.len(), 2);
}

// 捕获 warn 级日志的写出端
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl CapturedLog {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLog {
    type Writer = CapturedLog;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_vocabulary_prefix_mismatch_is_logged_on_import() {
    let (_tmp, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let importer = NamedEntityImporter::new(&store);
    let mut ids = TypeIdMap::new();

    let log = CapturedLog::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(log.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();

    let (resolution, id) = tracing::subscriber::with_default(subscriber, || {
        importer
            .import("dcterms", vocabulary("http://purl.org/dc/terms/", "dcterms", "Dublin Core"), &mut ids)
            .unwrap();
        importer
            .import("dc", vocabulary("http://purl.org/dc/terms", "dc", "DC"), &mut ids)
            .unwrap()
    });

    assert_eq!(resolution, Resolution::Reuse { id });
    let output = log.text();
    assert!(output.contains("词汇表前缀不一致"), "log was: {output}");
    assert!(output.contains("destination_prefix=dcterms"), "log was: {output}");

    // 目标库前缀保持不变
    let stored = store.read(EntityType::Vocabulary, id).unwrap();
    assert_eq!(Vocabulary::from_stored(&stored).unwrap().prefix, "dcterms");
    assert_eq!(ids.get("dc"), Some(id));
}
