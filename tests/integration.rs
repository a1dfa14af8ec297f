//! Integration tests for scanbase
//!
//! Exercises full project flows through the public API: scan lifecycle,
//! import from export logs, undo/redo, searches, brick provenance and
//! persistence, down to the files on disk.

use scanbase::project::{
    COLLECTION_BRICK, COLLECTION_CURRENT, COLLECTION_INITIAL, RAW_DATA_DIR, TAG_BRICKS,
    TAG_CHECKSUM, TAG_TYPE,
};
use scanbase::{
    Document, Error, FieldDef, FieldType, ImportOptions, ProcessSpec, Project, Value, ValueWrite,
};
use scanql::{Condition, Filter, Literal, NOT_DEFINED_VALUE};
use tempfile::TempDir;

/// Helper to create a test project
async fn setup_project() -> (TempDir, Project) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let project = Project::create(tmp.path(), "integration")
        .await
        .expect("Failed to create project");
    (tmp, project)
}

/// Write a scan file under data/raw_data and return its document key
async fn stage_scan(tmp: &TempDir, name: &str, bytes: &[u8]) -> String {
    let key = format!("{}/{}.nii", RAW_DATA_DIR, name);
    tokio::fs::write(tmp.path().join(&key), bytes)
        .await
        .expect("Failed to write scan file");
    key
}

/// Clone every document of a collection, in insertion order
fn snapshot(project: &Project, collection: &str) -> Vec<Document> {
    let db = project.database();
    db.get_documents_names(collection)
        .expect("collection exists")
        .iter()
        .map(|key| {
            db.get_document(collection, key)
                .expect("collection exists")
                .expect("document present")
                .clone()
        })
        .collect()
}

/// Full observable state: both scan collections plus the visible tags
fn full_state(project: &Project) -> (Vec<Document>, Vec<Document>, Vec<String>) {
    (
        snapshot(project, COLLECTION_CURRENT),
        snapshot(project, COLLECTION_INITIAL),
        project.visible_tags().expect("visible tags"),
    )
}

fn assert_collections_agree(project: &Project) {
    let db = project.database();
    let mut current = db
        .get_documents_names(COLLECTION_CURRENT)
        .expect("current names");
    let mut initial = db
        .get_documents_names(COLLECTION_INITIAL)
        .expect("initial names");
    current.sort();
    initial.sort();
    assert_eq!(current, initial);
}

// =============================================================================
// Dual-Collection Symmetry Tests
// =============================================================================

#[tokio::test]
async fn test_scan_lifecycle_keeps_collections_in_step() {
    let (tmp, mut project) = setup_project().await;
    let a = stage_scan(&tmp, "a", b"one").await;
    let b = stage_scan(&tmp, "b", b"two").await;
    let c = stage_scan(&tmp, "c", b"three").await;

    project
        .add_scans(&[a.clone(), b.clone(), c.clone()])
        .await
        .expect("add scans");
    assert_collections_agree(&project);

    project.remove_scans(&[b.clone()]).expect("remove scan");
    assert_collections_agree(&project);
    assert_eq!(
        project
            .database()
            .get_documents_names(COLLECTION_CURRENT)
            .expect("names"),
        vec![a, c]
    );
}

#[tokio::test]
async fn test_failed_scan_batch_leaves_no_partial_state() {
    let (tmp, mut project) = setup_project().await;
    let a = stage_scan(&tmp, "a", b"one").await;
    let b = stage_scan(&tmp, "b", b"two").await;
    project.add_scans(&[a.clone()]).await.expect("add scan");

    // the batch names an existing scan, so nothing from it may land
    let result = project.add_scans(&[b.clone(), a.clone()]).await;
    assert!(matches!(result, Err(Error::DocumentAlreadyExists { .. })));
    assert!(!project
        .database()
        .has_document(COLLECTION_CURRENT, &b)
        .expect("lookup"));
    assert_eq!(project.history().undo_depth(), 1);
    assert_collections_agree(&project);
}

// =============================================================================
// Undo / Redo Tests
// =============================================================================

#[tokio::test]
async fn test_undo_redo_walk_restores_state_snapshots() {
    let (tmp, mut project) = setup_project().await;
    let x = stage_scan(&tmp, "x", b"xx").await;
    let y = stage_scan(&tmp, "y", b"yy").await;

    let mut states = vec![full_state(&project)];

    project
        .add_scans(&[x.clone(), y.clone()])
        .await
        .expect("add scans");
    states.push(full_state(&project));

    project
        .add_tag(
            "Age",
            FieldDef {
                field_type: FieldType::Int,
                ..FieldDef::default()
            },
        )
        .expect("add tag");
    states.push(full_state(&project));

    project
        .set_values(&[ValueWrite {
            key: x.clone(),
            field: "Age".to_string(),
            value: Value::Int(44),
        }])
        .expect("edit cell");
    states.push(full_state(&project));

    project
        .set_visibles(&["FileName".to_string(), "Age".to_string()])
        .expect("set visibles");
    states.push(full_state(&project));

    // walking back restores each earlier snapshot exactly
    for expected in states.iter().rev().skip(1) {
        project.undo().expect("undo");
        assert_eq!(&full_state(&project), expected);
    }
    assert!(matches!(project.undo(), Err(Error::NothingToUndo)));

    // walking forward restores each later snapshot exactly
    for expected in states.iter().skip(1) {
        project.redo().expect("redo");
        assert_eq!(&full_state(&project), expected);
    }
    assert!(matches!(project.redo(), Err(Error::NothingToRedo)));
}

#[tokio::test]
async fn test_rejected_edit_batch_leaves_no_trace() {
    let (tmp, mut project) = setup_project().await;
    let x = stage_scan(&tmp, "x", b"xx").await;
    project.add_scans(&[x.clone()]).await.expect("add scan");
    project
        .add_tag(
            "Age",
            FieldDef {
                field_type: FieldType::Int,
                ..FieldDef::default()
            },
        )
        .expect("add tag");

    let before = full_state(&project);
    let depth = project.history().undo_depth();

    // the second write is ill-typed, so the first must not apply either
    let result = project.set_values(&[
        ValueWrite {
            key: x.clone(),
            field: "Age".to_string(),
            value: Value::Int(33),
        },
        ValueWrite {
            key: x.clone(),
            field: "Age".to_string(),
            value: Value::String("old".to_string()),
        },
    ]);
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    assert_eq!(full_state(&project), before);
    assert_eq!(project.history().undo_depth(), depth);
}

#[tokio::test]
async fn test_rejected_tag_default_leaves_no_trace() {
    let (tmp, mut project) = setup_project().await;
    let x = stage_scan(&tmp, "x", b"xx").await;
    project.add_scans(&[x.clone()]).await.expect("add scan");

    let before = full_state(&project);
    let depth = project.history().undo_depth();

    // the declared default does not fit the tag's type, so the tag must
    // not register on either collection
    let result = project.add_tag(
        "Age",
        FieldDef {
            field_type: FieldType::Int,
            default: Some(serde_json::json!("not-an-int")),
            ..FieldDef::default()
        },
    );
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
        assert!(project
            .database()
            .get_field(collection, "Age")
            .expect("schema lookup")
            .is_none());
    }
    assert_eq!(full_state(&project), before);
    assert_eq!(project.history().undo_depth(), depth);
}

// =============================================================================
// Import Tests
// =============================================================================

async fn write_export_files(tmp: &TempDir) -> std::path::PathBuf {
    let source = tmp.path().join("export");
    tokio::fs::create_dir_all(&source)
        .await
        .expect("Failed to create export dir");
    source
}

#[tokio::test]
async fn test_import_export_log_end_to_end() {
    let (tmp, mut project) = setup_project().await;
    let source = write_export_files(&tmp).await;
    tokio::fs::write(
        source.join("export.json"),
        r#"[{"NameFile": "scan1", "StatusExport": "Export ok"}]"#,
    )
    .await
    .expect("write log");
    tokio::fs::write(
        source.join("scan1.json"),
        r#"{"SequenceName": {"value": ["T1"], "units": "", "format": "", "type": "string", "description": ""}}"#,
    )
    .await
    .expect("write sidecar");
    tokio::fs::write(source.join("scan1.nii"), b"raw scan bytes")
        .await
        .expect("write scan");

    let report = project
        .import_export_log(&source.join("export.json"), ImportOptions::default())
        .await
        .expect("import");

    let key = format!("{}/scan1.nii", RAW_DATA_DIR);
    assert_eq!(report.added_keys, vec![key.clone()]);
    assert!(!report.cancelled);

    let db = project.database();
    for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
        // the single-element list collapsed to a scalar
        assert_eq!(
            db.get_value(collection, &key, "SequenceName").expect("cell"),
            Value::String("T1".to_string())
        );
        assert_eq!(
            db.get_value(collection, &key, TAG_TYPE).expect("cell"),
            Value::String("Scan".to_string())
        );
        assert!(matches!(
            db.get_value(collection, &key, TAG_CHECKSUM).expect("cell"),
            Value::String(_)
        ));
    }
    let current_doc = db
        .get_document(COLLECTION_CURRENT, &key)
        .expect("lookup")
        .expect("present");
    let initial_doc = db
        .get_document(COLLECTION_INITIAL, &key)
        .expect("lookup")
        .expect("present");
    assert_eq!(current_doc, initial_doc);
    assert!(tmp.path().join(&key).exists());

    // exactly one add_scans entry covers the import
    assert_eq!(project.history().undo_depth(), 1);
    assert_eq!(project.undo().expect("undo"), "add_scans");
    assert_eq!(
        project
            .database()
            .document_count(COLLECTION_CURRENT)
            .expect("count"),
        0
    );
    assert_eq!(
        project
            .database()
            .document_count(COLLECTION_INITIAL)
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn test_import_skips_rows_not_exported_ok() {
    let (tmp, mut project) = setup_project().await;
    let source = write_export_files(&tmp).await;
    tokio::fs::write(
        source.join("export.json"),
        r#"[
            {"NameFile": "good", "StatusExport": "Export ok"},
            {"NameFile": "bad", "StatusExport": "Export aborted"}
        ]"#,
    )
    .await
    .expect("write log");
    tokio::fs::write(source.join("good.json"), r#"{"Site": "Lyon"}"#)
        .await
        .expect("write sidecar");
    tokio::fs::write(source.join("good.nii"), b"good bytes")
        .await
        .expect("write scan");

    let report = project
        .import_export_log(&source.join("export.json"), ImportOptions::default())
        .await
        .expect("import");

    assert_eq!(report.added_keys, vec![format!("{}/good.nii", RAW_DATA_DIR)]);
    assert_eq!(report.skipped, vec!["bad".to_string()]);
    assert_eq!(
        project
            .database()
            .document_count(COLLECTION_CURRENT)
            .expect("count"),
        1
    );
}

#[tokio::test]
async fn test_import_aborts_when_sidecar_is_missing() {
    let (tmp, mut project) = setup_project().await;
    let source = write_export_files(&tmp).await;
    tokio::fs::write(
        source.join("export.json"),
        r#"[
            {"NameFile": "scan1", "StatusExport": "Export ok"},
            {"NameFile": "scan2", "StatusExport": "Export ok"}
        ]"#,
    )
    .await
    .expect("write log");
    tokio::fs::write(source.join("scan1.json"), r#"{"Age": 42}"#)
        .await
        .expect("write sidecar");
    tokio::fs::write(source.join("scan1.nii"), b"bytes")
        .await
        .expect("write scan");
    // no scan2.json

    let result = project
        .import_export_log(&source.join("export.json"), ImportOptions::default())
        .await;
    assert!(matches!(result, Err(Error::ImportFailed { .. })));

    // fail-fast: nothing was committed, not even scan1's file copy
    assert_eq!(
        project
            .database()
            .document_count(COLLECTION_CURRENT)
            .expect("count"),
        0
    );
    assert_eq!(project.history().undo_depth(), 0);
    assert!(!tmp
        .path()
        .join(format!("{}/scan1.nii", RAW_DATA_DIR))
        .exists());
    assert!(project.unregistered_scans().expect("walk").is_empty());
}

// =============================================================================
// Search Tests
// =============================================================================

#[tokio::test]
async fn test_rapid_search_matches_text_and_not_defined() {
    let (tmp, mut project) = setup_project().await;
    let x = stage_scan(&tmp, "x", b"1").await;
    let y = stage_scan(&tmp, "y", b"2").await;
    project
        .add_scans(&[x.clone(), y.clone()])
        .await
        .expect("add scans");
    project
        .add_tag(
            "Age",
            FieldDef {
                field_type: FieldType::Int,
                ..FieldDef::default()
            },
        )
        .expect("add tag");
    project
        .set_values(&[ValueWrite {
            key: x.clone(),
            field: "Age".to_string(),
            value: Value::Int(44),
        }])
        .expect("edit cell");

    // free text matches with surrounding wildcards
    assert_eq!(project.search_rapid("x.nii").expect("search"), vec![x]);

    // the sentinel finds scans with an empty visible cell
    assert_eq!(
        project.search_rapid(NOT_DEFINED_VALUE).expect("search"),
        vec![y]
    );
}

#[tokio::test]
async fn test_advanced_search_stays_inside_scope() {
    let (tmp, mut project) = setup_project().await;
    let a = stage_scan(&tmp, "a", b"1").await;
    let b = stage_scan(&tmp, "b", b"2").await;
    let c = stage_scan(&tmp, "c", b"3").await;
    project
        .add_scans(&[a.clone(), b.clone(), c.clone()])
        .await
        .expect("add scans");

    let mut filter = Filter::new("type-scan");
    filter.fields = vec![vec![TAG_TYPE.to_string()]];
    filter.conditions = vec![Condition::Eq];
    filter.values = vec![Literal::String("Scan".to_string())];
    filter.nots = vec![false];

    // through the project, the scope is every current scan
    assert_eq!(
        project.search_advanced(&filter).expect("search"),
        vec![a.clone(), b.clone(), c.clone()]
    );

    // with a narrowed scope, a matching row outside it never surfaces
    let scope = vec![a.clone(), b.clone()];
    let expr = scanbase::query::compile_filter(&filter, "FileName", &scope).expect("compile");
    let keys: Vec<String> = project
        .database()
        .filter_documents(COLLECTION_CURRENT, &expr)
        .expect("filter")
        .map(|doc| doc.key.clone())
        .collect();
    assert_eq!(keys, vec![a, b]);

    project.save_filter(&filter).await.expect("save filter");
    assert!(project.get_filter("type-scan").is_some());
}

// =============================================================================
// Brick Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_stale_bricks_vanish_from_both_collections() {
    let (tmp, mut project) = setup_project().await;
    let a = stage_scan(&tmp, "a", b"1").await;
    let b = stage_scan(&tmp, "b", b"2").await;
    project
        .add_scans(&[a.clone(), b.clone()])
        .await
        .expect("add scans");

    let step = |name: &str, outputs: Vec<String>| ProcessSpec {
        name: name.to_string(),
        inputs: serde_json::json!({}),
        outputs,
    };

    let first = project
        .on_process_about_to_run(&step("smooth", vec![a.clone()]))
        .expect("run 1");
    let second = project
        .on_process_about_to_run(&step("smooth", vec![b.clone()]))
        .expect("run 2");

    // a rerun covering both paths keeps only the newest candidate
    let retained = project
        .on_process_about_to_run(&step("smooth", vec![a.clone(), b.clone()]))
        .expect("run 3");
    assert_eq!(retained, second);
    assert!(!project
        .database()
        .has_document(COLLECTION_BRICK, &first)
        .expect("lookup"));

    // the discarded id is gone from every back-reference in both collections
    for collection in [COLLECTION_CURRENT, COLLECTION_INITIAL] {
        for key in [&a, &b] {
            let Value::List(items) = project
                .database()
                .get_value(collection, key, TAG_BRICKS)
                .expect("cell")
            else {
                panic!("Bricks should be a list");
            };
            assert!(items.iter().all(|item| item.as_str() != Some(first.as_str())));
            assert!(items
                .iter()
                .any(|item| item.as_str() == Some(retained.as_str())));
        }
    }
}

// =============================================================================
// Checksum Tests
// =============================================================================

#[tokio::test]
async fn test_verify_scans_reports_drift_and_missing_files() {
    let (tmp, mut project) = setup_project().await;
    let intact = stage_scan(&tmp, "intact", b"same bytes").await;
    let drifted = stage_scan(&tmp, "drifted", b"original").await;
    let missing = stage_scan(&tmp, "missing", b"soon gone").await;
    project
        .add_scans(&[intact.clone(), drifted.clone(), missing.clone()])
        .await
        .expect("add scans");

    tokio::fs::write(tmp.path().join(&drifted), b"tampered")
        .await
        .expect("tamper");
    tokio::fs::remove_file(tmp.path().join(&missing))
        .await
        .expect("delete");

    let flagged = project.verify_scans().await.expect("verify");
    assert_eq!(flagged, vec![drifted, missing]);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[tokio::test]
async fn test_save_then_open_preserves_observable_state() {
    let (tmp, mut project) = setup_project().await;
    let x = stage_scan(&tmp, "x", b"xx").await;
    let y = stage_scan(&tmp, "y", b"yy").await;
    project
        .add_scans(&[x.clone(), y.clone()])
        .await
        .expect("add scans");
    project
        .add_tag(
            "AcquisitionDate",
            FieldDef {
                field_type: FieldType::Date,
                ..FieldDef::default()
            },
        )
        .expect("add tag");
    project
        .set_values(&[ValueWrite {
            key: x.clone(),
            field: "AcquisitionDate".to_string(),
            value: Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 15).expect("date")),
        }])
        .expect("edit cell");

    let mut filter = Filter::new("dated");
    filter.fields = vec![vec!["AcquisitionDate".to_string()]];
    filter.conditions = vec![Condition::HasValue];
    filter.values = vec![Literal::Null];
    filter.nots = vec![false];
    project.save_filter(&filter).await.expect("save filter");

    project.save().await.expect("save");

    let reopened = Project::open(tmp.path()).await.expect("open");
    assert_eq!(full_state(&reopened), full_state(&project));
    assert_eq!(reopened.properties, project.properties);
    assert_eq!(reopened.get_filter("dated"), Some(&filter));
    assert!(!reopened.has_unsaved_changes());

    // typed cells survive the round trip as typed values
    assert_eq!(
        reopened
            .database()
            .get_value(COLLECTION_CURRENT, &x, "AcquisitionDate")
            .expect("cell"),
        Value::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 15).expect("date"))
    );
}
