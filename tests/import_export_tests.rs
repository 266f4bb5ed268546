/// Import and Export Tests
///
/// Tests loading CSV and JSON files into a table and writing a table out as CSV.
use std::collections::HashMap;
use std::fs;

mod helpers;
use dynamo_utils::files::JsonFormat;
use dynamo_utils::ops::{export_csv, import_csv, import_json};
use dynamo_utils::record::ValueType;
use helpers::*;

const USERS_CSV: &str = "id,name,age\n1,Ada,36\n2,,41\n3,Linus\n4,Grace,x\n";

fn age_hint() -> HashMap<String, ValueType> {
    HashMap::from([("age".to_string(), ValueType::Number)])
}

fn empty_users() -> MemoryStore {
    MemoryStore::new().with_table(USERS_TABLE, KeySchema::partition("id"))
}

/// Test a CSV import writes good rows and counts the bad ones
#[tokio::test]
async fn test_import_csv_skips_bad_rows() {
    let path = temp_path("users", "csv");
    fs::write(&path, USERS_CSV).unwrap();
    let store = empty_users();

    let summary = import_csv(&store, USERS_TABLE, &path, age_hint(), &fast_mutator())
        .await
        .unwrap();

    assert_eq!(summary.items_written, 2);
    assert_eq!(summary.items_rejected, 2);
    let items = store.items(USERS_TABLE);
    assert_eq!(items[0]["age"], AttributeValue::N("36".into()));
    assert_eq!(items[0]["name"], AttributeValue::S("Ada".into()));
    // empty fields are left out
    assert!(!items[1].contains_key("name"));

    let _ = fs::remove_file(path);
}

/// Test a CSV import aborts on the first bad row under the abort policy
#[tokio::test]
async fn test_import_csv_fail_fast() {
    let path = temp_path("users_strict", "csv");
    fs::write(&path, USERS_CSV).unwrap();
    let store = empty_users();
    let mutator = PagedMutator::new(
        fast_options().with_record_error_policy(dynamo_utils::RecordErrorPolicy::Abort),
    );

    let err = import_csv(&store, USERS_TABLE, &path, age_hint(), &mutator)
        .await
        .unwrap_err();

    assert!(err.is_malformed_input());
    assert!(store.is_empty(USERS_TABLE));

    let _ = fs::remove_file(path);
}

/// Test unstorable numbers under a number hint are rejected row by row
#[tokio::test]
async fn test_import_csv_rejects_unstorable_numbers() {
    let path = temp_path("numbers", "csv");
    let digits = "1".repeat(39);
    fs::write(
        &path,
        format!("id,age\n1,NaN\n2,inf\n3,{digits}\n4,42\n5,-Infinity\n"),
    )
    .unwrap();
    let store = empty_users();

    let summary = import_csv(&store, USERS_TABLE, &path, age_hint(), &fast_mutator())
        .await
        .unwrap();

    assert_eq!(summary.items_written, 1);
    assert_eq!(summary.items_rejected, 4);
    let items = store.items(USERS_TABLE);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["age"], AttributeValue::N("42".into()));

    let _ = fs::remove_file(path);
}

/// Test rows without the key column are rejected
#[tokio::test]
async fn test_import_csv_requires_key() {
    let path = temp_path("no_key", "csv");
    fs::write(&path, "id,name\n1,Ada\n,Nobody\n").unwrap();
    let store = empty_users();

    let summary = import_csv(&store, USERS_TABLE, &path, HashMap::new(), &fast_mutator())
        .await
        .unwrap();

    assert_eq!(summary.items_written, 1);
    assert_eq!(summary.items_rejected, 1);

    let _ = fs::remove_file(path);
}

/// Test a key repeated in the file keeps the last row
#[tokio::test]
async fn test_import_csv_repeated_key() {
    let path = temp_path("repeated", "csv");
    fs::write(&path, "id,name\n1,a\n1,b\n2,c\n").unwrap();
    let store = empty_users();

    let summary = import_csv(&store, USERS_TABLE, &path, HashMap::new(), &fast_mutator())
        .await
        .unwrap();

    assert_eq!(summary.items_written, 2);
    assert_eq!(summary.items_skipped, 1);
    assert_eq!(summary.items_failed, 0);
    assert_eq!(summary.items_rejected, 0);
    let items = store.items(USERS_TABLE);
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], AttributeValue::S("b".into()));

    let _ = fs::remove_file(path);
}

/// Test a hint for a column the file does not have is an error
#[tokio::test]
async fn test_import_csv_unknown_hint() {
    let path = temp_path("hint", "csv");
    fs::write(&path, "id,name\n1,Ada\n").unwrap();
    let store = empty_users();
    let hints = HashMap::from([("score".to_string(), ValueType::Number)]);

    let err = import_csv(&store, USERS_TABLE, &path, hints, &fast_mutator())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidValue(_)));

    let _ = fs::remove_file(path);
}

/// Test a missing input file is an I/O error
#[tokio::test]
async fn test_import_missing_file() {
    let store = empty_users();
    let path = temp_path("missing", "csv");

    let err = import_csv(&store, USERS_TABLE, &path, HashMap::new(), &fast_mutator())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Io(_)));
}

/// Test importing a JSON array keeps nested and typed values
#[tokio::test]
async fn test_import_json_document() {
    let path = temp_path("users", "json");
    let text = r#"[
        {"id": "a", "age": 30, "tags": ["x", "y"], "admin": true},
        {"id": "b", "profile": {"city": "Oslo"}}
    ]"#;
    fs::write(&path, text).unwrap();
    let store = empty_users();

    let summary = import_json(
        &store,
        USERS_TABLE,
        &path,
        JsonFormat::Document,
        None,
        &fast_mutator(),
    )
    .await
    .unwrap();

    assert_eq!(summary.items_written, 2);
    let items = store.items(USERS_TABLE);
    assert_eq!(items[0]["age"], AttributeValue::N("30".into()));
    assert_eq!(items[0]["admin"], AttributeValue::Bool(true));
    assert!(matches!(items[0]["tags"], AttributeValue::L(_)));
    assert!(matches!(items[1]["profile"], AttributeValue::M(_)));

    let _ = fs::remove_file(path);
}

/// Test JSON Lines with a broken line, a blank line and a keep list
#[tokio::test]
async fn test_import_json_lines_with_keep() {
    let path = temp_path("users", "jsonl");
    let text = "{\"id\": \"a\", \"name\": \"Ada\", \"secret\": 1}\n\n{broken\n{\"id\": \"b\", \"name\": \"Bob\"}\n";
    fs::write(&path, text).unwrap();
    let store = empty_users();
    let keep = Some(vec!["id".to_string(), "name".to_string()]);

    let summary = import_json(
        &store,
        USERS_TABLE,
        &path,
        JsonFormat::Lines,
        keep,
        &fast_mutator(),
    )
    .await
    .unwrap();

    assert_eq!(summary.items_written, 2);
    assert_eq!(summary.items_rejected, 1);
    assert!(
        store
            .items(USERS_TABLE)
            .iter()
            .all(|item| item.len() == 2 && !item.contains_key("secret"))
    );

    let _ = fs::remove_file(path);
}

/// Test a keep list without the key attribute is refused before reading
#[tokio::test]
async fn test_import_json_keep_without_key() {
    let path = temp_path("keep", "json");
    fs::write(&path, r#"[{"id": "a", "name": "Ada"}]"#).unwrap();
    let store = empty_users();

    let err = import_json(
        &store,
        USERS_TABLE,
        &path,
        JsonFormat::Document,
        Some(vec!["name".to_string()]),
        &fast_mutator(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidValue(_)));
    assert!(store.is_empty(USERS_TABLE));

    let _ = fs::remove_file(path);
}

/// Test an empty JSON array is malformed input
#[tokio::test]
async fn test_import_json_empty_array() {
    let path = temp_path("empty", "json");
    fs::write(&path, "[]").unwrap();
    let store = empty_users();

    let err = import_json(
        &store,
        USERS_TABLE,
        &path,
        JsonFormat::Document,
        None,
        &fast_mutator(),
    )
    .await
    .unwrap_err();

    assert!(err.is_malformed_input());

    let _ = fs::remove_file(path);
}

/// Test exporting writes a sorted header and one row per item
#[tokio::test]
async fn test_export_csv() {
    let store = seeded_users(30);
    let path = temp_path("export", "csv");

    let report = export_csv(&store, USERS_TABLE, &path, &fast_mutator())
        .await
        .unwrap();

    assert_eq!(report.summary.items_written, 30);
    assert_eq!(
        report.columns,
        Some(vec![
            "created_at".to_string(),
            "id".to_string(),
            "name".to_string(),
            "team".to_string(),
        ])
    );

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 31);
    assert_eq!(lines[0], "created_at,id,name,team");
    assert_eq!(lines[1], "2024-01-01T00:00:00Z,user-0000,User 0,red");
    assert!(report.dropped_columns.is_empty());

    let _ = fs::remove_file(path);
}

/// Test attributes missing from the first item are reported, not written
#[tokio::test]
async fn test_export_csv_reports_dropped_columns() {
    let store = empty_users();
    let items = [
        json_record(r#"{"id": "a", "name": "Ada"}"#),
        json_record(r#"{"id": "b", "name": "Bob", "email": "bob@example.com"}"#),
        json_record(r#"{"id": "c", "age": 7}"#),
    ];
    store.insert(USERS_TABLE, items).unwrap();
    let path = temp_path("export_dropped", "csv");

    let report = export_csv(&store, USERS_TABLE, &path, &fast_mutator())
        .await
        .unwrap();

    assert_eq!(report.summary.items_written, 3);
    assert_eq!(
        report.dropped_columns,
        vec!["age".to_string(), "email".to_string()]
    );
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, "id,name\na,Ada\nb,Bob\nc,\n");

    let _ = fs::remove_file(path);
}

fn json_record(text: &str) -> Record {
    record_from_json(serde_json::from_str(text).unwrap()).unwrap()
}

/// Test exported CSV imports back into an equal table
#[tokio::test]
async fn test_export_then_import() {
    let source = seeded_users(12);
    let path = temp_path("roundtrip", "csv");
    let _ = export_csv(&source, USERS_TABLE, &path, &fast_mutator())
        .await
        .unwrap();

    let dest = empty_users();
    let summary = import_csv(&dest, USERS_TABLE, &path, HashMap::new(), &fast_mutator())
        .await
        .unwrap();

    assert_eq!(summary.items_written, 12);
    assert_eq!(dest.items(USERS_TABLE), source.items(USERS_TABLE));

    let _ = fs::remove_file(path);
}

/// Test exporting an empty table writes an empty file
#[tokio::test]
async fn test_export_empty_table() {
    let store = empty_users();
    let path = temp_path("export_empty", "csv");

    let report = export_csv(&store, USERS_TABLE, &path, &fast_mutator())
        .await
        .unwrap();

    assert!(report.columns.is_none());
    assert_eq!(fs::read_to_string(&path).unwrap(), "");

    let _ = fs::remove_file(path);
}
