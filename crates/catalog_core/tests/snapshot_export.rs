use catalog_core::db::open_db_in_memory;
use catalog_core::{
    CatalogStore, CategoryId, Color, ReconcileService, Snapshot, SnapshotService,
    SnapshotServiceError, SqliteCatalogStore,
};
use rusqlite::Connection;

fn setup() -> (Connection, i64, CategoryId) {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let type_id = store.insert_statement_type("Interview").unwrap();
    let category = store.insert_category(type_id, "person").unwrap();
    (conn, type_id, category.id)
}

#[test]
fn export_lists_entities_by_id_and_columns_by_creation() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    store.insert_attribute_variable(category_id, "city").unwrap();
    store.insert_attribute_variable(category_id, "age").unwrap();
    let bob = store
        .insert_entity(category_id, "Bob", Color::new(0, 128, 0))
        .unwrap();
    let alice = store.insert_entity(category_id, "Alice", Color::DEFAULT).unwrap();
    store.upsert_attribute_value(bob, "city", "Rome").unwrap();
    store.upsert_attribute_value(bob, "age", "41").unwrap();
    store.upsert_attribute_value(alice, "age", "30").unwrap();

    let snapshot = SnapshotService::new(SqliteCatalogStore::try_new(&conn).unwrap())
        .export(category_id)
        .unwrap();

    assert_eq!(snapshot.columns, vec!["city", "age"]);
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.rows[0].id, Some(bob));
    assert_eq!(snapshot.rows[0].color, Color::new(0, 128, 0));
    assert_eq!(snapshot.rows[0].attributes, vec!["Rome", "41"]);
    assert_eq!(snapshot.rows[1].id, Some(alice));
    // Alice has no stored city cell.
    assert_eq!(snapshot.cell(1, "city"), Some(""));
    assert_eq!(snapshot.cell(1, "age"), Some("30"));
}

#[test]
fn export_resolves_category_by_names_and_type_id() {
    let (conn, type_id, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    store.insert_entity(category_id, "Alice", Color::DEFAULT).unwrap();
    let service = SnapshotService::new(SqliteCatalogStore::try_new(&conn).unwrap());

    let by_id = service.export(category_id).unwrap();
    assert_eq!(service.export_by_names("Interview", "person").unwrap(), by_id);
    assert_eq!(service.export_by_type_id(type_id, "person").unwrap(), by_id);
}

#[test]
fn export_of_unknown_category_fails() {
    let (conn, type_id, _) = setup();
    let service = SnapshotService::new(SqliteCatalogStore::try_new(&conn).unwrap());

    assert!(matches!(
        service.export(999),
        Err(SnapshotServiceError::CategoryNotFound(_))
    ));
    assert!(matches!(
        service.export_by_names("Interview", "place"),
        Err(SnapshotServiceError::CategoryNotFound(_))
    ));
    assert!(matches!(
        service.export_by_type_id(type_id + 1, "person"),
        Err(SnapshotServiceError::CategoryNotFound(_))
    ));
}

#[test]
fn exported_table_form_feeds_reconciliation() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    store.insert_attribute_variable(category_id, "age").unwrap();
    let alice = store.insert_entity(category_id, "Alice", Color::DEFAULT).unwrap();
    store.upsert_attribute_value(alice, "age", "30").unwrap();

    let exported = SnapshotService::new(SqliteCatalogStore::try_new(&conn).unwrap())
        .export(category_id)
        .unwrap();
    let (header, mut rows) = exported.to_table();
    assert_eq!(header, vec!["ID", "value", "color", "age"]);
    rows[0][2] = "#FF0000".to_string();
    rows.push(vec![
        "-1".to_string(),
        "Bob".to_string(),
        "#000000".to_string(),
        "52".to_string(),
    ]);

    let edited = Snapshot::from_table(&header, &rows).unwrap();
    let report = ReconcileService::new(SqliteCatalogStore::try_new(&conn).unwrap())
        .reconcile(category_id, &edited, false)
        .unwrap();

    assert_eq!(report.entities_color_updated, 1);
    assert_eq!(report.entities_added, 1);
    assert_eq!(store.count_entities(category_id).unwrap(), 2);
}

#[test]
fn exported_snapshot_survives_json() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    store.insert_attribute_variable(category_id, "age").unwrap();
    let alice = store
        .insert_entity(category_id, "Alice", Color::new(1, 2, 3))
        .unwrap();
    store.upsert_attribute_value(alice, "age", "30").unwrap();

    let exported = SnapshotService::new(SqliteCatalogStore::try_new(&conn).unwrap())
        .export(category_id)
        .unwrap();
    let json = serde_json::to_string(&exported).unwrap();
    assert!(json.contains("\"#010203\""));

    let parsed: Snapshot = serde_json::from_str(&json).unwrap();
    let report = ReconcileService::new(SqliteCatalogStore::try_new(&conn).unwrap())
        .reconcile(category_id, &parsed, false)
        .unwrap();
    assert!(!report.has_changes());
}
