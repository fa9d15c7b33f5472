use catalog_core::db::open_db_in_memory;
use catalog_core::{
    CatalogStore, CategoryId, Color, ReconcileService, Snapshot, SnapshotRow, SnapshotService,
    SqliteCatalogStore,
};
use rusqlite::Connection;

const RED: Color = Color::new(255, 0, 0);

fn setup() -> (Connection, i64, CategoryId) {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let type_id = store.insert_statement_type("Interview").unwrap();
    let category = store.insert_category(type_id, "person").unwrap();
    (conn, type_id, category.id)
}

fn service(conn: &Connection) -> ReconcileService<SqliteCatalogStore<'_>> {
    ReconcileService::new(SqliteCatalogStore::try_new(conn).unwrap())
}

#[test]
fn retyped_row_adopts_existing_entity() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let alice = store.insert_entity(category_id, "Alice", Color::DEFAULT).unwrap();

    let snapshot = Snapshot::new(["attrX"])
        .with_row(SnapshotRow::new(None, "Alice", RED).with_attributes(["yes"]));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert_eq!(report.attribute_variables_added, 1);
    assert_eq!(report.entities_added, 0);
    assert_eq!(report.entities_removed, 0);
    assert_eq!(report.entities_color_updated, 1);
    assert_eq!(report.attribute_values_updated, 1);
    assert!(report.is_committed());

    let entities = store.list_entities(category_id).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].id, alice);
    assert_eq!(entities[0].color, RED);
    let cells = store.list_attribute_values(category_id).unwrap();
    assert_eq!(cells.len(), 1);
    assert_eq!(cells[0].value, "yes");
}

#[test]
fn new_rows_are_inserted_with_their_cells() {
    let (conn, _, category_id) = setup();
    let snapshot = Snapshot::new(["age"])
        .with_row(SnapshotRow::new(None, "Ann", Color::DEFAULT).with_attributes(["30"]))
        .with_row(SnapshotRow::new(None, "Ben", RED).with_attributes([""]));

    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();
    assert_eq!(report.entities_added, 2);
    assert_eq!(report.attribute_values_updated, 0);
    assert_eq!(report.counts_before.entities, 0);
    assert_eq!(report.counts_after.entities, 2);

    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let entities = store.list_entities(category_id).unwrap();
    assert_eq!(entities[0].value, "Ann");
    assert_eq!(entities[1].color, RED);
    let cells = store.list_attribute_values(category_id).unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].entity_id, entities[0].id);
    assert_eq!(cells[0].value, "30");
    assert_eq!(cells[1].value, "");
}

#[test]
fn entities_missing_from_snapshot_are_removed_with_dependents() {
    let (conn, type_id, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let alice = store.insert_entity(category_id, "Alice", Color::DEFAULT).unwrap();
    let bob = store.insert_entity(category_id, "Bob", Color::DEFAULT).unwrap();
    let statement = store.insert_statement(type_id).unwrap();
    store.insert_dependent(statement, category_id, alice).unwrap();
    store.insert_dependent(statement, category_id, bob).unwrap();

    let snapshot =
        Snapshot::new(Vec::<String>::new()).with_row(SnapshotRow::new(Some(bob), "Bob", Color::DEFAULT));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert_eq!(report.entities_removed, 1);
    assert_eq!(report.dependents_removed(), 1);
    assert_eq!(report.counts_before.entities, 2);
    assert_eq!(report.counts_after.entities, 1);
    assert_eq!(store.dependent_entity_ids(statement).unwrap(), vec![bob]);
}

#[test]
fn empty_value_entities_survive_when_absent() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let placeholder = store.insert_entity(category_id, "", Color::DEFAULT).unwrap();
    let bob = store.insert_entity(category_id, "Bob", Color::DEFAULT).unwrap();

    let snapshot =
        Snapshot::new(Vec::<String>::new()).with_row(SnapshotRow::new(Some(bob), "Bob", Color::DEFAULT));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert_eq!(report.entities_removed, 0);
    assert!(!report.has_changes());
    let ids: Vec<i64> = store
        .list_entities(category_id)
        .unwrap()
        .into_iter()
        .map(|entity| entity.id)
        .collect();
    assert_eq!(ids, vec![placeholder, bob]);
}

#[test]
fn new_empty_value_row_adopts_the_placeholder() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let placeholder = store.insert_entity(category_id, "", Color::DEFAULT).unwrap();
    store.insert_entity(category_id, "Bob", Color::DEFAULT).unwrap();

    let snapshot =
        Snapshot::new(Vec::<String>::new()).with_row(SnapshotRow::new(None, "", Color::DEFAULT));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert_eq!(report.entities_added, 0);
    assert_eq!(report.entities_removed, 1);
    assert_eq!(report.entities_merged, 0);
    let entities = store.list_entities(category_id).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].id, placeholder);

    let exported = SnapshotService::new(SqliteCatalogStore::try_new(&conn).unwrap())
        .export(category_id)
        .unwrap();
    let second = service(&conn).reconcile(category_id, &exported, false).unwrap();
    assert!(!second.has_changes());
}

#[test]
fn stored_empty_value_row_leaves_other_placeholders_alone() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let first = store.insert_entity(category_id, "", Color::DEFAULT).unwrap();
    let second = store.insert_entity(category_id, "", Color::DEFAULT).unwrap();

    let snapshot = Snapshot::new(Vec::<String>::new())
        .with_row(SnapshotRow::new(Some(first), "", Color::DEFAULT));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert!(!report.has_changes());
    let ids: Vec<i64> = store
        .list_entities(category_id)
        .unwrap()
        .into_iter()
        .map(|entity| entity.id)
        .collect();
    assert_eq!(ids, vec![first, second]);
}

#[test]
fn rename_counts_affected_dependents() {
    let (conn, type_id, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let bob = store.insert_entity(category_id, "Bob", Color::DEFAULT).unwrap();
    for _ in 0..2 {
        let statement = store.insert_statement(type_id).unwrap();
        store.insert_dependent(statement, category_id, bob).unwrap();
    }

    let snapshot = Snapshot::new(Vec::<String>::new())
        .with_row(SnapshotRow::new(Some(bob), "Robert", Color::DEFAULT));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert_eq!(report.entities_renamed, 1);
    assert_eq!(report.dependents_renamed, 2);
    assert_eq!(report.entities_color_updated, 0);
    assert_eq!(report.counts_after.dependents, 2);
    assert_eq!(store.list_entities(category_id).unwrap()[0].value, "Robert");
}

#[test]
fn rename_with_new_color_counts_once_as_rename() {
    let (conn, _, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let bob = store.insert_entity(category_id, "Bob", Color::DEFAULT).unwrap();

    let snapshot =
        Snapshot::new(Vec::<String>::new()).with_row(SnapshotRow::new(Some(bob), "Rob", RED));
    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();

    assert_eq!(report.entities_renamed, 1);
    assert_eq!(report.entities_color_updated, 0);
    let stored = &store.list_entities(category_id).unwrap()[0];
    assert_eq!(stored.value, "Rob");
    assert_eq!(stored.color, RED);
}

#[test]
fn unknown_id_is_treated_as_new_row() {
    let (conn, _, category_id) = setup();
    let snapshot = Snapshot::new(Vec::<String>::new())
        .with_row(SnapshotRow::new(Some(999), "Zoe", Color::DEFAULT));

    let report = service(&conn).reconcile(category_id, &snapshot, false).unwrap();
    assert_eq!(report.entities_added, 1);

    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let entities = store.list_entities(category_id).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].value, "Zoe");
    assert_ne!(entities[0].id, 999);
}

#[test]
fn other_categories_are_untouched() {
    let (conn, type_id, category_id) = setup();
    let store = SqliteCatalogStore::try_new(&conn).unwrap();
    let place = store.insert_category(type_id, "place").unwrap();
    store.insert_entity(place.id, "Paris", Color::DEFAULT).unwrap();
    store.insert_entity(category_id, "Alice", Color::DEFAULT).unwrap();

    let report = service(&conn)
        .reconcile(category_id, &Snapshot::new(Vec::<String>::new()), false)
        .unwrap();

    assert_eq!(report.entities_removed, 1);
    assert_eq!(store.count_entities(category_id).unwrap(), 0);
    assert_eq!(store.count_entities(place.id).unwrap(), 1);
}
