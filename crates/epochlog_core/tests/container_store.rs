use epochlog_core::db::DEFAULT_BUSY_TIMEOUT;
use epochlog_core::{AttributeValue, HierarchicalStore, SqliteStore, StoreError};

fn node_count(store: &SqliteStore) -> i64 {
    store
        .connection()
        .query_row("SELECT COUNT(*) FROM nodes;", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn unlinking_one_of_two_hard_links_keeps_the_node() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let root = store.root();
    let by_time = store.create_group(root, "by_time").unwrap();
    let by_cell = store.create_group(root, "by_cell").unwrap();
    let group = store.create_group(by_time, "g1").unwrap();
    store.link(by_cell, "g1", group).unwrap();

    store.unlink(by_cell, "g1").unwrap();
    assert_eq!(store.group(by_time, "g1").unwrap(), Some(group));
    assert!(store.children(by_cell).unwrap().is_empty());

    store.unlink(by_time, "g1").unwrap();
    assert!(matches!(
        store.attributes(group).unwrap_err(),
        StoreError::NodeNotFound(node) if node == group
    ));
}

#[test]
fn unlink_reclaims_whole_subtree_but_not_shared_targets() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let root = store.root();
    let shared = store.create_group(root, "shared").unwrap();
    let parent = store.create_group(root, "parent").unwrap();
    let child = store.create_group(parent, "child").unwrap();
    store.create_group(child, "grandchild").unwrap();
    store.link(child, "shared", shared).unwrap();
    assert_eq!(node_count(&store), 5);

    store.unlink(root, "parent").unwrap();

    assert_eq!(node_count(&store), 2);
    assert_eq!(store.group(root, "shared").unwrap(), Some(shared));
}

#[test]
fn attributes_keep_their_scalar_kind() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let node = store.create_group(store.root(), "n").unwrap();

    store
        .set_attribute(node, "label", &AttributeValue::Text("Cell 1".into()))
        .unwrap();
    store
        .set_attribute(node, "count", &AttributeValue::Integer(-3))
        .unwrap();
    store
        .set_attribute(node, "gain", &AttributeValue::Real(0.5))
        .unwrap();
    store
        .set_attribute(node, "clamped", &AttributeValue::Boolean(true))
        .unwrap();
    store
        .set_attribute(node, "count", &AttributeValue::Integer(4))
        .unwrap();

    let names = store
        .attributes(node)
        .unwrap()
        .into_iter()
        .map(|(name, _)| name)
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["clamped", "count", "gain", "label"]);
    assert_eq!(
        store.attribute(node, "count").unwrap(),
        Some(AttributeValue::Integer(4))
    );
    assert_eq!(
        store.attribute(node, "clamped").unwrap(),
        Some(AttributeValue::Boolean(true))
    );
    assert!(store.remove_attribute(node, "gain").unwrap());
    assert!(!store.remove_attribute(node, "gain").unwrap());
}

#[test]
fn datasets_enforce_record_size_and_keep_order() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let node = store.create_group(store.root(), "n").unwrap();
    store.create_dataset(node, "samples", 4).unwrap();

    assert_eq!(store.append_record(node, "samples", &[1, 2, 3, 4]).unwrap(), 0);
    assert_eq!(store.append_record(node, "samples", &[5, 6, 7, 8]).unwrap(), 1);
    assert!(matches!(
        store.append_record(node, "samples", &[9]).unwrap_err(),
        StoreError::RecordSizeMismatch {
            expected: 4,
            actual: 1
        }
    ));
    assert!(matches!(
        store.create_dataset(node, "samples", 4).unwrap_err(),
        StoreError::DatasetExists { .. }
    ));

    let records = store.read_records(node, "samples").unwrap();
    assert_eq!(records, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
}

#[test]
fn invalid_names_and_duplicate_links_are_rejected() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let root = store.root();
    store.create_group(root, "a").unwrap();

    assert!(matches!(
        store.create_group(root, "a").unwrap_err(),
        StoreError::LinkExists { .. }
    ));
    assert!(matches!(
        store.create_group(root, "x/y").unwrap_err(),
        StoreError::InvalidName(_)
    ));
    assert!(matches!(
        store.unlink(root, "missing").unwrap_err(),
        StoreError::LinkNotFound { .. }
    ));
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.epochs");

    let mut store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let node = store.create_group(store.root(), "kept").unwrap();
    store.create_dataset(node, "blob", 2).unwrap();
    store.append_record(node, "blob", &[7, 7]).unwrap();
    store.close().unwrap();

    let store = SqliteStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    let node = store.group(store.root(), "kept").unwrap().unwrap();
    assert_eq!(store.read_records(node, "blob").unwrap(), vec![vec![7, 7]]);
}
