use epochlog_core::db::migrations::latest_version;
use epochlog_core::db::{open_db, open_db_in_memory, DbError, DEFAULT_BUSY_TIMEOUT};
use epochlog_core::{SqliteStore, StoreError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_creates_container_tables_and_root() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in ["nodes", "links", "attributes", "datasets", "dataset_records"] {
        assert_table_exists(&conn, table);
    }
    let root_count: i64 = conn
        .query_row("SELECT COUNT(*) FROM nodes WHERE node_id = 1;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(root_count, 1);
}

#[test]
fn reopening_container_file_does_not_reapply_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rig.epochs");

    let first = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    first
        .execute("INSERT INTO nodes DEFAULT VALUES;", [])
        .unwrap();
    drop(first);

    let second = open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    let nodes: i64 = second
        .query_row("SELECT COUNT(*) FROM nodes;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(nodes, 2);
}

#[test]
fn newer_schema_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.epochs");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 42;").unwrap();
    drop(conn);

    match open_db(&path, DEFAULT_BUSY_TIMEOUT).unwrap_err() {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 42);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn store_refuses_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteStore::from_connection(conn).err().unwrap();
    assert!(matches!(
        err,
        StoreError::Db(DbError::UnsupportedSchemaVersion { db_version: 0, .. })
    ));
}

#[test]
fn foreign_keys_are_enabled() {
    let conn = open_db_in_memory().unwrap();
    let enabled: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(enabled, 1);
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "missing table {table_name}");
}
