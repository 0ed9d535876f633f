//! SQLite-backed container store.
//!
//! # Responsibility
//! - Map groups, hard links, attributes and record datasets onto the
//!   container tables created by `db::migrations`.
//! - Keep every multi-statement primitive inside one immediate transaction.
//!
//! # Invariants
//! - Node ids are never reused (`AUTOINCREMENT`), so stale handles fail with
//!   `NodeNotFound` instead of aliasing a newer node.
//! - Reclamation follows reference counts; nodes kept alive only by a
//!   reference cycle are not reclaimed.

use super::{validate_name, AttributeValue, HierarchicalStore, NodeId, StoreError, StoreResult};
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, DbError};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

const ROOT_NODE: NodeId = NodeId(1);

/// Container store over a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates a container file.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = open_db(path, busy_timeout)?;
        Self::from_connection(conn)
    }

    /// Opens a throwaway in-memory container.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory()?;
        Self::from_connection(conn)
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        let expected = latest_version();
        let actual = current_user_version(&conn)?;
        if actual != expected {
            return Err(StoreError::Db(DbError::UnsupportedSchemaVersion {
                db_version: actual,
                latest_supported: expected,
            }));
        }
        if !node_exists(&conn, ROOT_NODE)? {
            return Err(StoreError::InvalidData(
                "container root node is missing".to_string(),
            ));
        }
        Ok(Self { conn })
    }

    /// Borrows the raw connection for diagnostics and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl HierarchicalStore for SqliteStore {
    fn root(&self) -> NodeId {
        ROOT_NODE
    }

    fn contains(&self, node: NodeId) -> StoreResult<bool> {
        node_exists(&self.conn, node)
    }

    fn create_group(&mut self, parent: NodeId, name: &str) -> StoreResult<NodeId> {
        validate_name(name)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_node(&tx, parent)?;
        if find_link(&tx, parent, name)?.is_some() {
            return Err(StoreError::LinkExists {
                parent,
                name: name.to_string(),
            });
        }

        tx.execute("INSERT INTO nodes DEFAULT VALUES;", [])?;
        let node = NodeId(tx.last_insert_rowid());
        tx.execute(
            "INSERT INTO links (parent_id, name, child_id) VALUES (?1, ?2, ?3);",
            params![parent.0, name, node.0],
        )?;
        tx.commit()?;
        Ok(node)
    }

    fn group(&self, parent: NodeId, name: &str) -> StoreResult<Option<NodeId>> {
        ensure_node(&self.conn, parent)?;
        find_link(&self.conn, parent, name)
    }

    fn children(&self, parent: NodeId) -> StoreResult<Vec<(String, NodeId)>> {
        ensure_node(&self.conn, parent)?;
        let mut stmt = self.conn.prepare(
            "SELECT name, child_id
             FROM links
             WHERE parent_id = ?1
             ORDER BY link_id ASC;",
        )?;
        let mut rows = stmt.query([parent.0])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push((row.get(0)?, NodeId(row.get(1)?)));
        }
        Ok(items)
    }

    fn link(&mut self, parent: NodeId, name: &str, target: NodeId) -> StoreResult<()> {
        validate_name(name)?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_node(&tx, parent)?;
        ensure_node(&tx, target)?;
        if find_link(&tx, parent, name)?.is_some() {
            return Err(StoreError::LinkExists {
                parent,
                name: name.to_string(),
            });
        }
        tx.execute(
            "INSERT INTO links (parent_id, name, child_id) VALUES (?1, ?2, ?3);",
            params![parent.0, name, target.0],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn unlink(&mut self, parent: NodeId, name: &str) -> StoreResult<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_node(&tx, parent)?;
        let child = find_link(&tx, parent, name)?.ok_or_else(|| StoreError::LinkNotFound {
            parent,
            name: name.to_string(),
        })?;

        tx.execute(
            "DELETE FROM links WHERE parent_id = ?1 AND name = ?2;",
            params![parent.0, name],
        )?;
        let reclaimed = reclaim_unreferenced(&tx, child)?;
        tx.commit()?;

        debug!(
            "event=store_unlink module=store status=ok parent={} name={} reclaimed_nodes={}",
            parent, name, reclaimed
        );
        Ok(())
    }

    fn set_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        value: &AttributeValue,
    ) -> StoreResult<()> {
        validate_name(name)?;
        ensure_node(&self.conn, node)?;
        let (kind, text, int, real) = match value {
            AttributeValue::Text(value) => ("text", Some(value.as_str()), None, None),
            AttributeValue::Integer(value) => ("integer", None, Some(*value), None),
            AttributeValue::Real(value) => ("real", None, None, Some(*value)),
            AttributeValue::Boolean(value) => ("boolean", None, Some(i64::from(*value)), None),
        };
        self.conn.execute(
            "INSERT INTO attributes (node_id, name, kind, text_value, int_value, real_value)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (node_id, name) DO UPDATE SET
                kind = excluded.kind,
                text_value = excluded.text_value,
                int_value = excluded.int_value,
                real_value = excluded.real_value;",
            params![node.0, name, kind, text, int, real],
        )?;
        Ok(())
    }

    fn attribute(&self, node: NodeId, name: &str) -> StoreResult<Option<AttributeValue>> {
        ensure_node(&self.conn, node)?;
        let mut stmt = self.conn.prepare(
            "SELECT name, kind, text_value, int_value, real_value
             FROM attributes
             WHERE node_id = ?1 AND name = ?2;",
        )?;
        let mut rows = stmt.query(params![node.0, name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_attribute_row(row)?.1));
        }
        Ok(None)
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) -> StoreResult<bool> {
        ensure_node(&self.conn, node)?;
        let changed = self.conn.execute(
            "DELETE FROM attributes WHERE node_id = ?1 AND name = ?2;",
            params![node.0, name],
        )?;
        Ok(changed > 0)
    }

    fn attributes(&self, node: NodeId) -> StoreResult<Vec<(String, AttributeValue)>> {
        ensure_node(&self.conn, node)?;
        let mut stmt = self.conn.prepare(
            "SELECT name, kind, text_value, int_value, real_value
             FROM attributes
             WHERE node_id = ?1
             ORDER BY name ASC;",
        )?;
        let mut rows = stmt.query([node.0])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_attribute_row(row)?);
        }
        Ok(items)
    }

    fn create_dataset(
        &mut self,
        node: NodeId,
        name: &str,
        record_size: usize,
    ) -> StoreResult<()> {
        validate_name(name)?;
        if record_size == 0 {
            return Err(StoreError::RecordSizeMismatch {
                expected: 1,
                actual: 0,
            });
        }
        ensure_node(&self.conn, node)?;
        if dataset_record_size(&self.conn, node, name)?.is_some() {
            return Err(StoreError::DatasetExists {
                node,
                name: name.to_string(),
            });
        }
        self.conn.execute(
            "INSERT INTO datasets (node_id, name, record_size) VALUES (?1, ?2, ?3);",
            params![node.0, name, record_size as i64],
        )?;
        Ok(())
    }

    fn append_record(&mut self, node: NodeId, name: &str, record: &[u8]) -> StoreResult<u64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        ensure_node(&tx, node)?;
        let record_size =
            dataset_record_size(&tx, node, name)?.ok_or_else(|| StoreError::DatasetNotFound {
                node,
                name: name.to_string(),
            })?;
        if record.len() != record_size {
            return Err(StoreError::RecordSizeMismatch {
                expected: record_size,
                actual: record.len(),
            });
        }

        let seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1
             FROM dataset_records
             WHERE node_id = ?1 AND name = ?2;",
            params![node.0, name],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO dataset_records (node_id, name, seq, record) VALUES (?1, ?2, ?3, ?4);",
            params![node.0, name, seq, record],
        )?;
        tx.commit()?;
        Ok(seq as u64)
    }

    fn read_records(&self, node: NodeId, name: &str) -> StoreResult<Vec<Vec<u8>>> {
        ensure_node(&self.conn, node)?;
        let record_size = dataset_record_size(&self.conn, node, name)?.ok_or_else(|| {
            StoreError::DatasetNotFound {
                node,
                name: name.to_string(),
            }
        })?;

        let mut stmt = self.conn.prepare(
            "SELECT record
             FROM dataset_records
             WHERE node_id = ?1 AND name = ?2
             ORDER BY seq ASC;",
        )?;
        let mut rows = stmt.query(params![node.0, name])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let record: Vec<u8> = row.get(0)?;
            if record.len() != record_size {
                return Err(StoreError::RecordSizeMismatch {
                    expected: record_size,
                    actual: record.len(),
                });
            }
            records.push(record);
        }
        Ok(records)
    }

    fn close(self) -> StoreResult<()> {
        self.conn.close().map_err(|(_, err)| err.into())
    }
}

fn node_exists(conn: &Connection, node: NodeId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM nodes WHERE node_id = ?1);",
        [node.0],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_node(conn: &Connection, node: NodeId) -> StoreResult<()> {
    if node_exists(conn, node)? {
        Ok(())
    } else {
        Err(StoreError::NodeNotFound(node))
    }
}

fn find_link(conn: &Connection, parent: NodeId, name: &str) -> StoreResult<Option<NodeId>> {
    let child: Option<i64> = conn
        .query_row(
            "SELECT child_id FROM links WHERE parent_id = ?1 AND name = ?2;",
            params![parent.0, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(child.map(NodeId))
}

fn dataset_record_size(conn: &Connection, node: NodeId, name: &str) -> StoreResult<Option<usize>> {
    let size: Option<i64> = conn
        .query_row(
            "SELECT record_size FROM datasets WHERE node_id = ?1 AND name = ?2;",
            params![node.0, name],
            |row| row.get(0),
        )
        .optional()?;
    size.map(|value| {
        usize::try_from(value).map_err(|_| {
            StoreError::InvalidData(format!("invalid record_size `{value}` in datasets"))
        })
    })
    .transpose()
}

/// Deletes `start` if nothing links to it any more, then repeats for every
/// node it linked to. Returns the number of nodes deleted.
fn reclaim_unreferenced(conn: &Connection, start: NodeId) -> StoreResult<usize> {
    let mut pending = vec![start];
    let mut reclaimed = 0;

    while let Some(node) = pending.pop() {
        if node == ROOT_NODE || !node_exists(conn, node)? {
            continue;
        }
        let references: i64 = conn.query_row(
            "SELECT COUNT(*) FROM links WHERE child_id = ?1;",
            [node.0],
            |row| row.get(0),
        )?;
        if references > 0 {
            continue;
        }

        {
            let mut stmt = conn.prepare("SELECT child_id FROM links WHERE parent_id = ?1;")?;
            let mut rows = stmt.query([node.0])?;
            while let Some(row) = rows.next()? {
                pending.push(NodeId(row.get(0)?));
            }
        }

        conn.execute("DELETE FROM nodes WHERE node_id = ?1;", [node.0])?;
        reclaimed += 1;
    }

    Ok(reclaimed)
}

fn parse_attribute_row(row: &Row<'_>) -> StoreResult<(String, AttributeValue)> {
    let name: String = row.get("name")?;
    let kind: String = row.get("kind")?;
    let value = match kind.as_str() {
        "text" => row
            .get::<_, Option<String>>("text_value")?
            .map(AttributeValue::Text),
        "integer" => row
            .get::<_, Option<i64>>("int_value")?
            .map(AttributeValue::Integer),
        "real" => row
            .get::<_, Option<f64>>("real_value")?
            .map(AttributeValue::Real),
        "boolean" => match row.get::<_, Option<i64>>("int_value")? {
            Some(0) => Some(AttributeValue::Boolean(false)),
            Some(1) => Some(AttributeValue::Boolean(true)),
            _ => None,
        },
        _ => None,
    };

    value.map(|value| (name.clone(), value)).ok_or_else(|| {
        StoreError::InvalidData(format!(
            "attribute `{name}` has kind `{kind}` without a matching value"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::SqliteStore;
    use crate::store::{AttributeValue, HierarchicalStore, StoreError};

    #[test]
    fn children_are_listed_in_creation_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = store.root();
        let b = store.create_group(root, "b").unwrap();
        let a = store.create_group(root, "a").unwrap();

        let children = store.children(root).unwrap();
        assert_eq!(children, vec![("b".to_string(), b), ("a".to_string(), a)]);
        assert_eq!(store.group(root, "a").unwrap(), Some(a));
        assert_eq!(store.group(root, "missing").unwrap(), None);
    }

    #[test]
    fn duplicate_link_name_is_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = store.root();
        store.create_group(root, "sources").unwrap();

        let err = store.create_group(root, "sources").unwrap_err();
        assert!(matches!(err, StoreError::LinkExists { .. }));
    }

    #[test]
    fn hard_linked_node_survives_until_last_link_is_removed() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = store.root();
        let left = store.create_group(root, "left").unwrap();
        let right = store.create_group(root, "right").unwrap();
        let shared = store.create_group(left, "shared").unwrap();
        let nested = store.create_group(shared, "nested").unwrap();
        store.link(right, "alias", shared).unwrap();

        store.unlink(left, "shared").unwrap();
        assert_eq!(store.group(right, "alias").unwrap(), Some(shared));
        assert_eq!(store.children(shared).unwrap().len(), 1);

        assert!(store.contains(shared).unwrap());

        store.unlink(right, "alias").unwrap();
        assert!(!store.contains(shared).unwrap());
        assert!(matches!(
            store.children(shared).unwrap_err(),
            StoreError::NodeNotFound(node) if node == shared
        ));
        assert!(matches!(
            store.attributes(nested).unwrap_err(),
            StoreError::NodeNotFound(_)
        ));
    }

    #[test]
    fn reclaiming_a_node_keeps_targets_that_are_still_referenced() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let root = store.root();
        let keeper = store.create_group(root, "keeper").unwrap();
        let temp = store.create_group(root, "temp").unwrap();
        store.link(temp, "back", keeper).unwrap();

        store.unlink(root, "temp").unwrap();
        assert_eq!(store.group(root, "keeper").unwrap(), Some(keeper));
        assert!(store.children(keeper).unwrap().is_empty());
    }

    #[test]
    fn attributes_round_trip_each_scalar_kind() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let node = store.create_group(store.root(), "node").unwrap();
        store
            .set_attribute(node, "text", &AttributeValue::Text("hi".to_string()))
            .unwrap();
        store
            .set_attribute(node, "int", &AttributeValue::Integer(-7))
            .unwrap();
        store
            .set_attribute(node, "real", &AttributeValue::Real(2.5))
            .unwrap();
        store
            .set_attribute(node, "flag", &AttributeValue::Boolean(true))
            .unwrap();
        store
            .set_attribute(node, "int", &AttributeValue::Integer(8))
            .unwrap();

        let names: Vec<String> = store
            .attributes(node)
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["flag", "int", "real", "text"]);
        assert_eq!(
            store.attribute(node, "int").unwrap(),
            Some(AttributeValue::Integer(8))
        );
        assert_eq!(
            store.attribute(node, "flag").unwrap(),
            Some(AttributeValue::Boolean(true))
        );

        assert!(store.remove_attribute(node, "text").unwrap());
        assert!(!store.remove_attribute(node, "text").unwrap());
        assert_eq!(store.attribute(node, "text").unwrap(), None);
    }

    #[test]
    fn dataset_enforces_record_size_and_preserves_order() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let node = store.create_group(store.root(), "node").unwrap();
        store.create_dataset(node, "log", 4).unwrap();

        assert_eq!(store.append_record(node, "log", &[1, 2, 3, 4]).unwrap(), 0);
        assert_eq!(store.append_record(node, "log", &[5, 6, 7, 8]).unwrap(), 1);
        let err = store.append_record(node, "log", &[1, 2]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::RecordSizeMismatch {
                expected: 4,
                actual: 2
            }
        ));

        let records = store.read_records(node, "log").unwrap();
        assert_eq!(records, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert!(matches!(
            store.create_dataset(node, "log", 4).unwrap_err(),
            StoreError::DatasetExists { .. }
        ));
        assert!(matches!(
            store.read_records(node, "missing").unwrap_err(),
            StoreError::DatasetNotFound { .. }
        ));
    }
}
