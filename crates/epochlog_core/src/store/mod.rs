//! Hierarchical container store capability.
//!
//! # Responsibility
//! - Define the storage contract the persistor is written against: named
//!   group nodes, hard links, scalar attributes and fixed-record datasets.
//! - Provide the SQLite-backed implementation used for container files.
//!
//! # Invariants
//! - Link names are unique within one parent node.
//! - Children are enumerated in link creation order.
//! - A node is reclaimed when its last incoming link is removed; the root is
//!   never reclaimed.
//! - Dataset records all have the dataset's declared record size.

use crate::db::DbError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteStore;

static NODE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^/\x00]+$").expect("valid node name regex"));

/// Opaque handle of one group node inside a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) i64);

impl NodeId {
    /// Raw storage key, useful for diagnostics only.
    pub fn raw(self) -> i64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Scalar value stored as a node attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(value) => Some(*value),
            _ => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by container store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Node handle does not refer to a live node.
    NodeNotFound(NodeId),
    /// Name is empty or contains `/` or NUL, or is `.`/`..`.
    InvalidName(String),
    /// A link with this name already exists under the parent.
    LinkExists { parent: NodeId, name: String },
    /// No link with this name exists under the parent.
    LinkNotFound { parent: NodeId, name: String },
    /// A dataset with this name already exists on the node.
    DatasetExists { node: NodeId, name: String },
    /// No dataset with this name exists on the node.
    DatasetNotFound { node: NodeId, name: String },
    /// Appended or stored record does not match the dataset record size.
    RecordSizeMismatch { expected: usize, actual: usize },
    /// Persisted data cannot be interpreted.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NodeNotFound(node) => write!(f, "container node not found: {node}"),
            Self::InvalidName(name) => write!(f, "invalid container name: `{name}`"),
            Self::LinkExists { parent, name } => {
                write!(f, "link `{name}` already exists under {parent}")
            }
            Self::LinkNotFound { parent, name } => {
                write!(f, "link `{name}` not found under {parent}")
            }
            Self::DatasetExists { node, name } => {
                write!(f, "dataset `{name}` already exists on {node}")
            }
            Self::DatasetNotFound { node, name } => {
                write!(f, "dataset `{name}` not found on {node}")
            }
            Self::RecordSizeMismatch { expected, actual } => write!(
                f,
                "record size mismatch: expected {expected} bytes, got {actual}"
            ),
            Self::InvalidData(message) => write!(f, "invalid container data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Validates one link, attribute or dataset name.
pub fn validate_name(name: &str) -> StoreResult<()> {
    if name == "." || name == ".." || !NODE_NAME_RE.is_match(name) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Storage capability consumed by the persistor.
///
/// Implementations are single-writer: mutating calls take `&mut self` and
/// no operation is expected to be invoked concurrently.
pub trait HierarchicalStore {
    /// Root group of the container.
    fn root(&self) -> NodeId;

    /// Whether `node` still exists.
    fn contains(&self, node: NodeId) -> StoreResult<bool>;

    /// Creates a new group and links it under `parent` as `name`.
    fn create_group(&mut self, parent: NodeId, name: &str) -> StoreResult<NodeId>;

    /// Looks up the group linked under `parent` as `name`.
    fn group(&self, parent: NodeId, name: &str) -> StoreResult<Option<NodeId>>;

    /// Lists `(name, node)` links under `parent` in creation order.
    fn children(&self, parent: NodeId) -> StoreResult<Vec<(String, NodeId)>>;

    /// Adds a second named reference to an existing node.
    fn link(&mut self, parent: NodeId, name: &str, target: NodeId) -> StoreResult<()>;

    /// Removes a named reference. Nodes left without references are
    /// reclaimed, together with anything only they referenced.
    fn unlink(&mut self, parent: NodeId, name: &str) -> StoreResult<()>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &AttributeValue)
        -> StoreResult<()>;

    fn attribute(&self, node: NodeId, name: &str) -> StoreResult<Option<AttributeValue>>;

    /// Returns `false` when the attribute was not present.
    fn remove_attribute(&mut self, node: NodeId, name: &str) -> StoreResult<bool>;

    /// Lists attributes sorted by name.
    fn attributes(&self, node: NodeId) -> StoreResult<Vec<(String, AttributeValue)>>;

    /// Creates an empty, growable dataset of fixed-size records.
    fn create_dataset(&mut self, node: NodeId, name: &str, record_size: usize)
        -> StoreResult<()>;

    /// Appends one record and returns its zero-based index.
    fn append_record(&mut self, node: NodeId, name: &str, record: &[u8]) -> StoreResult<u64>;

    /// Reads back every record in append order.
    fn read_records(&self, node: NodeId, name: &str) -> StoreResult<Vec<Vec<u8>>>;

    /// Releases the underlying handle.
    fn close(self) -> StoreResult<()>
    where
        Self: Sized;
}
