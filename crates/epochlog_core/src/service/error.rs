//! Persistor error taxonomy.

use crate::model::note::NoteCodecError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type PersistorResult<T> = Result<T, PersistorError>;

/// Errors surfaced by `EpochPersistor` operations.
#[derive(Debug)]
pub enum PersistorError {
    /// Lifecycle precondition violated.
    InvalidState(String),
    /// Deletion blocked by a referential-integrity rule.
    IntegrityViolation(String),
    /// Property, keyword or entity does not exist.
    NotFound(String),
    /// Caller input cannot be stored as given.
    InvalidArgument(String),
    /// Note text does not fit the fixed-width record.
    NoteTextTooLong { length: usize, capacity: usize },
    /// Container was written by a newer format version.
    UnsupportedFormatVersion {
        file_version: i64,
        latest_supported: i64,
    },
    /// Underlying store failure; never retried.
    Persistence(StoreError),
}

impl Display for PersistorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::IntegrityViolation(message) => write!(f, "integrity violation: {message}"),
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::NoteTextTooLong { length, capacity } => write!(
                f,
                "note text is {length} bytes; capacity is {capacity} bytes"
            ),
            Self::UnsupportedFormatVersion {
                file_version,
                latest_supported,
            } => write!(
                f,
                "container format version {file_version} is newer than supported {latest_supported}"
            ),
            Self::Persistence(err) => write!(f, "persistence failure: {err}"),
        }
    }
}

impl Error for PersistorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for PersistorError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::InvalidName(name) => {
                Self::InvalidArgument(format!("`{name}` is not a valid key"))
            }
            other => Self::Persistence(other),
        }
    }
}

impl From<NoteCodecError> for PersistorError {
    fn from(value: NoteCodecError) -> Self {
        match value {
            NoteCodecError::TextTooLong { length, capacity } => {
                Self::NoteTextTooLong { length, capacity }
            }
            NoteCodecError::InteriorNul
            | NoteCodecError::TimestampOutOfRange
            | NoteCodecError::SubTickPrecision => {
                Self::InvalidArgument(value.to_string())
            }
            other => Self::Persistence(StoreError::InvalidData(other.to_string())),
        }
    }
}
