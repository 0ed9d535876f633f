//! Core of epochlog: records sources, experiments and nested epoch groups
//! into a hierarchical container file.
//!
//! `EpochPersistor` is the entry point; everything else supports it.

pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{
    Entity, EntityId, EntityKind, EntityRef, EpochGroup, Experiment, Labeled, Source,
    TimelineEntity,
};
pub use model::note::{Note, NOTE_RECORD_SIZE, NOTE_TEXT_CAPACITY};
pub use model::time::Timestamp;
pub use model::value::{Measurement, PropertyValue};
pub use service::error::{PersistorError, PersistorResult};
pub use service::ids::{IdGenerator, RandomIdGenerator, SequenceIdGenerator};
pub use service::layout::FILE_FORMAT_VERSION;
pub use service::options::{OpenGroupPolicy, PersistorOptions};
pub use service::persistor::EpochPersistor;
pub use store::{AttributeValue, HierarchicalStore, NodeId, SqliteStore, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
