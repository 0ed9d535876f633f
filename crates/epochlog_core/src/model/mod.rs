//! Domain model for recorded experiment structure.
//!
//! # Responsibility
//! - Define entity identity and the typed handles callers hold.
//! - Define the value types persisted as entity metadata.
//! - Own the fixed-width note record codec and timestamp encoding.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Handles carry identity only; all state lives in the container.

pub mod entity;
pub mod note;
pub mod time;
pub mod value;
