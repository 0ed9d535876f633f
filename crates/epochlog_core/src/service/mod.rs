//! Persistence services.
//!
//! # Responsibility
//! - Orchestrate container writes into lifecycle-level operations.
//! - Keep callers decoupled from container layout and store details.

mod entity_ops;
pub mod error;
pub mod ids;
pub mod layout;
pub mod options;
pub mod persistor;
