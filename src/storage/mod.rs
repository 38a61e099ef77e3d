//! Storage module.
//!
//! Relational staging store: SQL query builders, row models, payload
//! compression and the SQLite-backed store that executes them.

pub mod compression;
pub mod models;
pub mod queries;
pub mod store;

pub use models::*;
pub use queries::*;
pub use store::StagingStore;
