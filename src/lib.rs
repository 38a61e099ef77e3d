//! Telemetry Agent Core - local staging, report assembly and reliable delivery
//!
//! This crate provides the client side of a telemetry pipeline: applications
//! hand it JSON payloads, it stages them locally, rolls them up into
//! checksummed bundles and reports, and delivers the reports to a collector.
//! The implementation prioritizes:
//!
//! 1. **Integrity** - Every staged entity carries a checksum that is
//!    re-verified whenever it is read back
//! 2. **Logging** - Every decision point logged with client and report context
//! 3. **Recovery** - Registration conflicts and rejected tokens are
//!    remediated once, never looped on
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `files` - Managed file primitive (locking, backup, ownership)
//! - `kvstore` - Key/value store contract with file, memory and SQLite backends
//! - `validation` - Payload, tag and telemetry type validation, checksums
//! - `staging` - Data item, bundle and report types
//! - `storage` - Relational staging schema, query builders and store
//! - `processor` - Assembly of items into bundles and reports
//! - `extraction` - Unpacking of received reports into bundles and items
//! - `policy` - Collection policy for telemetry types and classes
//! - `client` - Registration, credentials, collector protocol and facade
//! - `config` - YAML configuration
//! - `logging` - Structured logging with client context

pub mod client;
pub mod config;
pub mod error;
pub mod extraction;
pub mod files;
pub mod kvstore;
pub mod logging;
pub mod policy;
pub mod processor;
pub mod staging;
pub mod storage;
pub mod validation;

pub use client::{GenerateOutcome, TelemetryClient};
pub use config::Config;
pub use error::{Error, Result};
pub use extraction::{ExtractionSummary, Extractor};
pub use logging::init_logger;
pub use processor::Processor;
