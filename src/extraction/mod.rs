//! Extraction module.
//!
//! Ingestion-side unpacking of received reports into bundles and items over
//! the key/value stores.

pub mod extractor;

pub use extractor::*;
