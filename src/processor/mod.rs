//! Processor module.
//!
//! Stages validated payloads and rolls them up into bundles and reports.

pub mod assembly;

pub use assembly::Processor;
