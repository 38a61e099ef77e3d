//! Validation module.
//!
//! Gatekeeping applied before anything reaches storage:
//! - Payload shape and size checks for staged items
//! - Tag and telemetry type validity
//! - SHA-256 checksums used for integrity footers and registration hashes

pub mod checksum;
pub mod payload;
pub mod tags;

pub use checksum::*;
pub use payload::*;
pub use tags::*;
