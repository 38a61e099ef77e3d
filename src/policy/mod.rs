//! Policy module.
//!
//! Decides whether a telemetry type may be staged at all.

pub mod decision;

pub use decision::*;
