//! Client configuration.
//!
//! YAML-backed settings consumed by the staging, extraction, policy and
//! client modules.

pub mod settings;

pub use settings::*;
