//! Staging hierarchy.
//!
//! Telemetry is grouped data item -> bundle -> report. Every level carries a
//! header, a body and a footer whose checksum covers header and body.

pub mod bundle;
pub mod item;
pub mod report;

pub use bundle::*;
pub use item::*;
pub use report::*;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;

/// Integrity footer shared by all staging levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footer {
    pub checksum: String,
}

/// Fresh identifier for a staging entity.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time in the RFC 3339 form stored in headers.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Check the id and timestamp of a header.
pub(crate) fn check_header(kind: &str, id: &str, timestamp: &str) -> Result<()> {
    Uuid::parse_str(id).map_err(|e| Error::InvalidReport {
        reason: format!("{} id {:?} is not a UUID: {}", kind, id, e),
    })?;
    DateTime::parse_from_rfc3339(timestamp).map_err(|e| Error::InvalidReport {
        reason: format!("{} {} timestamp {:?} is not RFC 3339: {}", kind, id, timestamp, e),
    })?;
    Ok(())
}

/// Compare a stored checksum with a freshly computed one.
pub(crate) fn verify_checksum(kind: &'static str, id: &str, stored: &str, computed: String) -> Result<()> {
    if stored != computed {
        log_event!(
            error,
            LogContext::component("staging").with("kind", kind).with("id", id),
            "CHECKSUM_MISMATCH",
            stored = stored,
            computed = computed
        );
        return Err(Error::ChecksumMismatch {
            kind,
            id: id.to_string(),
            stored: stored.to_string(),
            computed,
        });
    }
    Ok(())
}
