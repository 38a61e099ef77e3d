//! Error types for the telemetry agent core.
//!
//! One enum for the whole crate. Variants are grouped by how callers are
//! expected to react: payload rejections, integrity failures, protocol
//! remediation signals, terminal protocol failures and persistence errors.

use thiserror::Error;

/// Result type alias for telemetry agent operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry agent error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Payload validation
    // =========================================================================
    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Payload size {size} bytes outside allowed range [{min}, {max}]")]
    PayloadSize { size: usize, min: usize, max: usize },

    #[error("Invalid tag {tag:?}: {reason}")]
    InvalidTag { tag: String, reason: String },

    #[error("Invalid telemetry type {telemetry_type:?}: {reason}")]
    InvalidTelemetryType {
        telemetry_type: String,
        reason: String,
    },

    // =========================================================================
    // Integrity
    // =========================================================================
    #[error("Checksum mismatch for {kind} {id}: stored={stored} computed={computed}")]
    ChecksumMismatch {
        kind: &'static str,
        id: String,
        stored: String,
        computed: String,
    },

    #[error("Stored payload for item {id} could not be decompressed: {reason}")]
    Decompression { id: String, reason: String },

    #[error("Invalid report: {reason}")]
    InvalidReport { reason: String },

    // =========================================================================
    // Protocol remediation signals
    // =========================================================================
    #[error("Client registration required")]
    RegistrationRequired,

    #[error("Client authentication required")]
    AuthenticationRequired,

    // =========================================================================
    // Terminal protocol failures
    // =========================================================================
    #[error("Request to {endpoint} failed with status {status}: {body}")]
    Protocol {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Report submission failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    // =========================================================================
    // Contract violations
    // =========================================================================
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Client is not registered; authentication requires prior registration")]
    NotRegistered,

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Invalid permissions {perm:#o}: at least one access bit is required")]
    InvalidPermissions { perm: u32 },

    #[error("Cannot apply ownership {owner}: {reason}")]
    Ownership { owner: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported datastore driver: {0}")]
    UnsupportedDriver(String),

    // =========================================================================
    // Persistence
    // =========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// True for the signals that drive one-shot remediation during submission.
    pub fn is_remediation_signal(&self) -> bool {
        matches!(
            self,
            Error::RegistrationRequired | Error::AuthenticationRequired
        )
    }
}
