//! Item payload validation.
//!
//! A payload is accepted only if it is a JSON object carrying a `version`
//! field and its encoded size falls inside the configured limits. Nothing
//! is written to storage for a rejected payload.

use serde_json::{Map, Value};

use crate::config::ItemLimits;
use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;

/// Field every telemetry payload must carry.
pub const VERSION_FIELD: &str = "version";

/// Validate a raw payload and return its parsed JSON object.
pub fn validate_payload(blob: &[u8], limits: &ItemLimits) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(blob).map_err(|e| Error::InvalidPayload {
        reason: format!("not valid JSON: {}", e),
    })?;

    let object = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(Error::InvalidPayload {
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            })
        }
    };

    if !object.contains_key(VERSION_FIELD) {
        return Err(Error::InvalidPayload {
            reason: format!("missing required field {:?}", VERSION_FIELD),
        });
    }

    check_size(blob.len(), limits)?;

    Ok(object)
}

/// Check a payload size against the configured limits.
pub fn check_size(size: usize, limits: &ItemLimits) -> Result<()> {
    if size < limits.min_item_size || size > limits.max_item_size {
        log_event!(
            warn,
            LogContext::component("validation"),
            "SIZE_LIMIT_EXCEEDED",
            size = size,
            min = limits.min_item_size,
            max = limits.max_item_size
        );
        return Err(Error::PayloadSize {
            size,
            min: limits.min_item_size,
            max: limits.max_item_size,
        });
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
