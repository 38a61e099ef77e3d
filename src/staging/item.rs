//! Telemetry data items.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::validation::checksum::checksum_of;
use crate::validation::tags::{Tag, TelemetryType};

use super::{check_header, new_id, now_timestamp, verify_checksum, Footer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataItemHeader {
    pub id: String,
    #[serde(rename = "type")]
    pub telemetry_type: String,
    pub timestamp: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

/// A single application-generated telemetry payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryDataItem {
    pub header: DataItemHeader,
    pub body: Map<String, Value>,
    pub footer: Footer,
}

impl TelemetryDataItem {
    /// Build a new item with a fresh id and timestamp.
    pub fn new(telemetry_type: &TelemetryType, body: Map<String, Value>, tags: &[Tag]) -> Result<Self> {
        let header = DataItemHeader {
            id: new_id(),
            telemetry_type: telemetry_type.to_string(),
            timestamp: now_timestamp(),
            annotations: tags.iter().map(|t| t.to_string()).collect(),
        };
        Self::assemble(header, body)
    }

    /// Build an item from stored parts, computing its checksum.
    pub fn assemble(header: DataItemHeader, body: Map<String, Value>) -> Result<Self> {
        let checksum = checksum_of(&header, &body)?;
        Ok(Self {
            header,
            body,
            footer: Footer { checksum },
        })
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn compute_checksum(&self) -> Result<String> {
        checksum_of(&self.header, &self.body)
    }

    /// Fail if the footer does not match the header and body.
    pub fn verify(&self) -> Result<()> {
        verify_checksum(
            "item",
            &self.header.id,
            &self.footer.checksum,
            self.compute_checksum()?,
        )
    }

    /// Structural and integrity checks.
    pub fn validate(&self) -> Result<()> {
        check_header("item", &self.header.id, &self.header.timestamp)?;
        TelemetryType::parse(&self.header.telemetry_type)?;
        self.verify()
    }
}
