//! Telemetry reports: the unit submitted to the collector.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation::checksum::checksum_of;

use super::{check_header, new_id, now_timestamp, verify_checksum, Footer, TelemetryBundle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHeader {
    pub id: String,
    pub timestamp: String,
    pub client_id: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl ReportHeader {
    pub fn new(client_id: &str, annotations: Vec<String>) -> Self {
        Self {
            id: new_id(),
            timestamp: now_timestamp(),
            client_id: client_id.to_string(),
            annotations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub header: ReportHeader,
    pub body: Vec<TelemetryBundle>,
    pub footer: Footer,
}

impl TelemetryReport {
    pub fn assemble(header: ReportHeader, body: Vec<TelemetryBundle>) -> Result<Self> {
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

    pub fn verify(&self) -> Result<()> {
        verify_checksum(
            "report",
            &self.header.id,
            &self.footer.checksum,
            self.compute_checksum()?,
        )
    }

    /// Full structural and integrity check, run before submission.
    pub fn validate(&self) -> Result<()> {
        check_header("report", &self.header.id, &self.header.timestamp)?;
        for bundle in &self.body {
            bundle.validate()?;
        }
        self.verify()
    }

    /// Number of data items across all bundles.
    pub fn item_count(&self) -> usize {
        self.body.iter().map(|b| b.body.len()).sum()
    }
}
