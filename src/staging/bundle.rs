//! Telemetry bundles: a set of data items from one client.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::validation::checksum::checksum_of;

use super::{check_header, new_id, now_timestamp, verify_checksum, Footer, TelemetryDataItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleHeader {
    pub id: String,
    pub timestamp: String,
    pub client_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub annotations: Vec<String>,
}

impl BundleHeader {
    pub fn new(client_id: &str, customer_id: &str, annotations: Vec<String>) -> Self {
        Self {
            id: new_id(),
            timestamp: now_timestamp(),
            client_id: client_id.to_string(),
            customer_id: customer_id.to_string(),
            annotations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBundle {
    pub header: BundleHeader,
    pub body: Vec<TelemetryDataItem>,
    pub footer: Footer,
}

impl TelemetryBundle {
    pub fn assemble(header: BundleHeader, body: Vec<TelemetryDataItem>) -> Result<Self> {
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
            "bundle",
            &self.header.id,
            &self.footer.checksum,
            self.compute_checksum()?,
        )
    }

    /// Check this bundle and every item inside it.
    pub fn validate(&self) -> Result<()> {
        check_header("bundle", &self.header.id, &self.header.timestamp)?;
        for item in &self.body {
            item.validate()?;
        }
        self.verify()
    }
}
