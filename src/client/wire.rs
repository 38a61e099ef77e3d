//! Collector request and response bodies.

use serde::{Deserialize, Serialize};

use crate::staging::TelemetryReport;

/// Identity a client registers with. Also the persisted registration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    pub client_id: String,
    #[serde(rename = "systemUUID")]
    pub system_uuid: String,
    pub timestamp: String,
}

/// `POST /register`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub client_registration: ClientRegistration,
}

/// Credentials issued by `/register` and `/authenticate`. Also the
/// persisted credentials file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentials {
    pub registration_id: i64,
    pub auth_token: String,
    pub registration_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegHash {
    pub method: String,
    pub value: String,
}

/// `POST /authenticate`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub registration_id: i64,
    pub reg_hash: RegHash,
}

/// `POST /report`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportRequest<'a> {
    pub telemetry_report: &'a TelemetryReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportResponse {
    pub processing_id: i64,
    pub processed_at: String,
}
