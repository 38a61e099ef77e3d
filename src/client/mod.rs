//! Client module.
//!
//! Registration and credential records, the collector protocol and the
//! `TelemetryClient` facade over them.

pub mod credentials;
pub mod protocol;
pub mod record;
pub mod registration;
pub mod retry;
pub mod telemetry_client;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use credentials::CredentialsManager;
pub use protocol::RemediationBudget;
pub use record::RecordState;
pub use registration::RegistrationManager;
pub use retry::RetryPolicy;
pub use telemetry_client::{GenerateOutcome, TelemetryClient};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, UreqTransport};
pub use wire::*;
