//! Telemetry client facade.
//!
//! Ties the policy gate, the processor and the collector protocol together:
//! 1. `generate` stages a payload if policy allows it
//! 2. `create_bundle` / `create_report` roll staged data up
//! 3. `submit` registers if needed and delivers every staged report

use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::log_event;
use crate::logging::structured::LogContext;
use crate::policy::{evaluate, PolicyDecision};
use crate::processor::Processor;
use crate::staging::{TelemetryBundle, TelemetryReport};
use crate::storage::OwnerFilter;
use crate::validation::tags::{parse_tags, Tag, TelemetryClass, TelemetryType};

use super::credentials::CredentialsManager;
use super::registration::RegistrationManager;
use super::transport::{HttpTransport, UreqTransport};
use super::wire::SubmitReportResponse;

/// Result of offering a payload to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerateOutcome {
    /// Staged under this item id.
    Staged(String),
    /// Refused by policy, with the reason.
    Skipped(String),
}

/// A telemetry client bound to one configuration and collector.
pub struct TelemetryClient<T: HttpTransport = UreqTransport> {
    pub(super) config: Config,
    pub(super) transport: T,
    pub(super) processor: Processor,
    pub(super) registration: RegistrationManager,
    pub(super) credentials: CredentialsManager,
}

impl TelemetryClient<UreqTransport> {
    pub fn new(config: Config) -> Result<Self> {
        let transport = UreqTransport::new(Duration::from_secs(config.submission.timeout_secs));
        Self::with_transport(config, transport)
    }
}

impl<T: HttpTransport> TelemetryClient<T> {
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        config.validate()?;

        let processor = Processor::open(&config.staging, config.limits)?;
        let registration = RegistrationManager::new(&config)?;
        let credentials = CredentialsManager::new(&config)?;

        let mut client = Self {
            config,
            transport,
            processor,
            registration,
            credentials,
        };
        client.load_state();

        log_event!(
            info,
            client.log_ctx(),
            "CLIENT_READY",
            url = client.config.url,
            registered = client.credentials.is_valid()
        );
        Ok(client)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut Processor {
        &mut self.processor
    }

    pub fn registration(&self) -> &RegistrationManager {
        &self.registration
    }

    pub fn credentials(&self) -> &CredentialsManager {
        &self.credentials
    }

    /// Stage a payload unless policy refuses its type.
    pub fn generate(
        &mut self,
        telemetry_type: &TelemetryType,
        class: TelemetryClass,
        blob: &[u8],
        tags: &[Tag],
    ) -> Result<GenerateOutcome> {
        match evaluate(&self.config, telemetry_type, class) {
            PolicyDecision::Allowed => {
                let id = self.processor.add_data(telemetry_type, blob, tags)?;
                Ok(GenerateOutcome::Staged(id))
            }
            PolicyDecision::Denied(reason) => Ok(GenerateOutcome::Skipped(reason)),
        }
    }

    /// Bundle every unassigned item, annotated with the configured tags.
    pub fn create_bundle(&mut self, tags: &[Tag]) -> Result<TelemetryBundle> {
        self.ensure_registration()?;
        let tags = self.annotations(tags)?;
        let client_id = self.registration.registration().client_id.clone();
        self.processor
            .generate_bundle(&client_id, &self.config.customer_id, &tags)
    }

    /// Roll every unassigned bundle into a report.
    pub fn create_report(&mut self, tags: &[Tag]) -> Result<TelemetryReport> {
        self.ensure_registration()?;
        let tags = self.annotations(tags)?;
        let client_id = self.registration.registration().client_id.clone();
        self.processor.generate_report(&client_id, &tags)
    }

    /// Deliver everything staged.
    ///
    /// Pending items and bundles are rolled up first. Reports are submitted
    /// oldest first and deleted once acknowledged; a failure stops the run
    /// and leaves the remaining reports staged.
    pub fn submit(&mut self) -> Result<Vec<SubmitReportResponse>> {
        if !self.config.enabled {
            log_event!(info, self.log_ctx(), "SUBMIT_SKIPPED", reason = "telemetry disabled");
            return Ok(Vec::new());
        }

        self.register()?;

        if self.processor.item_count(&OwnerFilter::Unassigned)? > 0 {
            self.create_bundle(&[])?;
        }
        if self.processor.bundle_count(&OwnerFilter::Unassigned)? > 0 {
            self.create_report(&[])?;
        }

        let mut responses = Vec::new();
        for report in self.processor.reports()? {
            let response = self.submit_report(&report)?;
            self.processor.delete_report(report.id())?;
            responses.push(response);
        }

        log_event!(info, self.log_ctx(), "SUBMIT_COMPLETE", reports = responses.len());
        Ok(responses)
    }

    pub(super) fn log_ctx(&self) -> LogContext {
        LogContext::client(self.config.client_id.as_deref().unwrap_or("unregistered"))
    }

    /// Make sure a registration is loaded, generating and saving one if
    /// none is persisted.
    pub(super) fn ensure_registration(&mut self) -> Result<()> {
        if self.registration.is_valid() {
            return Ok(());
        }
        if self.registration.exists() {
            match self.registration.load() {
                Ok(()) => return Ok(()),
                Err(e) => log_event!(warn, self.log_ctx(), "REGISTRATION_UNREADABLE", error = e),
            }
        }
        self.registration.generate(&mut self.config)?;
        self.registration.save()
    }

    fn load_state(&mut self) {
        if self.registration.exists() {
            if let Err(e) = self.registration.load() {
                log_event!(warn, self.log_ctx(), "REGISTRATION_UNREADABLE", error = e);
            }
        }
        if self.credentials.exists() {
            if let Err(e) = self.credentials.load() {
                log_event!(warn, self.log_ctx(), "CREDENTIALS_UNREADABLE", error = e);
            }
        }
    }

    fn annotations(&self, extra: &[Tag]) -> Result<Vec<Tag>> {
        let mut tags = parse_tags(self.config.tags.as_slice())?;
        tags.extend(extra.iter().cloned());
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::{test_config, ScriptedTransport};
    use crate::config::DataStoreConfig;
    use crate::error::Error;

    fn ty() -> TelemetryType {
        TelemetryType::parse("SLE-SERVER-Test").unwrap()
    }

    #[test]
    fn test_generate_respects_policy() {
        let dir = tempfile::tempdir().unwrap();
        let mut client =
            TelemetryClient::with_transport(test_config(dir.path()), ScriptedTransport::new(vec![]))
                .unwrap();

        let staged = client
            .generate(&ty(), TelemetryClass::Mandatory, br#"{"version": 1}"#, &[])
            .unwrap();
        assert!(matches!(staged, GenerateOutcome::Staged(_)));

        let skipped = client
            .generate(&ty(), TelemetryClass::OptIn, br#"{"version": 1}"#, &[])
            .unwrap();
        assert!(matches!(skipped, GenerateOutcome::Skipped(_)));

        assert_eq!(
            client.processor().item_count(&OwnerFilter::All).unwrap(),
            1
        );
    }

    #[test]
    fn test_create_bundle_uses_registration_and_config_tags() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.tags = vec!["env=test".to_string()];
        let mut client =
            TelemetryClient::with_transport(config, ScriptedTransport::new(vec![])).unwrap();

        client
            .generate(&ty(), TelemetryClass::Mandatory, br#"{"version": 1}"#, &[])
            .unwrap();
        let bundle = client
            .create_bundle(&[Tag::parse("batch=1").unwrap()])
            .unwrap();

        assert_eq!(bundle.header.annotations, vec!["env=test", "batch=1"]);
        assert_eq!(
            Some(bundle.header.client_id.clone()),
            client.config().client_id
        );
        assert!(client.registration().exists());
        assert!(client.transport().requests().is_empty());
    }

    #[test]
    fn test_invalid_config_tag_fails_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.tags = vec!["x".to_string()];
        let mut client =
            TelemetryClient::with_transport(config, ScriptedTransport::new(vec![])).unwrap();
        assert!(matches!(
            client.create_bundle(&[]),
            Err(Error::InvalidTag { .. })
        ));
    }

    #[test]
    fn test_unsupported_staging_driver() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.staging = DataStoreConfig::memory();
        assert!(matches!(
            TelemetryClient::with_transport(config, ScriptedTransport::new(vec![])),
            Err(Error::UnsupportedDriver(_))
        ));
    }

    #[test]
    fn test_disabled_client_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.enabled = false;
        let mut client =
            TelemetryClient::with_transport(config, ScriptedTransport::new(vec![])).unwrap();
        assert!(client.submit().unwrap().is_empty());
        assert!(client.transport().requests().is_empty());
    }
}
