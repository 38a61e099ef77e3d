//! Collector protocol: registration, authentication and report submission.
//!
//! A `409` on `/register` or a `401` on `/authenticate` triggers one
//! remediation pass: discard the stale record and register again. The
//! [`RemediationBudget`] passed down the call chain makes that pass happen
//! at most once per top-level call.

use crate::error::{Error, Result};
use crate::log_event;
use crate::staging::TelemetryReport;

use super::retry::RetryPolicy;
use super::telemetry_client::TelemetryClient;
use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use super::wire::{
    AuthenticateRequest, ClientCredentials, RegisterRequest, SubmitReportRequest,
    SubmitReportResponse,
};

pub const REGISTER_ENDPOINT: &str = "register";
pub const AUTHENTICATE_ENDPOINT: &str = "authenticate";
pub const REPORT_ENDPOINT: &str = "report";

pub const REGISTRATION_ID_HEADER: &str = "X-Telemetry-Registration-Id";

/// Whether a remediation pass is still allowed for the current call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemediationBudget {
    retries: bool,
}

impl RemediationBudget {
    pub fn new() -> Self {
        Self { retries: true }
    }

    /// A budget with remediation already spent.
    pub fn exhausted() -> Self {
        Self { retries: false }
    }

    pub fn retries_enabled(&self) -> bool {
        self.retries
    }

    pub fn disable_retries(&mut self) {
        self.retries = false;
    }
}

impl Default for RemediationBudget {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HttpTransport> TelemetryClient<T> {
    /// Register with the collector unless valid credentials are held.
    pub fn register(&mut self) -> Result<()> {
        self.register_with(RemediationBudget::new())
    }

    pub fn register_with(&mut self, mut budget: RemediationBudget) -> Result<()> {
        if self.credentials.is_valid() {
            log_event!(debug, self.log_ctx(), "REGISTER_SKIPPED", reason = "credentials held");
            return Ok(());
        }
        self.ensure_registration()?;

        let request = HttpRequest::post_json(
            self.config.endpoint(REGISTER_ENDPOINT),
            &RegisterRequest {
                client_registration: self.registration.registration().clone(),
            },
        )?;
        let response = self.transport.send(request)?;
        let ctx = self.log_ctx();

        match response.status {
            200 => {
                let credentials: ClientCredentials = response.json()?;
                log_event!(
                    info,
                    ctx,
                    "CLIENT_REGISTERED",
                    registration_id = credentials.registration_id
                );
                self.credentials.set(credentials);
                self.credentials.save()
            }
            409 if budget.retries_enabled() => {
                log_event!(warn, ctx, "REGISTER_CONFLICT", action = "new registration");
                self.registration.remove()?;
                self.config.client_id = None;
                budget.disable_retries();
                self.register_with(budget)
            }
            _ => Err(protocol_error(REGISTER_ENDPOINT, &response)),
        }
    }

    /// Refresh credentials for the current registration.
    pub fn authenticate(&mut self) -> Result<()> {
        self.authenticate_with(RemediationBudget::new())
    }

    pub fn authenticate_with(&mut self, mut budget: RemediationBudget) -> Result<()> {
        if !self.credentials.is_valid() {
            return Err(Error::NotRegistered);
        }
        self.ensure_registration()?;

        let request = HttpRequest::post_json(
            self.config.endpoint(AUTHENTICATE_ENDPOINT),
            &AuthenticateRequest {
                registration_id: self.credentials.credentials().registration_id,
                reg_hash: self.registration.hash()?,
            },
        )?;
        let response = self.transport.send(request)?;
        let ctx = self.log_ctx();

        match response.status {
            200 => {
                let credentials: ClientCredentials = response.json()?;
                log_event!(
                    info,
                    ctx,
                    "CLIENT_AUTHENTICATED",
                    registration_id = credentials.registration_id
                );
                self.credentials.set(credentials);
                self.credentials.save()
            }
            401 if budget.retries_enabled() => {
                log_event!(warn, ctx, "AUTHENTICATE_REJECTED", action = "re-register");
                self.credentials.remove()?;
                budget.disable_retries();
                self.register_with(budget)
            }
            _ => Err(protocol_error(AUTHENTICATE_ENDPOINT, &response)),
        }
    }

    /// Validate and submit a report, retrying with remediation.
    ///
    /// Between attempts a missing registration triggers `register` and a
    /// rejected token triggers `authenticate`. A failed remediation ends the
    /// submission at once.
    pub fn submit_report(&mut self, report: &TelemetryReport) -> Result<SubmitReportResponse> {
        report.validate()?;

        let policy = RetryPolicy::from(&self.config.submission);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let ctx = self.log_ctx().with_report(report.id());

            let err = match self.submit_report_once(report) {
                Ok(response) => {
                    log_event!(
                        info,
                        ctx,
                        "REPORT_SUBMITTED",
                        attempt = attempt,
                        processing_id = response.processing_id
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            log_event!(
                warn,
                ctx,
                "REPORT_SUBMIT_FAILED",
                attempt = attempt,
                max_attempts = policy.attempts,
                error = err
            );

            if attempt >= policy.attempts {
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            if err.is_remediation_signal() {
                log_event!(info, ctx, "REPORT_SUBMIT_REMEDIATING", signal = err);
                self.remediate(&err)?;
            }

            policy.pause_after(attempt);
        }
    }

    /// Restore whatever state a remediation signal says is missing.
    fn remediate(&mut self, signal: &Error) -> Result<()> {
        match signal {
            Error::RegistrationRequired => {
                self.credentials.remove()?;
                self.register()
            }
            Error::AuthenticationRequired => self.authenticate(),
            _ => Ok(()),
        }
    }

    /// One POST of a report, without retry or remediation.
    pub fn submit_report_once(&self, report: &TelemetryReport) -> Result<SubmitReportResponse> {
        if !self.credentials.is_valid() {
            return Err(Error::RegistrationRequired);
        }
        if self.credentials.is_expired() {
            return Err(Error::AuthenticationRequired);
        }

        let credentials = self.credentials.credentials();
        let request = HttpRequest::post_json(
            self.config.endpoint(REPORT_ENDPOINT),
            &SubmitReportRequest {
                telemetry_report: report,
            },
        )?
        .header("Authorization", format!("Bearer {}", credentials.auth_token))
        .header(REGISTRATION_ID_HEADER, credentials.registration_id.to_string());

        let response = self.transport.send(request)?;
        match response.status {
            200 => response.json(),
            401 => Err(Error::AuthenticationRequired),
            _ => Err(protocol_error(REPORT_ENDPOINT, &response)),
        }
    }
}

fn protocol_error(endpoint: &str, response: &HttpResponse) -> Error {
    Error::Protocol {
        endpoint: format!("/{}", endpoint),
        status: response.status,
        body: response.text(),
    }
}
