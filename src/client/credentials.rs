//! Client credentials record.
//!
//! When the auth token is a JWT its `exp` claim is decoded so an expired
//! token can be refreshed before it is rejected by the collector. Other
//! tokens never expire locally.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::error::Result;
use crate::files::ManagedFile;

use super::record::{read_record, state_file, write_record, RecordState};
use super::wire::ClientCredentials;

pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Owns the persisted credentials and their in-memory copy.
#[derive(Debug)]
pub struct CredentialsManager {
    file: ManagedFile,
    credentials: ClientCredentials,
    expires_at: Option<DateTime<Utc>>,
    state: RecordState,
}

impl CredentialsManager {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            file: state_file(config, CREDENTIALS_FILE)?,
            credentials: ClientCredentials::default(),
            expires_at: None,
            state: RecordState::Unloaded,
        })
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == RecordState::Valid
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn file(&self) -> &ManagedFile {
        &self.file
    }

    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    pub fn load(&mut self) -> Result<()> {
        match read_record::<ClientCredentials>(&mut self.file) {
            Ok(credentials) => {
                self.set(credentials);
                Ok(())
            }
            Err(e) => {
                self.state = RecordState::Invalid;
                Err(e)
            }
        }
    }

    /// Adopt credentials received from the collector.
    pub fn set(&mut self, credentials: ClientCredentials) {
        self.expires_at = token_expiry(&credentials.auth_token);
        self.credentials = credentials;
        self.state = RecordState::Valid;
    }

    pub fn save(&mut self) -> Result<()> {
        write_record(&mut self.file, self.state, "credentials", &self.credentials)
    }

    /// Invalidate the credentials and delete their file.
    pub fn remove(&mut self) -> Result<()> {
        self.state = RecordState::Invalid;
        self.credentials = ClientCredentials::default();
        self.expires_at = None;
        self.file.delete()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now)
    }
}

/// Expiry encoded in a JWT's `exp` claim, if the token is a JWT that has one.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, claims, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let decoded = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}
