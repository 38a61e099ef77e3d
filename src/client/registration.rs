//! Client registration record.

use std::fs;

use crate::config::Config;
use crate::error::Result;
use crate::files::ManagedFile;
use crate::log_event;
use crate::logging::structured::LogContext;
use crate::staging::{new_id, now_timestamp};
use crate::validation::checksum::compute_hash;

use super::record::{read_record, state_file, write_record, RecordState};
use super::wire::{ClientRegistration, RegHash};

pub const REGISTRATION_FILE: &str = "registration.json";

const SYSTEM_UUID_PATH: &str = "/sys/class/dmi/id/product_uuid";

/// Owns the persisted registration and its in-memory copy.
#[derive(Debug)]
pub struct RegistrationManager {
    file: ManagedFile,
    registration: ClientRegistration,
    state: RecordState,
}

impl RegistrationManager {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            file: state_file(config, REGISTRATION_FILE)?,
            registration: ClientRegistration::default(),
            state: RecordState::Unloaded,
        })
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_valid(&self) -> bool {
        self.state == RecordState::Valid
    }

    pub fn registration(&self) -> &ClientRegistration {
        &self.registration
    }

    pub fn file(&self) -> &ManagedFile {
        &self.file
    }

    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    pub fn load(&mut self) -> Result<()> {
        match read_record(&mut self.file) {
            Ok(registration) => {
                self.registration = registration;
                self.state = RecordState::Valid;
                Ok(())
            }
            Err(e) => {
                self.state = RecordState::Invalid;
                Err(e)
            }
        }
    }

    /// Build a fresh registration.
    ///
    /// The client id comes from the configuration; when it has none a new
    /// one is created and written back to the configuration.
    pub fn generate(&mut self, config: &mut Config) -> Result<()> {
        let client_id = match &config.client_id {
            Some(id) => id.clone(),
            None => {
                let id = new_id();
                config.client_id = Some(id.clone());
                config.save()?;
                log_event!(info, LogContext::client(&id), "CLIENT_ID_GENERATED");
                id
            }
        };

        self.registration = ClientRegistration {
            client_id,
            system_uuid: system_uuid(),
            timestamp: now_timestamp(),
        };
        self.state = RecordState::Valid;
        Ok(())
    }

    pub fn save(&mut self) -> Result<()> {
        write_record(&mut self.file, self.state, "registration", &self.registration)
    }

    /// Invalidate the registration and delete its file.
    pub fn remove(&mut self) -> Result<()> {
        self.state = RecordState::Invalid;
        self.registration = ClientRegistration::default();
        self.file.delete()
    }

    /// Hash the collector uses to recognise this registration.
    pub fn hash(&self) -> Result<RegHash> {
        let encoded = serde_json::to_vec(&self.registration)?;
        Ok(RegHash {
            method: "sha256".to_string(),
            value: compute_hash(&encoded),
        })
    }
}

/// Hardware UUID of this machine, or empty when it cannot be read.
pub fn system_uuid() -> String {
    fs::read_to_string(SYSTEM_UUID_PATH)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
