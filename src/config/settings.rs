//! Configuration model and YAML persistence.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;

/// Default location of persisted client state when no config file is known.
pub const DEFAULT_STATE_DIR: &str = "/etc/telemetry-agent";

/// Smallest accepted item payload, in bytes.
pub const DEFAULT_MIN_ITEM_SIZE: usize = 10;

/// Largest accepted item payload, in bytes (5 MiB).
pub const DEFAULT_MAX_ITEM_SIZE: usize = 5 * 1024 * 1024;

pub const DEFAULT_SUBMIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Datastore selection for one staging stage.
///
/// `driver` is one of `file`, `memory` or `sqlite3`. For `file` the params
/// name the root directory, for `sqlite3` the database path (or `:memory:`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    pub driver: String,
    #[serde(default)]
    pub params: String,
}

impl DataStoreConfig {
    pub fn new(driver: &str, params: &str) -> Self {
        Self {
            driver: driver.to_string(),
            params: params.to_string(),
        }
    }

    pub fn memory() -> Self {
        Self::new("memory", "")
    }

    pub fn sqlite_in_memory() -> Self {
        Self::new("sqlite3", ":memory:")
    }
}

/// Per-stage stores used when unpacking received reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub items: DataStoreConfig,
    pub bundles: DataStoreConfig,
    pub reports: DataStoreConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            items: DataStoreConfig::memory(),
            bundles: DataStoreConfig::memory(),
            reports: DataStoreConfig::memory(),
        }
    }
}

/// Ownership applied to persisted client state files when first created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileOwner {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
}

/// Telemetry class and type gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPolicy {
    #[serde(default = "default_true")]
    pub opt_out: bool,
    #[serde(default)]
    pub opt_in: bool,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub deny: Vec<String>,
}

impl Default for ClassPolicy {
    fn default() -> Self {
        Self {
            opt_out: true,
            opt_in: false,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }
}

/// Accepted payload size range for staged items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemLimits {
    #[serde(default = "default_min_item_size")]
    pub min_item_size: usize,
    #[serde(default = "default_max_item_size")]
    pub max_item_size: usize,
}

impl Default for ItemLimits {
    fn default() -> Self {
        Self {
            min_item_size: DEFAULT_MIN_ITEM_SIZE,
            max_item_size: DEFAULT_MAX_ITEM_SIZE,
        }
    }
}

/// Report submission retry and timeout settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_SUBMIT_ATTEMPTS,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Telemetry client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_customer_id")]
    pub customer_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub file_owner: FileOwner,
    #[serde(default = "default_true")]
    pub backups: bool,
    #[serde(default = "default_staging")]
    pub staging: DataStoreConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub classes: ClassPolicy,
    #[serde(default)]
    pub limits: ItemLimits,
    #[serde(default)]
    pub submission: SubmissionConfig,

    /// File this configuration was loaded from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Config {
    /// Configuration with defaults for everything except the collector URL.
    pub fn new(url: &str) -> Self {
        Self {
            enabled: true,
            url: url.to_string(),
            client_id: None,
            customer_id: default_customer_id(),
            tags: Vec::new(),
            state_dir: None,
            file_owner: FileOwner::default(),
            backups: true,
            staging: default_staging(),
            extraction: ExtractionConfig::default(),
            classes: ClassPolicy::default(),
            limits: ItemLimits::default(),
            submission: SubmissionConfig::default(),
            source: None,
        }
    }

    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&data)?;
        config.source = Some(path.to_path_buf());
        config.validate()?;

        log_event!(
            info,
            LogContext::component("config").with("path", path.display()),
            "CONFIG_LOADED",
            url = config.url,
            staging_driver = config.staging.driver
        );

        Ok(config)
    }

    /// Write the configuration back to the file it was loaded from.
    ///
    /// The new content is written to a temporary file in the same
    /// directory, synced, then renamed over the original, so readers see
    /// either the old or the new file. The original mode is kept.
    /// No-op for configurations built in code.
    pub fn save(&self) -> Result<()> {
        let path = match &self.source {
            Some(path) => path,
            None => return Ok(()),
        };

        let data = serde_yaml::to_string(self)?;
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        if let Ok(meta) = fs::metadata(path) {
            staged.as_file().set_permissions(meta.permissions())?;
        }
        staged.write_all(data.as_bytes())?;
        staged.as_file().sync_all()?;
        staged.persist(path).map_err(|e| Error::Io(e.error))?;

        log_event!(
            debug,
            LogContext::component("config").with("path", path.display()),
            "CONFIG_SAVED"
        );
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("url must not be empty".to_string()));
        }
        if self.limits.min_item_size > self.limits.max_item_size {
            return Err(Error::Config(format!(
                "min_item_size {} exceeds max_item_size {}",
                self.limits.min_item_size, self.limits.max_item_size
            )));
        }
        if self.submission.attempts == 0 {
            return Err(Error::Config(
                "submission.attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Directory holding the registration and credentials files.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(dir) = &self.state_dir {
            return dir.clone();
        }
        self.source
            .as_ref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
    }

    /// Collector endpoint URL for the given path, e.g. `register`.
    pub fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), name)
    }
}

fn default_true() -> bool {
    true
}

fn default_customer_id() -> String {
    "0".to_string()
}

fn default_staging() -> DataStoreConfig {
    DataStoreConfig::new("sqlite3", "/var/lib/telemetry-agent/staging.db")
}

fn default_min_item_size() -> usize {
    DEFAULT_MIN_ITEM_SIZE
}

fn default_max_item_size() -> usize {
    DEFAULT_MAX_ITEM_SIZE
}

fn default_attempts() -> u32 {
    DEFAULT_SUBMIT_ATTEMPTS
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
