//! Key/value staging stores.
//!
//! One contract, three backends: a directory of files, an in-memory map and
//! a single SQLite table. The backend for each staging stage is chosen by
//! configuration.

pub mod database;
pub mod file;
pub mod memory;

pub use database::DatabaseStore;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::config::DataStoreConfig;
use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;

/// Four-operation key/value contract.
///
/// `list` makes no ordering guarantee.
pub trait KeyValueStore {
    /// Store `value` under `key`, replacing any previous value.
    fn add(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Fetch the value for `key`.
    ///
    /// Behaviour for a missing key is backend-specific; use `list` to test
    /// for presence.
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    fn delete(&self, key: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<String>>;

    /// Backend name, for logging.
    fn driver(&self) -> &'static str;
}

/// Open the backend named by `config.driver`.
pub fn open_store(config: &DataStoreConfig) -> Result<Box<dyn KeyValueStore>> {
    let store: Box<dyn KeyValueStore> = match config.driver.as_str() {
        "file" => Box::new(FileStore::open(&config.params)?),
        "memory" => Box::new(MemoryStore::new()),
        "sqlite3" => Box::new(DatabaseStore::open(&config.params)?),
        other => return Err(Error::UnsupportedDriver(other.to_string())),
    };

    log_event!(
        debug,
        LogContext::component("kvstore").with("driver", store.driver()),
        "KVSTORE_OPENED",
        params = config.params
    );
    Ok(store)
}
