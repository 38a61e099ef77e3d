//! In-memory key/value store.
//!
//! Reading a missing key yields an empty value, not an error.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::Result;

use super::KeyValueStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn add(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        Ok(self.data.lock().get(key).cloned().unwrap_or_default())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.data.lock().keys().cloned().collect())
    }

    fn driver(&self) -> &'static str {
        "memory"
    }
}
