//! Directory-of-files key/value store.
//!
//! Each key is one file named `<key>.kv` under the root directory.
//! Reading a missing key is an I/O error.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::KeyValueStore;

const SUFFIX: &str = ".kv";

#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if root.as_os_str().is_empty() {
            return Err(Error::InvalidPath {
                path: String::new(),
                reason: "file store needs a root directory".to_string(),
            });
        }
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(Error::InvalidPath {
                path: key.to_string(),
                reason: "keys must be plain file names".to_string(),
            });
        }
        Ok(self.root.join(format!("{}{}", key, SUFFIX)))
    }
}

impl KeyValueStore for FileStore {
    fn add(&self, key: &str, value: &[u8]) -> Result<()> {
        fs::write(self.key_path(key)?, value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.key_path(key)?)?)
    }

    fn delete(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.key_path(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(key) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix(SUFFIX))
            {
                keys.push(key.to_string());
            }
        }
        Ok(keys)
    }

    fn driver(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(store.get("absent"), Err(Error::Io(_))));
    }

    #[test]
    fn test_foreign_files_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        store.add("r1", b"{}").unwrap();

        assert_eq!(store.list().unwrap(), vec!["r1"]);
    }

    #[test]
    fn test_path_like_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(store.add("../escape", b"x").is_err());
        assert!(store.add("", b"x").is_err());
    }
}
