//! Shared plumbing for persisted client state files.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::files::{ManagedFile, ManagedFileConfig};

/// Lifecycle of an in-memory copy of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordState {
    /// Nothing loaded or generated yet.
    #[default]
    Unloaded,
    /// Content loaded, generated or received and usable.
    Valid,
    /// Removed, or the backing file could not be read.
    Invalid,
}

/// Managed file for a state record named `name` under the configured state
/// directory.
pub(crate) fn state_file(config: &Config, name: &str) -> Result<ManagedFile> {
    ManagedFile::new(
        ManagedFileConfig::new(config.state_dir().join(name))
            .with_owner(config.file_owner.user.clone(), config.file_owner.group.clone())
            .with_backup(config.backups),
    )
}

pub(crate) fn read_record<T: DeserializeOwned>(file: &mut ManagedFile) -> Result<T> {
    let data = file.read()?;
    Ok(serde_json::from_slice(&data)?)
}

/// Back up the current file, if any, then replace it with `record`.
pub(crate) fn write_record<T: Serialize>(
    file: &mut ManagedFile,
    state: RecordState,
    kind: &str,
    record: &T,
) -> Result<()> {
    if state != RecordState::Valid {
        return Err(Error::InvalidState(format!(
            "cannot save {} in state {:?}",
            kind, state
        )));
    }
    if file.exists() {
        file.backup()?;
    }
    file.update(&serde_json::to_vec_pretty(record)?)
}
