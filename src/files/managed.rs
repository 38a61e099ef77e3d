//! Crash-safe single-file persistence.
//!
//! A `ManagedFile` owns one path on disk with a fixed permission mode and
//! optional ownership. Reads and updates take an advisory exclusive lock
//! (flock semantics, via `fs2`) for the span of the call unless the caller
//! already holds it. Updates truncate, write and fsync before the lock is
//! released. Ownership is applied only when the file, or its backup, is
//! first created. A handle follows the path: if another handle or process
//! deletes or replaces the file, the next call reopens it.

use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use nix::unistd::{Gid, Group, Uid, User};

use crate::error::{Error, Result};
use crate::log_event;
use crate::logging::structured::LogContext;

/// Default mode for persisted client state.
pub const DEFAULT_PERM: u32 = 0o600;

/// Suffix of backup companions.
pub const BACKUP_SUFFIX: &str = ".bak";

const ACCESS_BITS: u32 = 0o777;

/// Lock attempts while the path keeps being replaced.
const LOCK_ATTEMPTS: u32 = 3;

/// Settings for a managed file.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedFileConfig {
    pub path: PathBuf,
    pub perm: u32,
    pub user: Option<String>,
    pub group: Option<String>,
    pub backup: bool,
}

impl ManagedFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            perm: DEFAULT_PERM,
            user: None,
            group: None,
            backup: true,
        }
    }

    pub fn with_owner(mut self, user: Option<String>, group: Option<String>) -> Self {
        self.user = user;
        self.group = group;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_perm(mut self, perm: u32) -> Self {
        self.perm = perm;
        self
    }
}

/// A single file with locking, backup and ownership control.
#[derive(Debug)]
pub struct ManagedFile {
    config: ManagedFileConfig,
    file: Option<File>,
    locked: bool,
}

impl ManagedFile {
    /// Validate the settings and build a handle. Nothing is opened yet.
    pub fn new(config: ManagedFileConfig) -> Result<Self> {
        check_path(&config.path)?;
        check_perm(config.perm)?;
        Ok(Self {
            config,
            file: None,
            locked: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn perm(&self) -> u32 {
        self.config.perm
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut raw = self.config.path.clone().into_os_string();
        raw.push(BACKUP_SUFFIX);
        PathBuf::from(raw)
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Point the handle at a different file, closing any open one.
    pub fn set_path(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        check_path(&path)?;
        self.close()?;
        self.config.path = path;
        Ok(())
    }

    pub fn set_perm(&mut self, perm: u32) -> Result<()> {
        check_perm(perm)?;
        self.config.perm = perm;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config.path.is_file()
    }

    /// True if the file exists and can be opened for reading and writing.
    pub fn accessible(&self) -> bool {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.path)
            .is_ok()
    }

    /// Open the file, creating it when `create` is set.
    ///
    /// Ownership and mode are applied only when the file did not exist. An
    /// unlocked handle whose path was removed or replaced is dropped and
    /// the path opened again. A locked handle is kept as is.
    pub fn open(&mut self, create: bool) -> Result<()> {
        if self.file.is_some() {
            if self.locked || !self.is_stale() {
                return Ok(());
            }
            log_event!(debug, self.log_ctx(), "MANAGED_FILE_REOPEN");
            self.file = None;
        }

        let existed = self.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .mode(self.config.perm)
            .open(&self.config.path)?;

        if !existed {
            // umask may have stripped bits from the requested mode
            file.set_permissions(Permissions::from_mode(self.config.perm))?;
            apply_ownership(&self.config.path, &self.config)?;
            log_event!(
                debug,
                self.log_ctx(),
                "MANAGED_FILE_CREATED",
                perm = format!("{:o}", self.config.perm)
            );
        }

        self.file = Some(file);
        Ok(())
    }

    /// Open-or-create.
    pub fn create(&mut self) -> Result<()> {
        self.open(true)
    }

    /// Take the advisory exclusive lock, blocking until it is available.
    pub fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Ok(());
        }
        let file = self.handle()?;
        file.lock_exclusive()?;
        self.locked = true;
        Ok(())
    }

    pub fn unlock(&mut self) -> Result<()> {
        if !self.locked {
            return Ok(());
        }
        let file = self.handle()?;
        file.unlock()?;
        self.locked = false;
        Ok(())
    }

    /// Read the whole file. The file must already exist.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        self.with_lock(false, |file| {
            let mut data = Vec::new();
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut data)?;
            Ok(data)
        })
    }

    /// Replace the file content, creating the file if needed.
    pub fn update(&mut self, data: &[u8]) -> Result<()> {
        self.with_lock(true, |file| {
            file.seek(SeekFrom::Start(0))?;
            file.set_len(0)?;
            file.write_all(data)?;
            file.sync_all()?;
            Ok(())
        })?;
        log_event!(debug, self.log_ctx(), "MANAGED_FILE_UPDATED", bytes = data.len());
        Ok(())
    }

    /// Copy the current content to `<path>.bak`.
    ///
    /// No-op when backups are disabled; fails if the file does not exist.
    /// A new backup file gets the configured mode and ownership.
    pub fn backup(&mut self) -> Result<()> {
        if !self.config.backup {
            return Ok(());
        }
        if !self.exists() {
            return Err(Error::InvalidPath {
                path: self.config.path.display().to_string(),
                reason: "cannot back up a file that does not exist".to_string(),
            });
        }

        let backup_path = self.backup_path();
        let config = self.config.clone();
        self.with_lock(false, |file| {
            let mut data = Vec::new();
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut data)?;

            let existed = backup_path.exists();
            let mut backup = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(config.perm)
                .open(&backup_path)?;
            if !existed {
                backup.set_permissions(Permissions::from_mode(config.perm))?;
                apply_ownership(&backup_path, &config)?;
            }
            backup.write_all(&data)?;
            backup.sync_all()?;
            Ok(())
        })?;

        log_event!(
            debug,
            self.log_ctx(),
            "MANAGED_FILE_BACKUP",
            backup = backup_path.display()
        );
        Ok(())
    }

    /// Close any handle, then remove the file. Missing files are not an error.
    pub fn delete(&mut self) -> Result<()> {
        self.close()?;
        match fs::remove_file(&self.config.path) {
            Ok(()) => {
                log_event!(debug, self.log_ctx(), "MANAGED_FILE_DELETED");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock (if held) and drop the handle.
    pub fn close(&mut self) -> Result<()> {
        self.unlock()?;
        self.file = None;
        Ok(())
    }

    fn handle(&self) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| Error::InvalidState(format!("{} is not open", self.config.path.display())))
    }

    /// True when the open handle no longer refers to the file at the path.
    /// Any failure to compare counts as stale so the next open reports it.
    fn is_stale(&self) -> bool {
        let held = match self.file.as_ref().map(File::metadata) {
            Some(Ok(meta)) => meta,
            Some(Err(_)) => return true,
            None => return false,
        };
        match fs::metadata(&self.config.path) {
            Ok(on_disk) => held.dev() != on_disk.dev() || held.ino() != on_disk.ino(),
            Err(_) => true,
        }
    }

    /// Open the file, then run `op` with the lock held, releasing it
    /// afterwards only if this call acquired it.
    ///
    /// A path replaced between open and lock is reopened so the lock and
    /// the data always belong to the file currently at the path.
    fn with_lock<T>(&mut self, create: bool, op: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        let acquired = !self.locked;
        let mut attempts = 0;
        loop {
            self.open(create)?;
            self.lock()?;
            attempts += 1;
            if !acquired || attempts >= LOCK_ATTEMPTS || !self.is_stale() {
                break;
            }
            self.close()?;
        }

        let result = match self.file.as_mut() {
            Some(file) => op(file),
            None => Err(Error::InvalidState(format!(
                "{} is not open",
                self.config.path.display()
            ))),
        };

        if acquired {
            let unlocked = self.unlock();
            if result.is_ok() {
                unlocked?;
            }
        }
        result
    }

    fn log_ctx(&self) -> LogContext {
        LogContext::component("files").with("path", self.config.path.display())
    }
}

impl Drop for ManagedFile {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Apply the configured user and group to `path`.
fn apply_ownership(path: &Path, config: &ManagedFileConfig) -> Result<()> {
    if config.user.is_none() && config.group.is_none() {
        return Ok(());
    }

    let uid = match &config.user {
        Some(name) => Some(lookup_user(name)?),
        None => None,
    };
    let gid = match &config.group {
        Some(name) => Some(lookup_group(name)?),
        None => None,
    };

    nix::unistd::chown(path, uid, gid).map_err(|e| Error::Ownership {
        owner: owner_label(config),
        reason: e.to_string(),
    })
}

fn check_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::InvalidPath {
            path: path.display().to_string(),
            reason: "an absolute path is required".to_string(),
        });
    }
    Ok(())
}

fn check_perm(perm: u32) -> Result<()> {
    if perm & ACCESS_BITS == 0 {
        return Err(Error::InvalidPermissions { perm });
    }
    Ok(())
}

fn lookup_user(name: &str) -> Result<Uid> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(Error::Ownership {
            owner: name.to_string(),
            reason: "no such user".to_string(),
        }),
        Err(e) => Err(Error::Ownership {
            owner: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn lookup_group(name: &str) -> Result<Gid> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(Error::Ownership {
            owner: name.to_string(),
            reason: "no such group".to_string(),
        }),
        Err(e) => Err(Error::Ownership {
            owner: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn owner_label(config: &ManagedFileConfig) -> String {
    format!(
        "{}:{}",
        config.user.as_deref().unwrap_or(""),
        config.group.as_deref().unwrap_or("")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn managed(dir: &Path, name: &str) -> ManagedFile {
        ManagedFile::new(ManagedFileConfig::new(dir.join(name))).unwrap()
    }

    #[test]
    fn test_rejects_relative_path() {
        let err = ManagedFile::new(ManagedFileConfig::new("relative/creds")).unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn test_rejects_zero_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let err = ManagedFile::new(ManagedFileConfig::new(dir.path().join("f")).with_perm(0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPermissions { perm: 0 }));

        let mut file = managed(dir.path(), "f");
        assert!(file.set_perm(0o7000).is_err());
        assert!(file.set_perm(0o400).is_ok());
    }

    #[test]
    fn test_update_then_read_returns_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "registration");

        file.update(b"first version, fairly long").unwrap();
        file.update(b"second").unwrap();
        assert_eq!(file.read().unwrap(), b"second");
        assert!(!file.is_locked());
    }

    #[test]
    fn test_created_with_requested_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "credentials");
        file.update(b"{}").unwrap();

        let mode = fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "missing");
        assert!(file.read().is_err());
        assert!(!file.exists());
        assert!(!file.accessible());
    }

    #[test]
    fn test_backup_keeps_pre_update_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "state");

        file.update(b"one").unwrap();
        file.backup().unwrap();
        file.update(b"two").unwrap();

        assert_eq!(fs::read(file.backup_path()).unwrap(), b"one");
        assert_eq!(file.read().unwrap(), b"two");
    }

    #[test]
    fn test_backup_of_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "state");
        assert!(file.backup().is_err());
    }

    #[test]
    fn test_backup_disabled_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut file =
            ManagedFile::new(ManagedFileConfig::new(dir.path().join("state")).with_backup(false))
                .unwrap();

        // No error even though the file does not exist yet.
        file.backup().unwrap();
        file.update(b"one").unwrap();
        file.backup().unwrap();
        assert!(!file.backup_path().exists());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "state");

        file.delete().unwrap();
        file.update(b"data").unwrap();
        assert!(file.exists());
        file.delete().unwrap();
        assert!(!file.exists());
        assert!(!file.is_open());
        file.delete().unwrap();
    }

    #[test]
    fn test_set_path_closes_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "a");
        file.update(b"a").unwrap();
        assert!(file.is_open());

        file.set_path(dir.path().join("b")).unwrap();
        assert!(!file.is_open());
        assert!(!file.exists());
        assert!(file.set_path("relative").is_err());
    }

    #[test]
    fn test_explicit_lock_is_kept_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "state");
        file.create().unwrap();

        file.lock().unwrap();
        file.update(b"locked write").unwrap();
        assert!(file.is_locked());
        assert_eq!(file.read().unwrap(), b"locked write");
        assert!(file.is_locked());
        file.unlock().unwrap();
        assert!(!file.is_locked());
    }

    #[test]
    fn test_lock_excludes_other_handles() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "state");
        file.create().unwrap();
        file.lock().unwrap();

        let other = File::open(file.path()).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        file.unlock().unwrap();
        assert!(other.try_lock_exclusive().is_ok());
    }

    #[test]
    fn test_unknown_owner_fails_on_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = ManagedFile::new(
            ManagedFileConfig::new(dir.path().join("owned"))
                .with_owner(Some("no-such-user-telemetry".to_string()), None),
        )
        .unwrap();
        assert!(matches!(file.create(), Err(Error::Ownership { .. })));
    }

    #[test]
    fn test_existing_file_keeps_mode_and_owner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owned");
        fs::write(&path, b"{}").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();

        let mut file = ManagedFile::new(
            ManagedFileConfig::new(&path)
                .with_owner(Some("no-such-user-telemetry".to_string()), None),
        )
        .unwrap();
        file.create().unwrap();
        file.update(b"rewritten").unwrap();

        assert_eq!(file.read().unwrap(), b"rewritten");
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_follows_file_replaced_by_other_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = managed(dir.path(), "credentials");
        let mut b = managed(dir.path(), "credentials");

        a.update(b"token-old").unwrap();
        assert!(a.is_open());
        b.delete().unwrap();
        b.update(b"token-new").unwrap();

        assert_eq!(a.read().unwrap(), b"token-new");
        a.update(b"token-from-a").unwrap();
        assert_eq!(fs::read(a.path()).unwrap(), b"token-from-a");
        assert_eq!(b.read().unwrap(), b"token-from-a");
    }

    #[test]
    fn test_lock_follows_replaced_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = managed(dir.path(), "registration");
        let mut b = managed(dir.path(), "registration");

        a.update(b"one").unwrap();
        b.delete().unwrap();
        b.update(b"two").unwrap();
        b.close().unwrap();

        a.read().unwrap();
        a.lock().unwrap();
        let other = File::open(a.path()).unwrap();
        assert!(other.try_lock_exclusive().is_err());
        a.unlock().unwrap();
    }

    #[test]
    fn test_read_after_other_handle_deletes_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = managed(dir.path(), "state");
        let mut b = managed(dir.path(), "state");

        a.update(b"data").unwrap();
        b.delete().unwrap();
        assert!(a.read().is_err());
        assert!(!a.exists());
    }

    #[test]
    fn test_backup_created_with_mode_and_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = managed(dir.path(), "state");
        file.update(b"one").unwrap();
        file.backup().unwrap();
        let mode = fs::metadata(file.backup_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let path = dir.path().join("owned");
        fs::write(&path, b"{}").unwrap();
        let mut owned = ManagedFile::new(
            ManagedFileConfig::new(&path)
                .with_owner(Some("no-such-user-telemetry".to_string()), None),
        )
        .unwrap();
        assert!(matches!(owned.backup(), Err(Error::Ownership { .. })));

        // an existing backup is rewritten without touching its owner
        fs::write(owned.backup_path(), b"old").unwrap();
        owned.backup().unwrap();
        assert_eq!(fs::read(owned.backup_path()).unwrap(), b"{}");
    }
}
