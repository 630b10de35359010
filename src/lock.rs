//! File-based locking so only one daemon supervises the host at a time.
//!
//! Uses flock-style advisory locking; two watchdogs would race each other
//! withdrawing the same routes.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

pub const DEFAULT_LOCK_FILE: &str = "/var/run/netwarden.lock";

/// Holds an exclusive lock on the daemon lock file until dropped.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Acquire the default daemon lock.
    pub fn acquire() -> Result<Self> {
        Self::acquire_at(DEFAULT_LOCK_FILE)
    }

    /// Attempt to acquire an exclusive lock at `path`.
    /// Returns an error if another instance is already running.
    pub fn acquire_at(path: impl AsRef<Path>) -> Result<Self> {
        let lock_path = path.as_ref();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).ok();
        }

        // create+read+write without truncation avoids a create/lock race
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
                .context("Failed to set lock file permissions")?;
        }

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another netwarden daemon is already running.\n\
                 If you believe this is an error, remove the lock file: {}",
                lock_path.display()
            )
        })?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netwarden.lock");

        let guard = LockGuard::acquire_at(&path).unwrap();
        assert_eq!(guard.path(), path.as_path());

        let second = LockGuard::acquire_at(&path);
        assert!(second.is_err());
        assert!(second
            .err()
            .unwrap()
            .to_string()
            .contains("already running"));

        drop(guard);
        assert!(LockGuard::acquire_at(&path).is_ok());
    }
}
