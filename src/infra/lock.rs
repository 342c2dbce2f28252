//! Advisory run lock
//!
//! One redeployment per target at a time. The lock is an exclusive flock
//! on a sibling of the compose file, held for the pipeline's duration and
//! released on every exit path when the guard drops. A second concurrent
//! run fails fast with `DeployError::LockHeld` instead of interleaving
//! teardown and start against the same containers.

use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{DeployError, DeployResult};

/// Exclusive lock over one deployment target.
///
/// The lock file itself is left in place after release; only the flock is
/// dropped. Stale lock files from crashed runs are therefore harmless.
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    /// Acquire the lock, failing immediately if another run holds it.
    pub fn acquire(path: &Path) -> DeployResult<Self> {
        let file = File::create(path).map_err(|e| DeployError::Write {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.try_lock_exclusive()
            .map_err(|_| DeployError::LockHeld(path.to_path_buf()))?;

        debug!(lock = %path.display(), "acquired deployment lock");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "released deployment lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("deploy.lock");

        let first = RunLock::acquire(&lock_path).unwrap();
        let second = RunLock::acquire(&lock_path);
        assert!(matches!(second, Err(DeployError::LockHeld(_))));

        drop(first);
        let third = RunLock::acquire(&lock_path);
        assert!(third.is_ok());
    }

    #[test]
    fn test_lock_file_persists_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("deploy.lock");

        {
            let _lock = RunLock::acquire(&lock_path).unwrap();
        }
        assert!(lock_path.exists());
    }
}
