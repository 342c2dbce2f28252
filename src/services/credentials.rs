//! Credential materialization
//!
//! Writes validated secrets into the transient env file the container
//! runtime reads at `compose up`. The file is regenerated every run,
//! readable only by the owning user, and removed again when the returned
//! guard drops, so cleartext secrets never outlive the run.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{DeployError, DeployResult};
use crate::services::validate::Secret;

/// Guard over the materialized credential file. Dropping it deletes the
/// file, on success and failure paths alike.
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    /// Path of the materialized file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CredentialFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "credential file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove credential file")
            }
        }
    }
}

/// Write `KEY=value` lines for each secret to `path`, mode 0600.
///
/// Any prior file at `path` is replaced unconditionally.
pub fn materialize(path: &Path, secrets: &[Secret]) -> DeployResult<CredentialFile> {
    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        for secret in secrets {
            writeln!(file, "{}={}", secret.name, secret.value())?;
        }
        file.sync_all()
    };

    write().map_err(|e| DeployError::Write {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), count = secrets.len(), "credential file written");
    Ok(CredentialFile {
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn secret(name: &str, value: &str) -> Secret {
        env::set_var(name, value);
        let secrets =
            crate::services::validate::require_secrets(&[name.to_string()]).unwrap();
        env::remove_var(name);
        secrets.into_iter().next().unwrap()
    }

    #[test]
    fn test_writes_key_value_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let secrets = vec![
            secret("TEST_CRED_SIGNING", "sig-123"),
            secret("TEST_CRED_TOKEN", "tok-456"),
        ];
        let guard = materialize(&path, &secrets).unwrap();

        let content = std::fs::read_to_string(guard.path()).unwrap();
        assert_eq!(content, "TEST_CRED_SIGNING=sig-123\nTEST_CRED_TOKEN=tok-456\n");
    }

    #[test]
    fn test_mode_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let guard = materialize(&path, &[secret("TEST_CRED_MODE", "v")]).unwrap();
        let mode = std::fs::metadata(guard.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_overwrites_prior_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "STALE=left-over\n").unwrap();

        let guard = materialize(&path, &[secret("TEST_CRED_FRESH", "new")]).unwrap();
        let content = std::fs::read_to_string(guard.path()).unwrap();
        assert!(!content.contains("STALE"));
        assert!(content.contains("TEST_CRED_FRESH=new"));
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let guard = materialize(&path, &[secret("TEST_CRED_DROP", "v")]).unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_tolerates_already_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");

        let guard = materialize(&path, &[secret("TEST_CRED_GONE", "v")]).unwrap();
        std::fs::remove_file(&path).unwrap();
        drop(guard); // must not panic
    }
}
