//! Backup manager
//!
//! Snapshots the persisted data file before anything destructive runs.
//! Backups are append-only: a new timestamped name every run, never an
//! overwrite, never a delete. Retention is the operator's job.

use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{info, warn};

use crate::domain::deploy::BackupInfo;
use crate::error::{DeployError, DeployResult};

/// Outcome of a backup attempt.
#[derive(Debug)]
pub enum BackupOutcome {
    /// Source file absent; nothing to protect (first-ever deployment).
    NoSourceFile,
    /// Backup written and durable.
    Created(BackupInfo),
}

/// Create a timestamped backup of `path`.
///
/// The copy lands in `<path>.backup.<UTC timestamp>` via a temporary
/// sibling and an atomic rename, so a crash mid-copy can never leave a
/// half-written file carrying a backup name.
pub async fn create(path: &Path) -> DeployResult<BackupOutcome> {
    create_at(path, Utc::now()).await
}

/// Timestamp-injected variant of [`create`].
pub async fn create_at(path: &Path, now: DateTime<Utc>) -> DeployResult<BackupOutcome> {
    if !tokio::fs::try_exists(path).await? {
        warn!(path = %path.display(), "data file absent, skipping backup");
        return Ok(BackupOutcome::NoSourceFile);
    }

    let timestamp = now.format("%Y%m%d%H%M%S");
    let backup_path = append_extension(path, &format!("backup.{timestamp}"));

    // Append-only invariant: an existing backup is never overwritten.
    if tokio::fs::try_exists(&backup_path).await? {
        return Err(DeployError::Write {
            path: backup_path.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "backup name already taken",
            ),
        });
    }

    let tmp_path = append_extension(&backup_path, "tmp");
    tokio::fs::copy(path, &tmp_path)
        .await
        .map_err(|e| DeployError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, &backup_path)
        .await
        .map_err(|e| DeployError::Write {
            path: backup_path.clone(),
            source: e,
        })?;

    let size = tokio::fs::metadata(&backup_path).await?.len();
    info!(
        source = %path.display(),
        backup = %backup_path.display(),
        size,
        "backup created"
    );

    Ok(BackupOutcome::Created(BackupInfo {
        source: path.display().to_string(),
        backup_path: backup_path.display().to_string(),
        size,
        created_at: now,
    }))
}

fn append_extension(path: &Path, ext: &str) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(ext);
    path.with_file_name(name)
}
