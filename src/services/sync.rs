//! Source synchronization
//!
//! Brings the working tree to the tip of the configured remote branch.
//! Local uncommitted changes are never discarded: a dirty tree fails the
//! stage before any network traffic.

use std::path::Path;
use tracing::info;

use crate::config::env::constants::{COMMAND_TIMEOUT, SYNC_TIMEOUT};
use crate::config::target::DeploymentTarget;
use crate::domain::deploy::SyncSummary;
use crate::error::{DeployError, DeployResult};
use crate::infra::command::CommandRunner;

/// Fast-forward the working tree to `<remote>/<branch>`.
pub async fn sync_source(target: &DeploymentTarget) -> DeployResult<SyncSummary> {
    let work_dir = &target.work_dir;

    let dirty = dirty_entries(&git_porcelain(work_dir).await?);
    if !dirty.is_empty() {
        return Err(DeployError::Sync(format!(
            "working tree has local changes ({}), refusing to overwrite",
            dirty.join(", ")
        )));
    }

    let previous_commit = rev_parse_head(work_dir).await?;

    let fetch = CommandRunner::run(
        "git",
        &["fetch", &target.remote, &target.branch],
        work_dir,
        SYNC_TIMEOUT,
    )
    .await?;
    if !fetch.status.success() {
        return Err(DeployError::Sync(format!(
            "git fetch {} {} failed: {}",
            target.remote,
            target.branch,
            String::from_utf8_lossy(&fetch.stderr).trim()
        )));
    }

    let upstream = format!("{}/{}", target.remote, target.branch);
    let merge = CommandRunner::run(
        "git",
        &["merge", "--ff-only", &upstream],
        work_dir,
        COMMAND_TIMEOUT,
    )
    .await?;
    if !merge.status.success() {
        return Err(DeployError::Sync(format!(
            "git merge --ff-only {} failed: {}",
            upstream,
            String::from_utf8_lossy(&merge.stderr).trim()
        )));
    }

    let current_commit = rev_parse_head(work_dir).await?;
    info!(
        previous = %previous_commit,
        current = %current_commit,
        branch = %target.branch,
        "source synchronized"
    );

    Ok(SyncSummary {
        remote: target.remote.clone(),
        branch: target.branch.clone(),
        previous_commit,
        current_commit,
    })
}

async fn git_porcelain(work_dir: &Path) -> DeployResult<String> {
    let output = CommandRunner::run(
        "git",
        &["status", "--porcelain"],
        work_dir,
        COMMAND_TIMEOUT,
    )
    .await?;
    if !output.status.success() {
        return Err(DeployError::Sync(format!(
            "git status failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn rev_parse_head(work_dir: &Path) -> DeployResult<String> {
    let output = CommandRunner::run(
        "git",
        &["rev-parse", "--short", "HEAD"],
        work_dir,
        COMMAND_TIMEOUT,
    )
    .await?;
    if !output.status.success() {
        return Err(DeployError::Sync(format!(
            "git rev-parse failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Paths reported modified/untracked by `git status --porcelain`.
///
/// Untracked files count as dirty: a fast-forward can still clobber them
/// when the incoming tree adds the same path.
fn dirty_entries(porcelain: &str) -> Vec<String> {
    porcelain
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| line[3..].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_tree_has_no_dirty_entries() {
        assert!(dirty_entries("").is_empty());
        assert!(dirty_entries("\n").is_empty());
    }

    #[test]
    fn test_modified_and_untracked_are_dirty() {
        let porcelain = " M app/events.py\n?? notes.txt\n";
        let dirty = dirty_entries(porcelain);
        assert_eq!(dirty, vec!["app/events.py", "notes.txt"]);
    }

    #[tokio::test]
    async fn test_sync_fails_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let target = DeploymentTarget {
            work_dir: dir.path().to_path_buf(),
            compose_file: "docker-compose.yml".to_string(),
            name_patterns: vec!["worunie".to_string()],
            data_file: "data/teams.db".into(),
            env_file: ".env".into(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
        };

        let err = sync_source(&target).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::Sync(_) | DeployError::Command(_)
        ));
    }
}
