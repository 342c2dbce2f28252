//! Unified error handling
//!
//! One `DeployError` enum covers every fatal pipeline outcome so the
//! executor can map any failure to a stage verdict and an exit code.

use std::path::PathBuf;
use thiserror::Error;

use crate::infra::command::CommandError;

/// Fatal pipeline errors
#[derive(Debug, Error)]
pub enum DeployError {
    /// One or more required secrets are absent or empty. Carries every
    /// missing name so a single run surfaces the full list.
    #[error("missing credentials: {}", .0.join(", "))]
    MissingCredential(Vec<String>),

    /// Source tree could not be brought to the requested revision.
    #[error("source sync failed: {0}")]
    Sync(String),

    /// A file the pipeline must produce could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Owned containers were still present after the bounded teardown wait.
    #[error("containers still present after {attempts} teardown attempts: {remaining}")]
    TeardownTimeout { attempts: u32, remaining: String },

    /// Image build exited nonzero. `log_tail` holds the last lines of
    /// build output for operator diagnostics.
    #[error("image build failed with exit code {status}")]
    Build { status: i32, log_tail: Vec<String> },

    /// Containers failed to start, or exited within the grace window.
    #[error("container start failed: {0}")]
    Start(String),

    /// Another run holds the advisory lock for this deployment target.
    #[error("deployment lock at {} is held by another run", .0.display())]
    LockHeld(PathBuf),

    /// External command plumbing failed (spawn, timeout, wait).
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// Short machine-readable tag, used in logs and the final report.
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::MissingCredential(_) => "missing_credential",
            DeployError::Sync(_) => "sync_error",
            DeployError::Write { .. } => "write_error",
            DeployError::TeardownTimeout { .. } => "teardown_timeout",
            DeployError::Build { .. } => "build_error",
            DeployError::Start(_) => "start_error",
            DeployError::LockHeld(_) => "lock_held",
            DeployError::Command(_) => "command_error",
            DeployError::Io(_) => "io_error",
        }
    }
}

/// Convenience alias used throughout the services layer.
pub type DeployResult<T> = Result<T, DeployError>;
