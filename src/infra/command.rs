//! Command execution
//!
//! Unified interface for running external commands (git, docker,
//! docker compose) with:
//! - bounded execution (kill on timeout)
//! - cancellation support
//! - optional line streaming into tracing with a bounded output tail

use std::collections::VecDeque;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Command execution errors
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("failed to wait for {program}: {source}")]
    WaitFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a streamed command run.
pub struct StreamedOutput {
    /// Exit status of the process.
    pub status: ExitStatus,
    /// Last lines of combined stdout/stderr, oldest first.
    pub tail: Vec<String>,
}

/// Command executor
pub struct CommandRunner;

impl CommandRunner {
    /// Run a command to completion and capture its full output.
    ///
    /// The process is killed if it exceeds `timeout`. Suitable for short
    /// commands whose output is parsed (git rev-parse, docker ps).
    pub async fn run(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<std::process::Output, CommandError> {
        debug!(program, ?args, "running command");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::SpawnFailed {
                program: program.to_string(),
                source: e,
            })?;

        tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| CommandError::WaitFailed {
                    program: program.to_string(),
                    source: e,
                })
            }
            _ = tokio::time::sleep(timeout) => {
                error!(program, ?timeout, "command timed out");
                Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Run a command, streaming each output line into tracing and keeping
    /// the last `tail_lines` lines for diagnostics.
    ///
    /// Used for long operations (image build, compose up) where the
    /// operator wants live progress and failures must carry a log tail.
    /// The process is killed on timeout or when `cancel` fires.
    pub async fn run_streamed(
        program: &str,
        args: &[&str],
        work_dir: &Path,
        cancel: CancellationToken,
        timeout: Duration,
        tail_lines: usize,
    ) -> Result<StreamedOutput, CommandError> {
        debug!(program, ?args, "running streamed command");

        let mut child = Command::new(program)
            .args(args)
            .current_dir(work_dir)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CommandError::SpawnFailed {
                program: program.to_string(),
                source: e,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<(bool, String)>();

        let stdout_tx = line_tx.clone();
        let stdout_task = tokio::spawn(async move {
            if let Some(stdout) = stdout {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stdout_tx.send((false, line));
                }
            }
        });

        let stderr_tx = line_tx;
        let stderr_task = tokio::spawn(async move {
            if let Some(stderr) = stderr {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let _ = stderr_tx.send((true, line));
                }
            }
        });

        let mut tail: VecDeque<String> = VecDeque::with_capacity(tail_lines);
        let program_name = program.to_string();

        // One fixed deadline for the whole run; log traffic must not
        // extend it.
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let mut lines_done = false;
        let status = loop {
            tokio::select! {
                line = line_rx.recv(), if !lines_done => {
                    match line {
                        Some((is_stderr, line)) => {
                            if is_stderr {
                                debug!(target: "worunie_deploy::cmd", program = %program_name, "! {}", line);
                            } else {
                                debug!(target: "worunie_deploy::cmd", program = %program_name, "| {}", line);
                            }
                            if tail.len() == tail_lines {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                        None => lines_done = true,
                    }
                }
                _ = cancel.cancelled() => {
                    warn!(program = %program_name, "command cancelled, killing process");
                    let _ = child.kill().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    return Err(CommandError::Cancelled { program: program_name });
                }
                _ = &mut deadline => {
                    error!(program = %program_name, ?timeout, "command timed out, killing process");
                    let _ = child.kill().await;
                    let _ = stdout_task.await;
                    let _ = stderr_task.await;
                    return Err(CommandError::Timeout { program: program_name, timeout });
                }
                status = child.wait() => {
                    break status.map_err(|e| CommandError::WaitFailed {
                        program: program_name.clone(),
                        source: e,
                    })?;
                }
            }
        };

        // Readers finish once the pipes close; drain whatever remains.
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        while let Ok((_, line)) = line_rx.try_recv() {
            if tail.len() == tail_lines {
                tail.pop_front();
            }
            tail.push_back(line);
        }

        Ok(StreamedOutput {
            status,
            tail: tail.into_iter().collect(),
        })
    }
}
