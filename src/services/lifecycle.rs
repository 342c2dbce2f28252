//! Container lifecycle controller
//!
//! Drives the target's ContainerSet through
//! `Running(old) → Stopping → Stopped → [Purging] → Building → Starting →
//! Running(new)`. Every container/image selection goes through the
//! target's name patterns; named volumes are never removed, so the
//! persisted data file survives any path through this module.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::env::constants::{
    BUILD_LOG_TAIL, BUILD_TIMEOUT, COMMAND_TIMEOUT, LOG_TAIL_LINES, START_GRACE, START_TIMEOUT,
    TEARDOWN_BACKOFF, TEARDOWN_RETRIES, TEARDOWN_TIMEOUT,
};
use crate::config::target::DeploymentTarget;
use crate::domain::container::{
    parse_images_output, parse_ps_output, ContainerInfo, ImageInfo, IMAGES_FORMAT,
};
use crate::error::{DeployError, DeployResult};
use crate::infra::command::CommandRunner;

/// Compose CLI flavor detected on the host.
#[derive(Clone, Debug)]
pub struct ComposeCommand {
    program: &'static str,
    prefix: Vec<&'static str>,
}

impl ComposeCommand {
    /// Prefer the standalone `docker-compose` binary, fall back to the
    /// `docker compose` plugin.
    pub async fn detect() -> Self {
        let check = tokio::process::Command::new("which")
            .arg("docker-compose")
            .output()
            .await;

        if check.map(|o| o.status.success()).unwrap_or(false) {
            Self {
                program: "docker-compose",
                prefix: vec![],
            }
        } else {
            Self {
                program: "docker",
                prefix: vec!["compose"],
            }
        }
    }

    #[cfg(test)]
    fn plugin() -> Self {
        Self {
            program: "docker",
            prefix: vec!["compose"],
        }
    }

    fn args<'a>(&'a self, compose_file: &'a str, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args: Vec<&'a str> = self.prefix.clone();
        args.extend(["-f", compose_file]);
        args.extend(rest);
        args
    }
}

/// Outcome counters for the best-effort purge stage.
#[derive(Debug, Default)]
pub struct PurgeOutcome {
    pub images_removed: usize,
    pub cache_pruned: bool,
}

/// Lifecycle operations over one deployment target.
pub struct LifecycleController<'a> {
    target: &'a DeploymentTarget,
    compose: ComposeCommand,
    compose_path: String,
    cancel: CancellationToken,
}

impl<'a> LifecycleController<'a> {
    pub async fn new(target: &'a DeploymentTarget) -> Self {
        let compose = ComposeCommand::detect().await;
        let compose_path = target.compose_path().display().to_string();
        info!(
            program = compose.program,
            compose_file = %compose_path,
            "lifecycle controller ready"
        );
        Self {
            target,
            compose,
            compose_path,
            cancel: CancellationToken::new(),
        }
    }

    /// Containers on the host that belong to this target.
    pub async fn owned_containers(&self) -> DeployResult<Vec<ContainerInfo>> {
        let output = CommandRunner::run(
            "docker",
            &["ps", "-a", "--format", ContainerInfo::PS_FORMAT],
            &self.target.work_dir,
            COMMAND_TIMEOUT,
        )
        .await?;

        if !output.status.success() {
            return Err(DeployError::Start(format!(
                "docker ps failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let all = parse_ps_output(&String::from_utf8_lossy(&output.stdout));
        Ok(all
            .into_iter()
            .filter(|c| self.target.owns_name(&c.name))
            .collect())
    }

    /// Stop and remove the target's containers, keeping named volumes.
    ///
    /// No owned containers beforehand is a clean no-op (first deploy).
    /// Otherwise `compose down` runs under a bounded retry loop; owned
    /// containers still present afterwards fail with `TeardownTimeout`.
    pub async fn teardown(&self) -> DeployResult<()> {
        let existing = self.owned_containers().await?;
        if existing.is_empty() {
            info!("no owned containers present, teardown is a no-op");
            return Ok(());
        }
        info!(count = existing.len(), "stopping existing containers");

        for attempt in 1..=TEARDOWN_RETRIES {
            // --remove-orphans covers renamed services from prior compose
            // files; volumes are deliberately not passed.
            let args = self
                .compose
                .args(&self.compose_path, &["down", "--remove-orphans"]);
            let result = CommandRunner::run_streamed(
                self.compose.program,
                &args,
                &self.target.work_dir,
                self.cancel.clone(),
                TEARDOWN_TIMEOUT,
                LOG_TAIL_LINES,
            )
            .await;

            match result {
                Ok(out) if out.status.success() => {}
                Ok(out) => warn!(
                    attempt,
                    status = out.status.code().unwrap_or(-1),
                    "compose down exited nonzero"
                ),
                Err(e) => warn!(attempt, error = %e, "compose down failed"),
            }

            let remaining = self.owned_containers().await?;
            if remaining.is_empty() {
                info!(attempt, "teardown complete");
                return Ok(());
            }

            warn!(
                attempt,
                remaining = remaining.len(),
                "owned containers still present after teardown attempt"
            );
            if attempt < TEARDOWN_RETRIES {
                tokio::time::sleep(TEARDOWN_BACKOFF).await;
            }
        }

        let remaining = self.owned_containers().await?;
        let names: Vec<String> = remaining.iter().map(|c| c.name.clone()).collect();
        Err(DeployError::TeardownTimeout {
            attempts: TEARDOWN_RETRIES,
            remaining: names.join(", "),
        })
    }

    /// Remove images matching the target's name patterns and prune build
    /// cache older than `cache_age`.
    ///
    /// Best-effort by contract: every failure is logged and folded into
    /// the outcome, never an error. Resources outside the name patterns
    /// are never touched.
    pub async fn purge(&self, cache_age: &str) -> PurgeOutcome {
        let mut outcome = PurgeOutcome::default();

        let images = match self.list_images().await {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "failed to list images, skipping purge");
                return outcome;
            }
        };

        let owned: Vec<ImageInfo> = images
            .into_iter()
            .filter(|img| self.target.owns_name(&img.reference))
            .collect();

        for image in &owned {
            let result = CommandRunner::run(
                "docker",
                &["rmi", &image.reference],
                &self.target.work_dir,
                COMMAND_TIMEOUT,
            )
            .await;
            match result {
                Ok(out) if out.status.success() => {
                    info!(image = %image.reference, "stale image removed");
                    outcome.images_removed += 1;
                }
                Ok(out) => warn!(
                    image = %image.reference,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "failed to remove image"
                ),
                Err(e) => warn!(image = %image.reference, error = %e, "failed to remove image"),
            }
        }

        let until = format!("until={cache_age}");
        let prune = CommandRunner::run(
            "docker",
            &["builder", "prune", "-f", "--filter", &until],
            &self.target.work_dir,
            COMMAND_TIMEOUT,
        )
        .await;
        match prune {
            Ok(out) if out.status.success() => {
                info!(%cache_age, "build cache pruned");
                outcome.cache_pruned = true;
            }
            Ok(out) => warn!(
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "builder prune exited nonzero"
            ),
            Err(e) => warn!(error = %e, "builder prune failed"),
        }

        outcome
    }

    /// Build the service images.
    ///
    /// `no_cache` additionally pulls fresh base images. Nonzero exit is
    /// fatal and carries the build log tail for diagnostics.
    pub async fn build(&self, no_cache: bool) -> DeployResult<()> {
        let mut rest = vec!["build"];
        if no_cache {
            rest.extend(["--no-cache", "--pull"]);
        }
        let args = self.compose.args(&self.compose_path, &rest);
        info!(no_cache, "building service images");

        let result = CommandRunner::run_streamed(
            self.compose.program,
            &args,
            &self.target.work_dir,
            self.cancel.clone(),
            BUILD_TIMEOUT,
            BUILD_LOG_TAIL,
        )
        .await?;

        if result.status.success() {
            info!("image build complete");
            Ok(())
        } else {
            Err(DeployError::Build {
                status: result.status.code().unwrap_or(-1),
                log_tail: result.tail,
            })
        }
    }

    /// Create and start the new ContainerSet, then watch a short grace
    /// window for immediate crash loops.
    ///
    /// Volumes and bind mounts come from the compose file unchanged, so
    /// the new containers see the same persisted data file.
    pub async fn start(&self) -> DeployResult<()> {
        let args = self.compose.args(&self.compose_path, &["up", "-d"]);
        info!("starting containers");

        let result = CommandRunner::run_streamed(
            self.compose.program,
            &args,
            &self.target.work_dir,
            self.cancel.clone(),
            START_TIMEOUT,
            LOG_TAIL_LINES,
        )
        .await?;

        if !result.status.success() {
            return Err(DeployError::Start(format!(
                "compose up exited with {}: {}",
                result.status.code().unwrap_or(-1),
                result.tail.last().map(String::as_str).unwrap_or("")
            )));
        }

        tokio::time::sleep(START_GRACE).await;

        let containers = self.owned_containers().await?;
        if containers.is_empty() {
            return Err(DeployError::Start(
                "no owned containers present after compose up".to_string(),
            ));
        }
        if let Some(crashed) = crash_looped(&containers) {
            return Err(DeployError::Start(format!(
                "container {} exited within the start grace window ({})",
                crashed.name, crashed.status
            )));
        }

        info!(count = containers.len(), "containers started");
        Ok(())
    }

    /// Bounded tail of the ContainerSet's recent logs.
    pub async fn logs_tail(&self, lines: usize) -> Vec<String> {
        let tail = format!("--tail={lines}");
        let args = self.compose.args(&self.compose_path, &["logs", &tail]);

        match CommandRunner::run(
            self.compose.program,
            &args,
            &self.target.work_dir,
            COMMAND_TIMEOUT,
        )
        .await
        {
            Ok(out) => {
                // compose writes log lines to both streams depending on
                // version; merge them.
                let mut lines: Vec<String> = Vec::new();
                for raw in [out.stdout, out.stderr] {
                    lines.extend(
                        String::from_utf8_lossy(&raw)
                            .lines()
                            .filter(|l| !l.is_empty())
                            .map(str::to_string),
                    );
                }
                lines
            }
            Err(e) => {
                warn!(error = %e, "failed to read container logs");
                Vec::new()
            }
        }
    }

    async fn list_images(&self) -> DeployResult<Vec<ImageInfo>> {
        let output = CommandRunner::run(
            "docker",
            &["images", "--format", IMAGES_FORMAT],
            &self.target.work_dir,
            COMMAND_TIMEOUT,
        )
        .await?;
        if !output.status.success() {
            return Err(DeployError::Start(format!(
                "docker images failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_images_output(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }
}

/// First container that already exited, if any.
fn crash_looped(containers: &[ContainerInfo]) -> Option<&ContainerInfo> {
    containers.iter().find(|c| c.is_exited())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::parse_ps_line;
    use std::path::PathBuf;

    fn target() -> DeploymentTarget {
        DeploymentTarget {
            work_dir: PathBuf::from("/opt/worunie"),
            compose_file: "docker-compose.yml".to_string(),
            name_patterns: vec!["worunie".to_string()],
            data_file: "data/teams.db".into(),
            env_file: ".env".into(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
        }
    }

    #[test]
    fn test_compose_args_injects_file() {
        let compose = ComposeCommand::plugin();
        let args = compose.args("/opt/worunie/docker-compose.yml", &["up", "-d"]);
        assert_eq!(
            args,
            vec!["compose", "-f", "/opt/worunie/docker-compose.yml", "up", "-d"]
        );
    }

    #[test]
    fn test_crash_loop_detection() {
        let running = parse_ps_line("a|worunie-bot-1|img|Up 3 seconds|running|now|");
        let exited = parse_ps_line("b|worunie-bot-2|img|Exited (1) 2 seconds ago|exited|now|");

        assert!(crash_looped(&[running.clone()]).is_none());
        let containers = [running, exited];
        let crashed = crash_looped(&containers).unwrap();
        assert_eq!(crashed.name, "worunie-bot-2");
    }

    #[test]
    fn test_purge_selection_respects_name_patterns() {
        let t = target();
        let images = crate::domain::container::parse_images_output(
            "worunie:latest|sha1\npostgres:16|sha2\nregistry.local/worunie:old|sha3\n",
        );
        let owned: Vec<_> = images
            .into_iter()
            .filter(|img| t.owns_name(&img.reference))
            .collect();
        let refs: Vec<&str> = owned.iter().map(|i| i.reference.as_str()).collect();
        assert_eq!(refs, vec!["worunie:latest", "registry.local/worunie:old"]);
    }
}
