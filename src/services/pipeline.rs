//! Pipeline execution
//!
//! The redeployment sequence as data: an ordered stage table tagged with
//! the abort-vs-continue policy, executed by one generic runner. Stage
//! bodies live in the sibling service modules; this module owns ordering,
//! fatality handling, and report assembly.

use std::future::Future;
use tracing::{error, info, warn};

use crate::config::env::EnvConfig;
use crate::domain::deploy::{
    DeployStatus, DeploymentReport, Fatality, PipelineStage, StageStatus,
};
use crate::error::{DeployError, DeployResult};
use crate::infra::lock::RunLock;
use crate::services::backup::{self, BackupOutcome};
use crate::services::lifecycle::LifecycleController;
use crate::services::{credentials, health, permissions, sync, validate};

/// Per-invocation switches, parsed off argv in `main`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunOptions {
    /// Remove owned images and prune build cache before rebuilding.
    pub purge: bool,
    /// Build with --no-cache --pull.
    pub no_cache: bool,
}

struct StageSpec {
    name: &'static str,
    display_name: &'static str,
    fatality: Fatality,
}

/// The pipeline, in execution order. The executor consults `fatality`
/// instead of hard-coding which failures abort.
const STAGES: &[StageSpec] = &[
    StageSpec { name: "validate", display_name: "Environment Validation", fatality: Fatality::Fatal },
    StageSpec { name: "sync", display_name: "Source Sync", fatality: Fatality::Fatal },
    StageSpec { name: "backup", display_name: "Data Backup", fatality: Fatality::Fatal },
    StageSpec { name: "credentials", display_name: "Credential Materialization", fatality: Fatality::Fatal },
    StageSpec { name: "teardown", display_name: "Container Teardown", fatality: Fatality::Fatal },
    StageSpec { name: "purge", display_name: "Image Purge", fatality: Fatality::BestEffort },
    StageSpec { name: "build", display_name: "Image Build", fatality: Fatality::Fatal },
    StageSpec { name: "start", display_name: "Container Start", fatality: Fatality::Fatal },
    StageSpec { name: "permissions", display_name: "Permission Normalization", fatality: Fatality::BestEffort },
    StageSpec { name: "health", display_name: "Health Verification", fatality: Fatality::BestEffort },
];

const VALIDATE: usize = 0;
const SYNC: usize = 1;
const BACKUP: usize = 2;
const CREDENTIALS: usize = 3;
const TEARDOWN: usize = 4;
const PURGE: usize = 5;
const BUILD: usize = 6;
const START: usize = 7;
const PERMISSIONS: usize = 8;
const HEALTH: usize = 9;

fn initial_stages() -> Vec<PipelineStage> {
    STAGES
        .iter()
        .map(|s| PipelineStage::new(s.name, s.display_name, s.fatality))
        .collect()
}

/// Generic stage runner: applies the fatality policy from the stage tag.
struct Executor {
    report: DeploymentReport,
    fatal: Option<DeployError>,
}

impl Executor {
    fn new(report: DeploymentReport) -> Self {
        Self {
            report,
            fatal: None,
        }
    }

    /// Run one stage. After a fatal failure every later stage is marked
    /// skipped; a best-effort failure records a warning and the pipeline
    /// continues.
    async fn stage<T, F>(&mut self, idx: usize, fut: F) -> Option<T>
    where
        F: Future<Output = DeployResult<T>>,
    {
        if self.fatal.is_some() {
            self.report.stages[idx].skip(Some("earlier stage failed".to_string()));
            return None;
        }

        let name = self.report.stages[idx].name.clone();
        info!(stage = %name, "stage started");
        self.report.stages[idx].start();

        match fut.await {
            Ok(value) => {
                self.report.stages[idx].finish(true, None);
                info!(
                    stage = %name,
                    duration_ms = self.report.stages[idx].duration_ms,
                    "stage succeeded"
                );
                Some(value)
            }
            Err(e) => {
                self.report.stages[idx].finish(false, Some(e.to_string()));
                match self.report.stages[idx].fatality {
                    Fatality::Fatal => {
                        error!(stage = %name, error = %e, "fatal stage failure, aborting pipeline");
                        self.fatal = Some(e);
                    }
                    Fatality::BestEffort => {
                        warn!(stage = %name, error = %e, "best-effort stage failed, continuing");
                        self.report.warnings.push(format!("{name}: {e}"));
                    }
                }
                None
            }
        }
    }

    /// Degrade an already-finished stage: flips it to failed and records
    /// the warnings, without affecting pipeline control flow.
    fn degrade(&mut self, idx: usize, warnings: Vec<String>) {
        if warnings.is_empty() {
            return;
        }
        let name = self.report.stages[idx].name.clone();
        self.report.stages[idx].status = StageStatus::Failed;
        self.report.stages[idx].message = Some(warnings.join("; "));
        for w in warnings {
            warn!(stage = %name, warning = %w, "degradation");
            self.report.warnings.push(format!("{name}: {w}"));
        }
    }

    fn finish(mut self) -> DeploymentReport {
        let (status, failure) = match &self.fatal {
            None => (DeployStatus::Success, None),
            Some(e) => (DeployStatus::Failed, Some(e.kind().to_string())),
        };
        self.report.complete(status, failure);
        self.report
    }
}

/// Run the full redeployment pipeline and produce the operator report.
///
/// Never panics and never returns early without a report: every exit
/// path yields the stage table as it stood when the run ended.
pub async fn run(config: &EnvConfig, options: RunOptions) -> DeploymentReport {
    let run_id = uuid::Uuid::new_v4().to_string();
    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut exec = Executor::new(DeploymentReport::new(run_id.clone(), host, initial_stages()));
    info!(run_id = %run_id, target = %config.target.work_dir.display(), "deployment started");

    // One run per target. The guard holds the flock until this function
    // returns, whatever path it takes out.
    let _lock = match RunLock::acquire(&config.target.lock_path()) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "could not acquire deployment lock");
            for stage in exec.report.stages.iter_mut() {
                stage.skip(Some("lock not acquired".to_string()));
            }
            exec.fatal = Some(e);
            return exec.finish();
        }
    };

    // Read-only validation precedes every destructive stage.
    let secrets = exec
        .stage(VALIDATE, async { validate::require_secrets(&config.required_secrets) })
        .await;

    if let Some(sync_summary) = exec.stage(SYNC, sync::sync_source(&config.target)).await {
        exec.report.sync = Some(sync_summary);
    }

    let data_file = config.target.data_file_path();
    match exec.stage(BACKUP, backup::create(&data_file)).await {
        Some(BackupOutcome::Created(info)) => exec.report.backup = Some(info),
        Some(BackupOutcome::NoSourceFile) => {
            exec.report.stages[BACKUP].message = Some("no data file yet".to_string());
            exec.report
                .warnings
                .push(format!("backup: {} absent, nothing to back up", data_file.display()));
        }
        None => {}
    }

    // The guard keeps the cleartext file alive exactly as long as the
    // container runtime needs it (build + up read the env file).
    let credential_file = match &secrets {
        Some(secrets) => {
            exec.stage(CREDENTIALS, async {
                credentials::materialize(&config.target.env_file_path(), secrets)
            })
            .await
        }
        None => {
            exec.report.stages[CREDENTIALS].skip(Some("earlier stage failed".to_string()));
            None
        }
    };

    let lifecycle = LifecycleController::new(&config.target).await;

    exec.stage(TEARDOWN, lifecycle.teardown()).await;

    if options.purge {
        if let Some(outcome) = exec
            .stage(PURGE, async { Ok(lifecycle.purge(&config.purge_cache_age).await) })
            .await
        {
            exec.report.stages[PURGE].message = Some(format!(
                "{} image(s) removed, cache pruned: {}",
                outcome.images_removed, outcome.cache_pruned
            ));
        }
    } else if exec.fatal.is_some() {
        exec.report.stages[PURGE].skip(Some("earlier stage failed".to_string()));
    } else {
        exec.report.stages[PURGE].skip(Some("not requested".to_string()));
    }

    exec.stage(BUILD, lifecycle.build(options.no_cache)).await;
    exec.stage(START, lifecycle.start()).await;

    // Secrets have been consumed by the runtime; remove them now rather
    // than at end of scope so they are gone before verification runs.
    drop(credential_file);

    if let Some(warnings) = exec
        .stage(PERMISSIONS, async {
            Ok(permissions::normalize(
                &data_file,
                config.data_uid,
                config.data_gid,
                config.data_mode,
            ))
        })
        .await
    {
        exec.degrade(PERMISSIONS, warnings);
    }

    if let Some(summary) = exec
        .stage(HEALTH, async {
            Ok(health::verify(&lifecycle, config.health_url.as_deref(), &data_file).await)
        })
        .await
    {
        let degradations = health::degradations(&summary);
        exec.report.health = Some(summary);
        exec.degrade(HEALTH, degradations);
    }

    let report = exec.finish();
    info!(
        run_id = %run_id,
        status = report.status.as_str(),
        warnings = report.warnings.len(),
        "deployment finished"
    );
    report
}

/// Operator-facing stage summary table.
pub fn render_summary(report: &DeploymentReport) -> String {
    let mut out = String::new();
    out.push_str("=== Stage Summary ===\n");
    for stage in &report.stages {
        let duration = stage
            .duration_ms
            .map(|d| format!("{d}ms"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "{} {} ({})",
            stage.status_icon(),
            stage.display_name,
            duration
        ));
        if let Some(msg) = &stage.message {
            out.push_str(&format!(" - {msg}"));
        }
        out.push('\n');
    }
    out.push_str(&format!("Status: {}\n", report.status.as_str()));
    if let Some(failure) = &report.failure {
        out.push_str(&format!("Failure: {failure}\n"));
    }
    for warning in &report.warnings {
        out.push_str(&format!("Warning: {warning}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> Executor {
        Executor::new(DeploymentReport::new(
            "test-run".to_string(),
            "test-host".to_string(),
            initial_stages(),
        ))
    }

    #[tokio::test]
    async fn test_fatal_failure_skips_remaining_stages() {
        let mut exec = executor();

        let ok: Option<()> = exec.stage(VALIDATE, async { Ok(()) }).await;
        assert!(ok.is_some());

        let failed: Option<()> = exec
            .stage(SYNC, async {
                Err(DeployError::Sync("remote unreachable".to_string()))
            })
            .await;
        assert!(failed.is_none());

        let after: Option<()> = exec.stage(BACKUP, async { Ok(()) }).await;
        assert!(after.is_none());

        let report = exec.finish();
        assert_eq!(report.status, DeployStatus::Failed);
        assert_eq!(report.failure.as_deref(), Some("sync_error"));
        assert_eq!(report.stages[VALIDATE].status, StageStatus::Success);
        assert_eq!(report.stages[SYNC].status, StageStatus::Failed);
        assert_eq!(report.stages[BACKUP].status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_best_effort_failure_continues() {
        let mut exec = executor();

        let _: Option<()> = exec
            .stage(PURGE, async {
                Err(DeployError::Start("docker unavailable".to_string()))
            })
            .await;

        let next: Option<()> = exec.stage(BUILD, async { Ok(()) }).await;
        assert!(next.is_some());

        let report = exec.finish();
        assert_eq!(report.status, DeployStatus::Success);
        assert_eq!(report.stages[PURGE].status, StageStatus::Failed);
        assert_eq!(report.stages[BUILD].status, StageStatus::Success);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].starts_with("purge:"));
    }

    #[tokio::test]
    async fn test_degrade_flips_stage_and_records_warnings() {
        let mut exec = executor();
        let _: Option<()> = exec.stage(HEALTH, async { Ok(()) }).await;
        exec.degrade(HEALTH, vec!["endpoint unreachable".to_string()]);

        let report = exec.finish();
        assert_eq!(report.status, DeployStatus::Success);
        assert_eq!(report.stages[HEALTH].status, StageStatus::Failed);
        assert!(report.warnings[0].contains("endpoint unreachable"));
    }

    #[test]
    fn test_stage_table_order_matches_control_flow() {
        let names: Vec<&str> = STAGES.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "validate",
                "sync",
                "backup",
                "credentials",
                "teardown",
                "purge",
                "build",
                "start",
                "permissions",
                "health"
            ]
        );
        // Destructive stages are fatal; cleanup and verification degrade.
        assert_eq!(STAGES[VALIDATE].fatality, Fatality::Fatal);
        assert_eq!(STAGES[TEARDOWN].fatality, Fatality::Fatal);
        assert_eq!(STAGES[PURGE].fatality, Fatality::BestEffort);
        assert_eq!(STAGES[PERMISSIONS].fatality, Fatality::BestEffort);
        assert_eq!(STAGES[HEALTH].fatality, Fatality::BestEffort);
    }

    #[test]
    fn test_render_summary_contains_every_stage() {
        let report = DeploymentReport::new(
            "test-run".to_string(),
            "test-host".to_string(),
            initial_stages(),
        );
        let summary = render_summary(&report);
        for spec in STAGES {
            assert!(summary.contains(spec.display_name));
        }
    }
}
