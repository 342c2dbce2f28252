//! Deployment domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::container::ContainerInfo;

/// Overall run status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DeployStatus {
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Success | DeployStatus::Failed)
    }
}

/// Stage status
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// Whether a stage failure aborts the pipeline or only degrades the run.
///
/// The executor reads this tag instead of hard-coding abort logic per
/// stage, so the fatal/best-effort policy lives in the stage table.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Fatality {
    Fatal,
    BestEffort,
}

/// One pipeline stage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineStage {
    /// Stage identifier (e.g., "backup", "teardown", "build")
    pub name: String,
    /// Display name (e.g., "Backup", "Container Teardown")
    pub display_name: String,
    /// Abort-vs-continue policy on failure.
    pub fatality: Fatality,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// Additional detail (error message, skip reason)
    pub message: Option<String>,
}

impl PipelineStage {
    pub fn new(name: &str, display_name: &str, fatality: Fatality) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            fatality,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }

    /// Icon used in the operator-facing stage summary.
    pub fn status_icon(&self) -> &'static str {
        match self.status {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        }
    }
}

/// Presence/size check of the persisted data file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataFileCheck {
    pub path: String,
    pub exists: bool,
    pub size: Option<u64>,
}

/// A backup created this run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackupInfo {
    pub source: String,
    pub backup_path: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Result of the source sync stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncSummary {
    pub remote: String,
    pub branch: String,
    pub previous_commit: String,
    pub current_commit: String,
}

impl SyncSummary {
    pub fn changed(&self) -> bool {
        self.previous_commit != self.current_commit
    }
}

/// Health verifier output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Per-container state at sample time.
    pub containers: Vec<ContainerInfo>,
    /// HTTP probe outcome; `None` when the probe is disabled.
    pub endpoint: Option<EndpointProbe>,
    /// Bounded tail of recent service logs.
    pub log_tail: Vec<String>,
    /// Data file presence/size after the deploy.
    pub data_file: DataFileCheck,
    /// True when every sampled signal looked healthy.
    pub healthy: bool,
}

/// One HTTP health probe sample.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointProbe {
    pub url: String,
    pub reachable: bool,
    pub http_status: Option<u16>,
}

/// Final record of a deployment run, produced for operator consumption.
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentReport {
    pub run_id: String,
    pub host: String,
    pub orchestrator_version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: DeployStatus,
    pub stages: Vec<PipelineStage>,
    /// Kind tag of the fatal error, when the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<BackupInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSummary>,
    /// Non-fatal degradations accumulated across best-effort stages.
    pub warnings: Vec<String>,
}

impl DeploymentReport {
    pub fn new(run_id: String, host: String, stages: Vec<PipelineStage>) -> Self {
        Self {
            run_id,
            host,
            orchestrator_version: crate::config::env::constants::VERSION.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            status: DeployStatus::Running,
            stages,
            failure: None,
            sync: None,
            backup: None,
            health: None,
            warnings: Vec::new(),
        }
    }

    /// Mark the run finished.
    pub fn complete(&mut self, status: DeployStatus, failure: Option<String>) {
        self.status = status;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_status_as_str() {
        assert_eq!(DeployStatus::Running.as_str(), "running");
        assert_eq!(DeployStatus::Success.as_str(), "success");
        assert_eq!(DeployStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_deploy_status_is_terminal() {
        assert!(!DeployStatus::Running.is_terminal());
        assert!(DeployStatus::Success.is_terminal());
        assert!(DeployStatus::Failed.is_terminal());
    }

    #[test]
    fn test_stage_lifecycle() {
        let mut stage = PipelineStage::new("backup", "Backup", Fatality::Fatal);
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(true, None);
        assert_eq!(stage.status, StageStatus::Success);
        assert!(stage.finished_at.is_some());
        assert!(stage.duration_ms.is_some());
    }

    #[test]
    fn test_stage_skip_keeps_reason() {
        let mut stage = PipelineStage::new("purge", "Image Purge", Fatality::BestEffort);
        stage.skip(Some("not requested".to_string()));
        assert_eq!(stage.status, StageStatus::Skipped);
        assert_eq!(stage.message.as_deref(), Some("not requested"));
    }

    #[test]
    fn test_sync_summary_changed() {
        let mut sync = SyncSummary {
            remote: "origin".to_string(),
            branch: "main".to_string(),
            previous_commit: "abc1234".to_string(),
            current_commit: "abc1234".to_string(),
        };
        assert!(!sync.changed());
        sync.current_commit = "def5678".to_string();
        assert!(sync.changed());
    }

    #[test]
    fn test_report_complete_records_failure() {
        let mut report = DeploymentReport::new(
            "run-1".to_string(),
            "host-a".to_string(),
            vec![PipelineStage::new("build", "Image Build", Fatality::Fatal)],
        );
        report.complete(DeployStatus::Failed, Some("build_error".to_string()));
        assert_eq!(report.status, DeployStatus::Failed);
        assert_eq!(report.failure.as_deref(), Some("build_error"));
        assert!(report.finished_at.is_some());
    }
}
