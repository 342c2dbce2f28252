//! Deployment target
//!
//! Everything the lifecycle controller needs to know about the one service
//! it owns. Name patterns scope every container/image operation so the
//! orchestrator cannot touch unrelated services sharing the host.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Identity and layout of the deployed service.
#[derive(Clone, Debug, Serialize)]
pub struct DeploymentTarget {
    /// Working tree the service deploys from.
    pub work_dir: PathBuf,
    /// Compose file, relative to `work_dir` or absolute.
    pub compose_file: String,
    /// Container/image name substrings owned by this target. Matching is
    /// the only way any teardown/purge operation selects a resource.
    pub name_patterns: Vec<String>,
    /// Persisted data file, relative to `work_dir`.
    pub data_file: PathBuf,
    /// Transient credential file, relative to `work_dir`.
    pub env_file: PathBuf,
    /// Git remote to sync from.
    pub remote: String,
    /// Git branch to sync to.
    pub branch: String,
}

impl DeploymentTarget {
    /// Absolute path of the compose file.
    pub fn compose_path(&self) -> PathBuf {
        let p = Path::new(&self.compose_file);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.work_dir.join(p)
        }
    }

    /// Absolute path of the persisted data file.
    pub fn data_file_path(&self) -> PathBuf {
        self.work_dir.join(&self.data_file)
    }

    /// Absolute path of the transient credential file.
    pub fn env_file_path(&self) -> PathBuf {
        self.work_dir.join(&self.env_file)
    }

    /// Lock file path, a sibling of the compose file.
    pub fn lock_path(&self) -> PathBuf {
        self.compose_path().with_extension("deploy.lock")
    }

    /// Whether a container or image name belongs to this target.
    pub fn owns_name(&self, name: &str) -> bool {
        self.name_patterns.iter().any(|p| name.contains(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> DeploymentTarget {
        DeploymentTarget {
            work_dir: PathBuf::from("/opt/worunie"),
            compose_file: "docker-compose.yml".to_string(),
            name_patterns: vec!["worunie".to_string()],
            data_file: PathBuf::from("data/teams.db"),
            env_file: PathBuf::from(".env"),
            remote: "origin".to_string(),
            branch: "main".to_string(),
        }
    }

    #[test]
    fn test_owns_name_matches_only_own_patterns() {
        let t = target();
        assert!(t.owns_name("worunie-bot-1"));
        assert!(t.owns_name("registry.local/worunie:latest"));
        assert!(!t.owns_name("postgres"));
        assert!(!t.owns_name("other-service-db"));
    }

    #[test]
    fn test_paths_resolve_under_work_dir() {
        let t = target();
        assert_eq!(
            t.compose_path(),
            PathBuf::from("/opt/worunie/docker-compose.yml")
        );
        assert_eq!(
            t.data_file_path(),
            PathBuf::from("/opt/worunie/data/teams.db")
        );
        assert_eq!(t.env_file_path(), PathBuf::from("/opt/worunie/.env"));
    }

    #[test]
    fn test_absolute_compose_file_kept() {
        let mut t = target();
        t.compose_file = "/etc/worunie/compose.yml".to_string();
        assert_eq!(t.compose_path(), PathBuf::from("/etc/worunie/compose.yml"));
    }
}
