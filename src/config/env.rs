//! Environment variable configuration loading

use std::env;
use std::path::PathBuf;
use tracing::warn;

use crate::config::target::DeploymentTarget;

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// The one service this run owns.
    pub target: DeploymentTarget,
    /// Secret names that must be present before anything destructive runs.
    pub required_secrets: Vec<String>,
    /// Health probe endpoint; `None` samples container state only.
    pub health_url: Option<String>,
    /// Expected owner of the data file inside the container user namespace.
    pub data_uid: u32,
    pub data_gid: u32,
    /// Expected data file mode.
    pub data_mode: u32,
    /// Build-cache prune horizon passed to `docker builder prune`.
    pub purge_cache_age: String,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    ///
    /// Every variable has a default; the simple invocation with no
    /// environment at all deploys `./docker-compose.yml` with the stock
    /// Slack secrets.
    pub fn from_env() -> Self {
        let work_dir = env::var("WORUNIE_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let compose_file = env::var("WORUNIE_COMPOSE_FILE")
            .unwrap_or_else(|_| "docker-compose.yml".to_string());

        let name_patterns: Vec<String> = env::var("WORUNIE_NAME_PATTERNS")
            .unwrap_or_else(|_| "worunie".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if name_patterns.is_empty() {
            warn!("WORUNIE_NAME_PATTERNS resolved to an empty list; no container or image will match");
        }

        let data_file = env::var("WORUNIE_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/teams.db"));

        let env_file = env::var("WORUNIE_ENV_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".env"));

        let remote = env::var("WORUNIE_GIT_REMOTE").unwrap_or_else(|_| "origin".to_string());
        let branch = env::var("WORUNIE_GIT_BRANCH").unwrap_or_else(|_| "main".to_string());

        let required_secrets: Vec<String> = env::var("WORUNIE_REQUIRED_SECRETS")
            .unwrap_or_else(|_| "SLACK_SIGNING_SECRET,SLACK_BOT_TOKEN".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let health_url = match env::var("WORUNIE_HEALTH_URL") {
            Ok(v) if v.eq_ignore_ascii_case("none") => None,
            Ok(v) => Some(v),
            Err(_) => Some("http://127.0.0.1:8000/health".to_string()),
        };

        let data_uid = parse_or_default("WORUNIE_DATA_UID", 1000);
        let data_gid = parse_or_default("WORUNIE_DATA_GID", 1000);

        let data_mode = env::var("WORUNIE_DATA_MODE")
            .ok()
            .and_then(|v| u32::from_str_radix(v.trim_start_matches("0o"), 8).ok())
            .unwrap_or(0o644);

        let purge_cache_age =
            env::var("WORUNIE_PURGE_CACHE_AGE").unwrap_or_else(|_| "24h".to_string());

        Self {
            target: DeploymentTarget {
                work_dir,
                compose_file,
                name_patterns,
                data_file,
                env_file,
                remote,
                branch,
            },
            required_secrets,
            health_url,
            data_uid,
            data_gid,
            data_mode,
            purge_cache_age,
        }
    }
}

fn parse_or_default(key: &str, default: u32) -> u32 {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            warn!(%key, value = %v, "unparseable value, using default {}", default);
            default
        }),
        Err(_) => default,
    }
}

/// Constants
pub mod constants {
    use std::time::Duration;

    /// Timeout for short parsed commands (git rev-parse, docker ps).
    pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

    /// Timeout for the source fetch (network-bound).
    pub const SYNC_TIMEOUT: Duration = Duration::from_secs(300);

    /// Timeout for the image build.
    pub const BUILD_TIMEOUT: Duration = Duration::from_secs(1800);

    /// Timeout for one compose down invocation.
    pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(120);

    /// Attempts to tear down still-present containers before giving up.
    pub const TEARDOWN_RETRIES: u32 = 3;

    /// Pause between teardown attempts.
    pub const TEARDOWN_BACKOFF: Duration = Duration::from_secs(5);

    /// Timeout for one compose up invocation.
    pub const START_TIMEOUT: Duration = Duration::from_secs(300);

    /// Window after `compose up` in which an exited container counts as a
    /// crash loop.
    pub const START_GRACE: Duration = Duration::from_secs(5);

    /// Fixed wait before the health verifier samples anything.
    pub const HEALTH_GRACE: Duration = Duration::from_secs(10);

    /// Timeout for the HTTP health probe.
    pub const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Lines of container logs carried into the final report.
    pub const LOG_TAIL_LINES: usize = 20;

    /// Lines of build output carried in a `BuildError`.
    pub const BUILD_LOG_TAIL: usize = 50;

    /// Orchestrator version.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
