//! Health verification
//!
//! One bounded sample after a fixed grace period: container states, an
//! optional HTTP probe, a log tail, and the data file check. No retry
//! loops; the operator decides what to do with a degraded report.

use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::env::constants::{HEALTH_GRACE, HEALTH_PROBE_TIMEOUT, LOG_TAIL_LINES};
use crate::domain::deploy::{DataFileCheck, EndpointProbe, HealthSummary};
use crate::services::lifecycle::LifecycleController;

/// Presence/size of the persisted data file.
pub fn check_data_file(path: &Path) -> DataFileCheck {
    match std::fs::metadata(path) {
        Ok(meta) => DataFileCheck {
            path: path.display().to_string(),
            exists: true,
            size: Some(meta.len()),
        },
        Err(_) => DataFileCheck {
            path: path.display().to_string(),
            exists: false,
            size: None,
        },
    }
}

/// Probe an HTTP health endpoint once with a bounded timeout.
pub async fn probe_endpoint(url: &str) -> EndpointProbe {
    probe_endpoint_with_timeout(url, HEALTH_PROBE_TIMEOUT).await
}

async fn probe_endpoint_with_timeout(url: &str, timeout: Duration) -> EndpointProbe {
    let client = match reqwest::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "failed to build http client");
            return EndpointProbe {
                url: url.to_string(),
                reachable: false,
                http_status: None,
            };
        }
    };

    match client.get(url).send().await {
        Ok(response) => EndpointProbe {
            url: url.to_string(),
            reachable: true,
            http_status: Some(response.status().as_u16()),
        },
        Err(e) => {
            warn!(url, error = %e, "health endpoint unreachable");
            EndpointProbe {
                url: url.to_string(),
                reachable: false,
                http_status: None,
            }
        }
    }
}

/// Wait the grace period, then sample everything once.
pub async fn verify(
    lifecycle: &LifecycleController<'_>,
    health_url: Option<&str>,
    data_file: &Path,
) -> HealthSummary {
    info!(grace = ?HEALTH_GRACE, "waiting before health sample");
    tokio::time::sleep(HEALTH_GRACE).await;

    let containers = match lifecycle.owned_containers().await {
        Ok(containers) => containers,
        Err(e) => {
            warn!(error = %e, "failed to sample container state");
            Vec::new()
        }
    };

    let endpoint = match health_url {
        Some(url) => Some(probe_endpoint(url).await),
        None => None,
    };

    let log_tail = lifecycle.logs_tail(LOG_TAIL_LINES).await;
    let data_file = check_data_file(data_file);

    let summary = HealthSummary {
        healthy: evaluate(&containers, endpoint.as_ref(), &data_file),
        containers,
        endpoint,
        log_tail,
        data_file,
    };

    if summary.healthy {
        info!("service healthy after deploy");
    } else {
        warn!("service degraded after deploy");
    }
    summary
}

/// A sample is healthy when at least one owned container exists, all of
/// them are running, the probe (if any) answered with a success status,
/// and the data file is present and nonzero.
fn evaluate(
    containers: &[crate::domain::container::ContainerInfo],
    endpoint: Option<&EndpointProbe>,
    data_file: &DataFileCheck,
) -> bool {
    let containers_ok = !containers.is_empty() && containers.iter().all(|c| c.is_running());

    let endpoint_ok = match endpoint {
        Some(probe) => {
            probe.reachable
                && probe
                    .http_status
                    .map(|s| (200..300).contains(&(s as u32)))
                    .unwrap_or(false)
        }
        None => true,
    };

    let data_ok = data_file.exists && data_file.size.unwrap_or(0) > 0;

    containers_ok && endpoint_ok && data_ok
}

/// Warnings describing what degraded, for the final report.
pub fn degradations(summary: &HealthSummary) -> Vec<String> {
    let mut warnings = Vec::new();

    if summary.containers.is_empty() {
        warnings.push("no owned containers found at health sample".to_string());
    }
    for c in summary.containers.iter().filter(|c| !c.is_running()) {
        warnings.push(format!("container {} is {} ({})", c.name, c.state, c.status));
    }
    if let Some(probe) = &summary.endpoint {
        if !probe.reachable {
            warnings.push(format!("health endpoint {} unreachable", probe.url));
        } else if let Some(status) = probe.http_status {
            if !(200..300).contains(&(status as u32)) {
                warnings.push(format!(
                    "health endpoint {} answered with HTTP {status}",
                    probe.url
                ));
            }
        }
    }
    if !summary.data_file.exists {
        warnings.push(format!("data file {} missing", summary.data_file.path));
    } else if summary.data_file.size.unwrap_or(0) == 0 {
        warnings.push(format!("data file {} is empty", summary.data_file.path));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::parse_ps_line;

    fn running() -> crate::domain::container::ContainerInfo {
        parse_ps_line("a|worunie-bot-1|img|Up 10 seconds|running|now|")
    }

    fn exited() -> crate::domain::container::ContainerInfo {
        parse_ps_line("b|worunie-bot-2|img|Exited (1)|exited|now|")
    }

    fn present_data() -> DataFileCheck {
        DataFileCheck {
            path: "/opt/worunie/data/teams.db".to_string(),
            exists: true,
            size: Some(4096),
        }
    }

    #[test]
    fn test_check_data_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teams.db");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let check = check_data_file(&path);
        assert!(check.exists);
        assert_eq!(check.size, Some(4096));
    }

    #[test]
    fn test_check_data_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let check = check_data_file(&dir.path().join("absent.db"));
        assert!(!check.exists);
        assert_eq!(check.size, None);
    }

    #[test]
    fn test_evaluate_happy_path() {
        let probe = EndpointProbe {
            url: "http://127.0.0.1:8000/health".to_string(),
            reachable: true,
            http_status: Some(200),
        };
        assert!(evaluate(&[running()], Some(&probe), &present_data()));
    }

    #[test]
    fn test_evaluate_degraded_by_exited_container() {
        assert!(!evaluate(&[running(), exited()], None, &present_data()));
    }

    #[test]
    fn test_evaluate_degraded_by_http_500() {
        let probe = EndpointProbe {
            url: "http://127.0.0.1:8000/health".to_string(),
            reachable: true,
            http_status: Some(500),
        };
        assert!(!evaluate(&[running()], Some(&probe), &present_data()));
    }

    #[test]
    fn test_evaluate_no_probe_is_ok() {
        assert!(evaluate(&[running()], None, &present_data()));
    }

    #[test]
    fn test_degradations_name_each_problem() {
        let summary = HealthSummary {
            containers: vec![exited()],
            endpoint: Some(EndpointProbe {
                url: "http://127.0.0.1:8000/health".to_string(),
                reachable: false,
                http_status: None,
            }),
            log_tail: Vec::new(),
            data_file: DataFileCheck {
                path: "teams.db".to_string(),
                exists: false,
                size: None,
            },
            healthy: false,
        };

        let warnings = degradations(&summary);
        assert!(warnings.iter().any(|w| w.contains("worunie-bot-2")));
        assert!(warnings.iter().any(|w| w.contains("unreachable")));
        assert!(warnings.iter().any(|w| w.contains("missing")));
    }

    #[tokio::test]
    async fn test_probe_unreachable_endpoint() {
        // Port 9 (discard) is essentially never serving HTTP locally.
        let probe = probe_endpoint_with_timeout(
            "http://127.0.0.1:9/health",
            Duration::from_millis(500),
        )
        .await;
        assert!(!probe.reachable);
        assert_eq!(probe.http_status, None);
    }
}
