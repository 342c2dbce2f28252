//! Container domain models

use serde::{Deserialize, Serialize};

/// One container as reported by `docker ps`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub status: String,
    pub state: String,
    pub created: String,
    pub ports: Vec<String>,
}

impl ContainerInfo {
    /// Format string handed to `docker ps --format`; one line per
    /// container, pipe-separated, parsed by [`parse_ps_line`].
    pub const PS_FORMAT: &'static str =
        "{{.ID}}|{{.Names}}|{{.Image}}|{{.Status}}|{{.State}}|{{.CreatedAt}}|{{.Ports}}";

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    pub fn is_exited(&self) -> bool {
        self.state.eq_ignore_ascii_case("exited")
    }
}

/// Parse one pipe-separated `docker ps` output line.
///
/// Missing fields come back empty rather than failing the whole listing;
/// docker occasionally emits short lines for containers mid-removal.
pub fn parse_ps_line(line: &str) -> ContainerInfo {
    let parts: Vec<&str> = line.split('|').collect();
    ContainerInfo {
        id: parts.first().unwrap_or(&"").to_string(),
        name: parts.get(1).unwrap_or(&"").to_string(),
        image: parts.get(2).unwrap_or(&"").to_string(),
        status: parts.get(3).unwrap_or(&"").to_string(),
        state: parts.get(4).unwrap_or(&"").to_string(),
        created: parts.get(5).unwrap_or(&"").to_string(),
        ports: parts
            .get(6)
            .unwrap_or(&"")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

/// Parse full `docker ps` output into container records.
pub fn parse_ps_output(stdout: &str) -> Vec<ContainerInfo> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(parse_ps_line)
        .collect()
}

/// One image as reported by `docker images`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub reference: String,
    pub id: String,
}

/// Format string handed to `docker images --format`.
pub const IMAGES_FORMAT: &str = "{{.Repository}}:{{.Tag}}|{{.ID}}";

/// Parse full `docker images` output into image records.
pub fn parse_images_output(stdout: &str) -> Vec<ImageInfo> {
    stdout
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (reference, id) = line.split_once('|')?;
            Some(ImageInfo {
                reference: reference.to_string(),
                id: id.to_string(),
            })
        })
        .collect()
}
