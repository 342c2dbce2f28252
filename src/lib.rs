//! worunie-deploy - single-host redeployment orchestrator
//!
//! Redeploys the Worunie bot from source control while preserving its
//! persistent data file: validate secrets, sync sources, back up the data
//! file, materialize credentials, tear down and rebuild the containers,
//! then normalize permissions and verify health.

pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;

pub use config::EnvConfig;
pub use domain::deploy::{DeployStatus, DeploymentReport};
pub use services::pipeline::{render_summary, run, RunOptions};
