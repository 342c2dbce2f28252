//! Configuration
//!
//! Environment-driven settings and the deployment target description.

pub mod env;
pub mod target;

pub use env::EnvConfig;
pub use target::DeploymentTarget;
