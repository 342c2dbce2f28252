//! Services layer
//!
//! One module per pipeline stage, plus the executor that sequences them.

pub mod backup;
pub mod credentials;
pub mod health;
pub mod lifecycle;
pub mod permissions;
pub mod pipeline;
pub mod sync;
pub mod validate;
