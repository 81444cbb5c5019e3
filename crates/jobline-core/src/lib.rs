//! `jobline-core`: vocabulary and configuration shared by every jobline crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::JoblineConfig;
pub use error::{JoblineError, Result};
pub use types::{JobDefinition, JobKey, JobStatus, MisfirePolicy, DEFAULT_GROUP};
