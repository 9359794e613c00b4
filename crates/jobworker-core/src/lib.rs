//! `jobworker-core`: configuration, error type and identifiers shared by every
//! jobworker crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use types::JobId;
