//! Error types for the jobworker-exec crate.

use thiserror::Error;

/// All errors that can originate from process supervision.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The child process could not be spawned or its pipes set up.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// Underlying I/O failure (script write, permissions).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Delivering a signal to the process group failed.
    #[error("signal {signal} to pid {pid} failed: {reason}")]
    Signal {
        pid: u32,
        signal: &'static str,
        reason: String,
    },

    /// The process survived both the interrupt and the kill.
    #[error("process {pid} still alive after kill")]
    Terminal { pid: u32 },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
