use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;

/// Scheduling state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Idle; dispatch may fire the selected unit once it is due.
    #[default]
    Waiting,
    /// A unit's process is in flight; dispatch only checks the deadline.
    Running,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Waiting => write!(f, "JOB_WAITING"),
            JobState::Running => write!(f, "JOB_RUNNING"),
        }
    }
}

/// Why a unit's process is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitReason {
    /// Nobody asked it to stop; whatever it exits with is its own doing.
    #[default]
    Normal,
    /// Stop action, rule removal or job removal.
    Stop,
    /// The job's timeout elapsed.
    Deadline,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "EXIT_NORMAL"),
            ExitReason::Stop => write!(f, "EXIT_STOP"),
            ExitReason::Deadline => write!(f, "EXIT_DEADLINE"),
        }
    }
}

/// Execution state reported to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecState {
    Started,
    Stopped,
    Failed,
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecState::Started => write!(f, "STARTED"),
            ExecState::Stopped => write!(f, "STOPPED"),
            ExecState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Operator request against a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Start,
    Stop,
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobAction::Start => write!(f, "start"),
            JobAction::Stop => write!(f, "stop"),
        }
    }
}

impl FromStr for JobAction {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(JobAction::Start),
            "stop" => Ok(JobAction::Stop),
            _ => Err(DriverError::UnknownAction(s.to_string())),
        }
    }
}
