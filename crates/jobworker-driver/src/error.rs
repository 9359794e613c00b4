use thiserror::Error;

/// Failures surfaced by the driver, either as event error text or to the
/// caller of an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("job all schedules isempty.")]
    AllSchedulesEmpty,

    #[error("job all schedules disable.")]
    AllSchedulesDisabled,

    /// Every enabled rule failed to resolve or has expired.
    #[error("job all schedules invalid.")]
    AllSchedulesInvalid,

    /// The process could not be started, or exited unsuccessfully on its own.
    #[error("job execute exception:{0}")]
    ExecuteException(String),

    #[error("the job has been executed for too long and has exceeded the timeout threshold.")]
    ExecuteDeadline,

    /// A stop request could not get rid of the process.
    #[error("job execute terminal error : {0}")]
    ExecuteTerminal(String),

    /// An execution error followed by a selection error.
    #[error("#1,{0}\n#2,{1}")]
    Compound(Box<DriverError>, Box<DriverError>),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl DriverError {
    /// Append `next` to an optional earlier error.
    pub fn merge(first: Option<DriverError>, next: DriverError) -> DriverError {
        match first {
            Some(first) => DriverError::Compound(Box::new(first), Box::new(next)),
            None => next,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
