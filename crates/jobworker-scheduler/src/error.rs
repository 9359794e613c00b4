use thiserror::Error;

/// Why a schedule could not produce a next fire time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// A date/time bound, interval or selector could not be interpreted.
    #[error("schedule invalid: {0}")]
    Invalid(String),

    /// The end bound has passed; the schedule will never fire again.
    #[error("schedule expired")]
    Expired,
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
