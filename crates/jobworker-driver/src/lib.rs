//! jobworker-driver: the job registry that turns recurrence rules into
//! process runs.
//!
//! A [`Driver`] holds one job per [`JobDefinition`]. Each job owns an
//! execution unit per rule plus a manual unit for forced runs. Selection arms
//! the rule with the earliest next fire time; [`Driver::dispatch`] starts it
//! once due and enforces the job's timeout while it runs. Every transition is
//! reported to a [`DriverHandler`] as a [`DriverEvent`].

pub mod definition;
pub mod driver;
pub mod error;
pub mod handler;
pub mod job;
pub mod state;
mod unit;

pub use definition::JobDefinition;
pub use driver::Driver;
pub use error::{DriverError, Result};
pub use handler::{DriverContext, DriverEvent, DriverHandler};
pub use job::{JobSnapshot, RuleSnapshot};
pub use state::{ExecState, ExitReason, JobAction, JobState};
pub use unit::UnitKey;
