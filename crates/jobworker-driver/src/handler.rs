//! Events the driver reports and the sink they are delivered to.

use std::path::PathBuf;

use jobworker_core::JobId;
use jobworker_scheduler::Timestamp;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::state::ExecState;

/// Snapshot of a job at the moment an event was produced.
#[derive(Debug, Clone, Serialize)]
pub struct DriverContext {
    pub event_id: Uuid,
    pub job_id: JobId,
    pub name: String,
    pub command: String,
    pub workdir: PathBuf,
    pub stdout: String,
    pub stderr: String,
    /// Error text, empty when the transition succeeded.
    pub exec_err: String,
    pub exec_at: Option<Timestamp>,
    pub next_at: Option<Timestamp>,
    /// Duration of the run in seconds, `0.0` when nothing ran.
    pub exec_secs: f64,
}

/// One reported transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverEvent {
    /// A process started, finished, or could not be run.
    Execute {
        state: ExecState,
        context: DriverContext,
    },
    /// Selection armed a unit without executing anything.
    Select { context: DriverContext },
    /// Status echo for a stop request against an idle job.
    Stopped {
        state: ExecState,
        context: DriverContext,
    },
}

impl DriverEvent {
    pub fn context(&self) -> &DriverContext {
        match self {
            DriverEvent::Execute { context, .. }
            | DriverEvent::Select { context }
            | DriverEvent::Stopped { context, .. } => context,
        }
    }

    /// Reported execution state; selection events carry none.
    pub fn state(&self) -> Option<ExecState> {
        match self {
            DriverEvent::Execute { state, .. } | DriverEvent::Stopped { state, .. } => Some(*state),
            DriverEvent::Select { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DriverEvent::Execute { .. } => "execute",
            DriverEvent::Select { .. } => "select",
            DriverEvent::Stopped { .. } => "stopped",
        }
    }
}

/// Receives every event the driver produces.
///
/// Called outside the registry lock, possibly from several tasks at once.
/// Implementations must not block.
pub trait DriverHandler: Send + Sync {
    fn on_event(&self, event: DriverEvent);
}

impl<F> DriverHandler for F
where
    F: Fn(DriverEvent) + Send + Sync,
{
    fn on_event(&self, event: DriverEvent) {
        self(event)
    }
}

/// Bounded channel sink; a full or closed channel drops the event with a
/// warning instead of stalling the driver.
impl DriverHandler for mpsc::Sender<DriverEvent> {
    fn on_event(&self, event: DriverEvent) {
        let job_id = event.context().job_id.clone();
        let kind = event.kind();
        if self.try_send(event).is_err() {
            warn!(job_id = %job_id, kind, "event channel full or closed, event dropped");
        }
    }
}

impl DriverHandler for mpsc::UnboundedSender<DriverEvent> {
    fn on_event(&self, event: DriverEvent) {
        let job_id = event.context().job_id.clone();
        if self.send(event).is_err() {
            warn!(job_id = %job_id, "event channel closed, event dropped");
        }
    }
}
