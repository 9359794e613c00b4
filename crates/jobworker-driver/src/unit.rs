//! `ExecCore`: the execution unit bound to one recurrence rule, or the
//! manual unit used for forced runs.

use std::fmt;

use jobworker_core::JobId;
use jobworker_exec::{CommandSpec, ProcessExit, ProcessHandle, ProcessSupervisor};
use jobworker_scheduler::{Schedule, Timestamp};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::DriverError;
use crate::state::{ExecState, ExitReason};

/// Identifies a unit within its job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitKey {
    Manual,
    Rule(String),
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Manual => write!(f, "manual"),
            UnitKey::Rule(id) => write!(f, "{id}"),
        }
    }
}

/// Outcome of asking a unit to execute.
#[derive(Debug)]
pub(crate) enum CoreStart {
    /// The unit already has a process in flight; nothing was spawned.
    AlreadyRunning,
    /// A process is running; its exit report arrives on the receiver.
    Started(oneshot::Receiver<ProcessExit>),
    /// The process could not be started. The unit never left idle.
    Failed(Completion),
}

/// What a finished (or never started) run reports upward.
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub state: ExecState,
    pub error: Option<DriverError>,
    pub exec_at: Option<Timestamp>,
    pub stdout: String,
    pub stderr: String,
    pub exec_secs: f64,
}

#[derive(Debug)]
struct InFlight {
    run_id: u64,
    handle: ProcessHandle,
}

#[derive(Debug)]
pub(crate) struct ExecCore {
    pub job_id: JobId,
    pub key: UnitKey,
    pub schedule: Option<Schedule>,
    /// Valid only while idle and after a successful selection pass.
    pub next_at: Option<Timestamp>,
    pub exec_at: Option<Timestamp>,
    pub exit: ExitReason,
    pub stdout: String,
    pub stderr: String,
    pub exec_secs: f64,
    running: Option<InFlight>,
}

impl ExecCore {
    pub fn new(job_id: JobId, key: UnitKey, schedule: Option<Schedule>) -> Self {
        Self {
            job_id,
            key,
            schedule,
            next_at: None,
            exec_at: None,
            exit: ExitReason::Normal,
            stdout: String::new(),
            stderr: String::new(),
            exec_secs: 0.0,
            running: None,
        }
    }

    pub fn manual(job_id: JobId) -> Self {
        Self::new(job_id, UnitKey::Manual, None)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn run_id(&self) -> Option<u64> {
        self.running.as_ref().map(|r| r.run_id)
    }

    /// Start the unit's process unless one is already in flight.
    pub fn execute(
        &mut self,
        seed: Timestamp,
        spec: &CommandSpec,
        supervisor: &ProcessSupervisor,
        run_id: u64,
    ) -> CoreStart {
        if self.is_running() {
            debug!(job_id = %self.job_id, unit = %self.key, "unit already running, execute ignored");
            return CoreStart::AlreadyRunning;
        }

        self.exit = ExitReason::Normal;
        self.exec_at = Some(seed);
        match supervisor.spawn(spec) {
            Ok(spawned) => {
                info!(job_id = %self.job_id, unit = %self.key, pid = spawned.handle.pid(), run_id, "unit started");
                self.running = Some(InFlight {
                    run_id,
                    handle: spawned.handle,
                });
                CoreStart::Started(spawned.exit)
            }
            Err(e) => {
                error!(job_id = %self.job_id, unit = %self.key, error = %e, "unit failed to start");
                self.stdout.clear();
                self.stderr.clear();
                self.exec_secs = 0.0;
                CoreStart::Failed(Completion {
                    state: ExecState::Failed,
                    error: Some(DriverError::ExecuteException(e.to_string())),
                    exec_at: self.exec_at,
                    stdout: String::new(),
                    stderr: String::new(),
                    exec_secs: 0.0,
                })
            }
        }
    }

    /// Tag the in-flight run with `reason` and hand back its process handle so
    /// the caller can terminate it outside any lock. Idle units return `None`.
    pub fn close(&mut self, reason: ExitReason) -> Option<ProcessHandle> {
        let running = self.running.as_ref()?;
        info!(job_id = %self.job_id, unit = %self.key, %reason, "closing unit");
        self.exit = reason;
        Some(running.handle.clone())
    }

    /// Commit the exit of run `run_id`. Reports for any other run are stale
    /// and ignored.
    pub fn finish(&mut self, run_id: u64, exit: ProcessExit) -> Option<Completion> {
        if self.run_id() != Some(run_id) {
            debug!(job_id = %self.job_id, unit = %self.key, run_id, "stale exit report ignored");
            return None;
        }
        self.running = None;

        let (state, error) = classify(self.exit, &exit);
        info!(
            job_id = %self.job_id,
            unit = %self.key,
            %state,
            exit = %self.exit,
            exec_secs = exit.duration_secs,
            "unit finished"
        );
        self.exit = ExitReason::Normal;
        self.stdout = exit.stdout;
        self.stderr = exit.stderr;
        self.exec_secs = exit.duration_secs;

        Some(Completion {
            state,
            error,
            exec_at: self.exec_at,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            exec_secs: self.exec_secs,
        })
    }
}

/// Map a process exit to the reported state. A clean exit is always STOPPED;
/// otherwise the reason the unit was closed decides.
fn classify(reason: ExitReason, exit: &ProcessExit) -> (ExecState, Option<DriverError>) {
    let Some(cause) = exit.error.as_ref() else {
        return (ExecState::Stopped, None);
    };
    match reason {
        ExitReason::Stop => (ExecState::Stopped, None),
        ExitReason::Deadline => (ExecState::Failed, Some(DriverError::ExecuteDeadline)),
        ExitReason::Normal => (
            ExecState::Failed,
            Some(DriverError::ExecuteException(cause.clone())),
        ),
    }
}
