//! `Driver`: the job registry and its dispatch loop.
//!
//! All job state sits behind one lock. Every public operation gathers the
//! events and process handles it produces while holding the lock, then
//! delivers events and waits on processes after releasing it, so the handler
//! and process termination never run under the lock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use jobworker_core::JobId;
use jobworker_exec::{ProcessExit, ProcessHandle, ProcessSupervisor};
use jobworker_scheduler::{Clock, SystemClock, Timestamp};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::definition::JobDefinition;
use crate::error::{DriverError, Result};
use crate::handler::{DriverContext, DriverEvent, DriverHandler};
use crate::job::{Job, JobSnapshot, Report};
use crate::state::{ExecState, ExitReason, JobAction, JobState};
use crate::unit::{Completion, CoreStart, UnitKey};

/// A started process whose exit still has to be reported.
struct Pending {
    job_id: JobId,
    key: UnitKey,
    run_id: u64,
    exit: oneshot::Receiver<ProcessExit>,
}

/// Side effects collected under the lock.
#[derive(Default)]
struct Outbox {
    events: Vec<DriverEvent>,
    pending: Vec<Pending>,
}

struct DriverInner {
    root: PathBuf,
    jobs: RwLock<HashMap<JobId, Job>>,
    handler: Arc<dyn DriverHandler>,
    clock: Arc<dyn Clock>,
    supervisor: ProcessSupervisor,
    run_seq: AtomicU64,
}

/// Owns every job known to this worker. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Driver {
    inner: Arc<DriverInner>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("root", &self.inner.root)
            .field("jobs", &self.read().len())
            .finish()
    }
}

impl Driver {
    /// Driver over the wall clock with the default stop grace period.
    pub fn new(root: impl Into<PathBuf>, handler: Arc<dyn DriverHandler>) -> Self {
        Self::with_parts(
            root,
            handler,
            Arc::new(SystemClock),
            ProcessSupervisor::new(),
        )
    }

    pub fn with_parts(
        root: impl Into<PathBuf>,
        handler: Arc<dyn DriverHandler>,
        clock: Arc<dyn Clock>,
        supervisor: ProcessSupervisor,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                root: root.into(),
                jobs: RwLock::new(HashMap::new()),
                handler,
                clock,
                supervisor,
                run_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Create a job, or update an existing one in place.
    ///
    /// Rules are matched by id; units for removed rules are stopped. An idle
    /// job is reselected right away and reports the outcome.
    pub async fn set(&self, def: JobDefinition) {
        let seed = self.inner.clock.now();
        let mut outbox = Outbox::default();
        let handles = {
            let mut jobs = self.write();
            match jobs.entry(def.job_id.clone()) {
                Entry::Occupied(mut entry) => {
                    let job = entry.get_mut();
                    let handles = job.apply_definition(&self.inner.root, def);
                    info!(job_id = %job.id, state = %job.state, "job updated");
                    if job.state == JobState::Waiting {
                        select(job, &seed, &mut outbox);
                    }
                    handles
                }
                Entry::Vacant(entry) => {
                    let mut job = Job::new(&self.inner.root, def);
                    info!(job_id = %job.id, name = %job.name, "job created");
                    select(&mut job, &seed, &mut outbox);
                    entry.insert(job);
                    Vec::new()
                }
            }
        };
        self.flush(outbox);
        terminate_all(handles).await;
    }

    /// Drop a job, stopping anything it has running. Returns whether the job
    /// existed.
    pub async fn remove(&self, job_id: &str) -> bool {
        let handles = {
            let mut jobs = self.write();
            match jobs.remove(job_id) {
                Some(mut job) => job.close(ExitReason::Stop),
                None => {
                    debug!(job_id, "remove for unknown job ignored");
                    return false;
                }
            }
        };
        info!(job_id, running = handles.len(), "job removed");
        terminate_all(handles).await;
        true
    }

    /// Drop every job and wait for all of their processes to go away.
    pub async fn clear(&self) {
        let handles: Vec<ProcessHandle> = {
            let mut jobs = self.write();
            jobs.drain()
                .flat_map(|(_, mut job)| job.close(ExitReason::Stop))
                .collect()
        };
        info!(running = handles.len(), "all jobs cleared");
        terminate_all(handles).await;
    }

    /// One dispatch pass at the current clock reading.
    pub fn dispatch(&self) {
        self.dispatch_at(self.inner.clock.now());
    }

    /// Fire due units of idle jobs and enforce deadlines on running ones,
    /// treating `seed` as now.
    pub fn dispatch_at(&self, seed: Timestamp) {
        let mut outbox = Outbox::default();
        let mut expired = Vec::new();
        {
            let mut jobs = self.write();
            for job in jobs.values_mut() {
                match job.state {
                    JobState::Waiting => self.start(job, seed, false, &mut outbox),
                    JobState::Running => expired.extend(
                        job.check_timeout(&seed)
                            .into_iter()
                            .map(|handle| (job.id.clone(), handle)),
                    ),
                }
            }
        }
        self.flush(outbox);

        for (job_id, handle) in expired {
            tokio::spawn(async move {
                if let Err(e) = handle.terminate().await {
                    error!(job_id = %job_id, error = %e, "failed to stop timed out process");
                }
            });
        }
    }

    /// Apply an operator action to a job.
    pub async fn action(&self, job_id: &str, action: JobAction) -> Result<()> {
        let seed = self.inner.clock.now();
        let mut outbox = Outbox::default();
        let handles = {
            let mut jobs = self.write();
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| DriverError::JobNotFound(job_id.to_string()))?;
            info!(job_id, %action, state = %job.state, "job action");

            match (action, job.state) {
                (JobAction::Start, JobState::Waiting) => {
                    self.start(job, seed, true, &mut outbox);
                    Vec::new()
                }
                (JobAction::Start, JobState::Running) => {
                    info!(job_id, "job already running, start ignored");
                    Vec::new()
                }
                (JobAction::Stop, JobState::Running) => job.close(ExitReason::Stop),
                (JobAction::Stop, JobState::Waiting) => {
                    let report = job.status_report(&seed);
                    outbox.events.push(DriverEvent::Stopped {
                        state: report.state,
                        context: context(job, &report, None),
                    });
                    Vec::new()
                }
            }
        };
        self.flush(outbox);

        let mut failure = None;
        for handle in handles {
            if let Err(e) = handle.terminate().await {
                error!(job_id, pid = handle.pid(), error = %e, "stop failed");
                failure.get_or_insert(DriverError::ExecuteTerminal(e.to_string()));
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Snapshots of every job, ordered by id.
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self.read().values().map(Job::snapshot).collect();
        snapshots.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        snapshots
    }

    pub fn job(&self, job_id: &str) -> Option<JobSnapshot> {
        self.read().get(job_id).map(Job::snapshot)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Dispatch every `tick` until `shutdown` broadcasts `true`, then stop
    /// all jobs.
    pub async fn run(&self, tick: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(root = %self.inner.root.display(), tick_ms = tick.as_millis() as u64, "driver started");
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => self.dispatch(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("driver shutting down");
                        break;
                    }
                }
            }
        }
        self.clear().await;
    }

    // --- private helpers ---------------------------------------------------

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.inner.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.inner.jobs.write().unwrap_or_else(|e| e.into_inner())
    }

    fn start(&self, job: &mut Job, seed: Timestamp, forced: bool, outbox: &mut Outbox) {
        let run_id = self.inner.run_seq.fetch_add(1, Ordering::Relaxed) + 1;
        match job.execute(seed, forced, &self.inner.supervisor, run_id) {
            None | Some((_, CoreStart::AlreadyRunning)) => {}
            Some((key, CoreStart::Started(exit))) => {
                let started = Report {
                    state: ExecState::Started,
                    error: None,
                    exec_at: Some(seed),
                    next_at: None,
                };
                outbox.events.push(DriverEvent::Execute {
                    state: ExecState::Started,
                    context: context(job, &started, None),
                });
                outbox.pending.push(Pending {
                    job_id: job.id.clone(),
                    key,
                    run_id,
                    exit,
                });
            }
            Some((_, CoreStart::Failed(completion))) => {
                let report = job.complete(&completion, &seed);
                outbox.events.push(DriverEvent::Execute {
                    state: report.state,
                    context: context(job, &report, Some(&completion)),
                });
            }
        }
    }

    /// Deliver events, then start waiting on the processes they announced.
    fn flush(&self, outbox: Outbox) {
        for event in outbox.events {
            self.inner.handler.on_event(event);
        }
        for pending in outbox.pending {
            let driver = self.clone();
            tokio::spawn(async move {
                let exit = pending.exit.await.unwrap_or_else(|_| ProcessExit {
                    error: Some("supervisor dropped the exit report".to_string()),
                    ..ProcessExit::default()
                });
                driver.on_exit(&pending.job_id, &pending.key, pending.run_id, exit);
            });
        }
    }

    fn on_exit(&self, job_id: &JobId, key: &UnitKey, run_id: u64, exit: ProcessExit) {
        let now = self.inner.clock.now();
        let event = {
            let mut jobs = self.write();
            let Some(job) = jobs.get_mut(job_id) else {
                debug!(job_id = %job_id, run_id, "exit report for a removed job dropped");
                return;
            };
            let Some(completion) = job.finish(key, run_id, exit) else {
                return;
            };
            let report = job.complete(&completion, &now);
            DriverEvent::Execute {
                state: report.state,
                context: context(job, &report, Some(&completion)),
            }
        };
        self.inner.handler.on_event(event);
    }
}

/// Reselect an idle job. Only a selection that leaves every rule unusable is
/// reported as a failure; empty and fully disabled rule sets stay silent.
fn select(job: &mut Job, seed: &Timestamp, outbox: &mut Outbox) {
    match job.select(seed) {
        Ok(next) => {
            let report = Report {
                state: ExecState::Stopped,
                error: None,
                exec_at: None,
                next_at: Some(next),
            };
            outbox.events.push(DriverEvent::Select {
                context: context(job, &report, None),
            });
        }
        Err(e @ DriverError::AllSchedulesInvalid) => {
            let report = Report {
                state: ExecState::Failed,
                error: Some(e),
                exec_at: None,
                next_at: None,
            };
            outbox.events.push(DriverEvent::Execute {
                state: ExecState::Failed,
                context: context(job, &report, None),
            });
        }
        Err(e) => debug!(job_id = %job.id, reason = %e, "nothing selected"),
    }
}

fn context(job: &Job, report: &Report, output: Option<&Completion>) -> DriverContext {
    DriverContext {
        event_id: Uuid::new_v4(),
        job_id: job.id.clone(),
        name: job.name.clone(),
        command: job.cmd.clone(),
        workdir: job.workdir.clone(),
        stdout: output.map(|c| c.stdout.clone()).unwrap_or_default(),
        stderr: output.map(|c| c.stderr.clone()).unwrap_or_default(),
        exec_err: report
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        exec_at: report.exec_at,
        next_at: report.next_at,
        exec_secs: output.map_or(0.0, |c| c.exec_secs),
    }
}

/// Terminate processes concurrently, logging the ones that refuse to go.
async fn terminate_all(handles: Vec<ProcessHandle>) {
    if handles.is_empty() {
        return;
    }
    let mut set = JoinSet::new();
    for handle in handles {
        set.spawn(async move {
            let pid = handle.pid();
            (pid, handle.terminate().await)
        });
    }
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((pid, Err(e))) => error!(pid, error = %e, "failed to stop process"),
            Err(e) => warn!(error = %e, "terminate task panicked"),
        }
    }
}
