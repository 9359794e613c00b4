//! `Job`: one schedulable job with a unit per rule plus the manual unit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use jobworker_core::JobId;
use jobworker_exec::script::job_workdir;
use jobworker_exec::{CommandSpec, ProcessExit, ProcessHandle, ProcessSupervisor};
use jobworker_scheduler::{next_fire, Timestamp, TurnMode};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::definition::JobDefinition;
use crate::error::DriverError;
use crate::state::{ExecState, ExitReason, JobState};
use crate::unit::{Completion, CoreStart, ExecCore, UnitKey};

/// Read-only view of a job for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub name: String,
    pub state: JobState,
    pub command: String,
    pub workdir: PathBuf,
    pub timeout: u64,
    /// Rule id of the armed unit, if selection succeeded.
    pub selected: Option<String>,
    pub next_at: Option<Timestamp>,
    pub deadline: Option<Timestamp>,
    pub last_exec_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub rules: Vec<RuleSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleSnapshot {
    pub id: String,
    pub enabled: bool,
    pub turn_mode: TurnMode,
    pub next_at: Option<Timestamp>,
    pub running: bool,
}

/// Result of a completed cycle, ready to become an event.
#[derive(Debug)]
pub(crate) struct Report {
    pub state: ExecState,
    pub error: Option<DriverError>,
    pub exec_at: Option<Timestamp>,
    pub next_at: Option<Timestamp>,
}

#[derive(Debug)]
pub(crate) struct Job {
    pub id: JobId,
    pub name: String,
    pub file_code: String,
    pub workdir: PathBuf,
    pub cmd: String,
    pub env: Vec<String>,
    pub timeout: u64,
    pub state: JobState,
    /// Absolute instant after which a running unit is closed.
    pub deadline: Option<Timestamp>,
    pub last_exec_at: Option<Timestamp>,
    pub last_error: Option<DriverError>,
    /// Ordered by rule id; selection ties go to the lowest id.
    units: BTreeMap<String, ExecCore>,
    selected: Option<String>,
    manual: ExecCore,
    /// Units whose rule was removed while they were running. Dropped once
    /// their process reports back.
    retired: Vec<ExecCore>,
    /// Run currently in flight, if any.
    run: Option<u64>,
}

impl Job {
    pub fn new(root: &Path, def: JobDefinition) -> Self {
        let units = def
            .schedules
            .iter()
            .map(|schedule| {
                info!(job_id = %def.job_id, rule_id = %schedule.id, "unit created");
                let key = UnitKey::Rule(schedule.id.clone());
                (
                    schedule.id.clone(),
                    ExecCore::new(def.job_id.clone(), key, Some(schedule.clone())),
                )
            })
            .collect();

        Self {
            workdir: job_workdir(root, def.job_id.as_str(), &def.file_code),
            manual: ExecCore::manual(def.job_id.clone()),
            id: def.job_id,
            name: def.name,
            file_code: def.file_code,
            cmd: def.cmd,
            env: def.env,
            timeout: def.timeout,
            state: JobState::Waiting,
            deadline: None,
            last_exec_at: None,
            last_error: None,
            units,
            selected: None,
            retired: Vec::new(),
            run: None,
        }
    }

    pub fn has_rules(&self) -> bool {
        !self.units.is_empty()
    }

    /// Diff the rule set against `def` by rule id.
    ///
    /// Matching units get the new rule body, units whose rule disappeared are
    /// closed and dropped, new rules get fresh units. Returns the handles of
    /// dropped units that were still running.
    pub fn apply_definition(&mut self, root: &Path, def: JobDefinition) -> Vec<ProcessHandle> {
        self.name = def.name;
        self.file_code = def.file_code;
        self.workdir = job_workdir(root, self.id.as_str(), &self.file_code);
        self.cmd = def.cmd;
        self.env = def.env;
        self.timeout = def.timeout;

        let mut handles = Vec::new();
        let removed: Vec<String> = self
            .units
            .keys()
            .filter(|id| !def.schedules.iter().any(|s| &s.id == *id))
            .cloned()
            .collect();
        for id in removed {
            let Some(mut unit) = self.units.remove(&id) else {
                continue;
            };
            info!(job_id = %self.id, rule_id = %id, "unit removed");
            if self.selected.as_deref() == Some(id.as_str()) {
                self.selected = None;
            }
            if let Some(handle) = unit.close(ExitReason::Stop) {
                handles.push(handle);
                self.retired.push(unit);
            }
        }

        for schedule in def.schedules {
            match self.units.get_mut(&schedule.id) {
                Some(unit) => {
                    debug!(job_id = %self.id, rule_id = %schedule.id, "unit rule updated");
                    unit.schedule = Some(schedule);
                }
                None => {
                    info!(job_id = %self.id, rule_id = %schedule.id, "unit created");
                    let key = UnitKey::Rule(schedule.id.clone());
                    self.units.insert(
                        schedule.id.clone(),
                        ExecCore::new(self.id.clone(), key, Some(schedule)),
                    );
                }
            }
        }
        handles
    }

    /// Recompute every enabled rule's next fire time and arm the earliest.
    pub fn select(&mut self, seed: &Timestamp) -> Result<Timestamp, DriverError> {
        self.selected = None;
        if self.units.is_empty() {
            debug!(job_id = %self.id, "no rules to select from");
            return Err(DriverError::AllSchedulesEmpty);
        }

        let mut disabled = 0;
        let mut best: Option<(String, Timestamp)> = None;
        for (id, unit) in self.units.iter_mut() {
            unit.next_at = None;
            let Some(schedule) = unit.schedule.as_ref() else {
                continue;
            };
            if !schedule.enabled {
                disabled += 1;
                debug!(job_id = %self.id, rule_id = %id, "rule disabled");
                continue;
            }
            match next_fire(schedule, seed) {
                Ok(next) => {
                    unit.next_at = Some(next);
                    if best.as_ref().map_or(true, |(_, earliest)| next < *earliest) {
                        best = Some((id.clone(), next));
                    }
                }
                Err(e) => warn!(job_id = %self.id, rule_id = %id, error = %e, "rule excluded"),
            }
        }

        if disabled == self.units.len() {
            info!(job_id = %self.id, "all rules disabled");
            return Err(DriverError::AllSchedulesDisabled);
        }
        match best {
            Some((id, next)) => {
                info!(job_id = %self.id, rule_id = %id, next_at = %next, "rule selected");
                self.selected = Some(id);
                Ok(next)
            }
            None => {
                warn!(job_id = %self.id, "all rules invalid");
                Err(DriverError::AllSchedulesInvalid)
            }
        }
    }

    pub fn selected_next_at(&self) -> Option<Timestamp> {
        self.selected
            .as_ref()
            .and_then(|id| self.units.get(id))
            .and_then(|unit| unit.next_at)
    }

    pub fn command_spec(&self) -> CommandSpec {
        CommandSpec {
            command: self.cmd.clone(),
            workdir: self.workdir.clone(),
            env: self.env.clone(),
        }
    }

    /// Fire the selected unit if it is due, or the manual unit when `forced`.
    ///
    /// Returns `None` when nothing was due. A successful start moves the job
    /// to RUNNING.
    pub fn execute(
        &mut self,
        seed: Timestamp,
        forced: bool,
        supervisor: &ProcessSupervisor,
        run_id: u64,
    ) -> Option<(UnitKey, CoreStart)> {
        let spec = self.command_spec();
        let key = if forced {
            self.manual.key.clone()
        } else {
            let id = self.selected.as_ref()?;
            let unit = self.units.get(id)?;
            let due = unit.next_at.is_some_and(|next_at| seed >= next_at);
            if !due {
                return None;
            }
            unit.key.clone()
        };

        info!(job_id = %self.id, unit = %key, forced, workdir = %self.workdir.display(), "executing");
        self.deadline = self.run_deadline(&seed);

        let unit = if forced {
            &mut self.manual
        } else {
            self.units.get_mut(self.selected.as_ref()?)?
        };
        let start = unit.execute(seed, &spec, supervisor, run_id);
        if matches!(start, CoreStart::Started(_)) {
            self.state = JobState::Running;
            self.run = Some(run_id);
        }
        Some((key, start))
    }

    /// When a run started at `seed` must be stopped. `None` without a timeout
    /// or when the bound is past the calendar's range.
    fn run_deadline(&self, seed: &Timestamp) -> Option<Timestamp> {
        if self.timeout == 0 {
            return None;
        }
        let deadline = i64::try_from(self.timeout)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|limit| seed.checked_add_signed(limit));
        if deadline.is_none() {
            warn!(job_id = %self.id, timeout = self.timeout, "timeout out of range, run is not time-limited");
        }
        deadline
    }

    /// Close the running unit once the deadline has been reached.
    pub fn check_timeout(&mut self, seed: &Timestamp) -> Vec<ProcessHandle> {
        match self.deadline {
            Some(deadline) if *seed >= deadline => {
                info!(job_id = %self.id, %deadline, "execution deadline reached");
                self.close(ExitReason::Deadline)
            }
            _ => Vec::new(),
        }
    }

    /// Close every unit with `reason`; returns handles of running processes.
    pub fn close(&mut self, reason: ExitReason) -> Vec<ProcessHandle> {
        self.deadline = None;
        let handles: Vec<ProcessHandle> = self
            .units
            .values_mut()
            .chain(std::iter::once(&mut self.manual))
            .chain(self.retired.iter_mut())
            .filter_map(|unit| unit.close(reason))
            .collect();
        info!(job_id = %self.id, %reason, running = handles.len(), "job closed");
        handles
    }

    /// Hand an exit report to the unit that owns run `run_id`.
    pub fn finish(&mut self, key: &UnitKey, run_id: u64, exit: ProcessExit) -> Option<Completion> {
        if self.run != Some(run_id) {
            debug!(job_id = %self.id, run_id, "exit report for a run this job no longer tracks");
            return None;
        }

        let unit = match key {
            UnitKey::Manual => Some(&mut self.manual),
            UnitKey::Rule(id) => self.units.get_mut(id),
        };
        if let Some(completion) = unit
            .filter(|unit| unit.run_id() == Some(run_id))
            .and_then(|unit| unit.finish(run_id, exit.clone()))
        {
            return Some(completion);
        }

        let index = self
            .retired
            .iter()
            .position(|unit| unit.run_id() == Some(run_id))?;
        let mut unit = self.retired.remove(index);
        unit.finish(run_id, exit)
    }

    /// Return to WAITING after a run (or failed start) and re-arm selection.
    pub fn complete(&mut self, completion: &Completion, seed: &Timestamp) -> Report {
        self.state = JobState::Waiting;
        self.run = None;
        self.deadline = None;

        let mut state = completion.state;
        let mut error = completion.error.clone();
        if self.has_rules() {
            if let Err(DriverError::AllSchedulesInvalid) = self.select(seed) {
                state = ExecState::Failed;
                error = Some(DriverError::merge(error, DriverError::AllSchedulesInvalid));
            }
        }

        self.last_exec_at = completion.exec_at;
        self.last_error = error.clone();
        Report {
            state,
            error,
            exec_at: completion.exec_at,
            next_at: self.selected_next_at(),
        }
    }

    /// Status echo for a stop request against an idle job.
    pub fn status_report(&mut self, seed: &Timestamp) -> Report {
        let mut error = self.last_error.clone();
        let mut state = if error.is_some() {
            ExecState::Failed
        } else {
            ExecState::Stopped
        };
        if self.has_rules() {
            if let Err(DriverError::AllSchedulesInvalid) = self.select(seed) {
                state = ExecState::Failed;
                error = Some(DriverError::merge(error, DriverError::AllSchedulesInvalid));
            }
        }
        Report {
            state,
            error,
            exec_at: self.last_exec_at,
            next_at: self.selected_next_at(),
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id.clone(),
            name: self.name.clone(),
            state: self.state,
            command: self.cmd.clone(),
            workdir: self.workdir.clone(),
            timeout: self.timeout,
            selected: self.selected.clone(),
            next_at: self.selected_next_at(),
            deadline: self.deadline,
            last_exec_at: self.last_exec_at,
            last_error: self.last_error.as_ref().map(ToString::to_string),
            rules: self
                .units
                .iter()
                .filter_map(|(id, unit)| {
                    let schedule = unit.schedule.as_ref()?;
                    Some(RuleSnapshot {
                        id: id.clone(),
                        enabled: schedule.enabled,
                        turn_mode: schedule.turn_mode,
                        next_at: unit.next_at,
                        running: unit.is_running(),
                    })
                })
                .collect(),
        }
    }
}
