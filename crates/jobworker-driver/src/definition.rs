use jobworker_core::JobId;
use jobworker_scheduler::Schedule;
use serde::{Deserialize, Serialize};

/// Everything the driver needs to know about a job, as delivered by the
/// definition source on create or change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub job_id: JobId,
    #[serde(default)]
    pub name: String,
    /// Version directory under the job's root; part of the working directory.
    #[serde(default)]
    pub file_code: String,
    /// Shell command line run in the working directory.
    pub cmd: String,
    /// `KEY=VALUE` entries layered over the host environment.
    #[serde(default)]
    pub env: Vec<String>,
    /// Seconds a run may take before it is killed; `0` disables the limit.
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
    /// Whether the job ships its own files. Jobs without a package get a
    /// generated launcher wrapping `cmd`.
    #[serde(default)]
    pub has_package: bool,
}
