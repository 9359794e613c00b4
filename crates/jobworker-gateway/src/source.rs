//! Static definition source: a JSON array of job definitions read at startup.

use jobworker_core::{Result, WorkerError};
use jobworker_driver::JobDefinition;
use jobworker_exec::script::{job_workdir, materialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Read definitions from `file` and prepare each job's working directory
/// under `root`.
pub fn load(file: &Path, root: &Path) -> Result<Vec<JobDefinition>> {
    let raw = std::fs::read_to_string(file)?;
    let defs: Vec<JobDefinition> = serde_json::from_str(&raw)?;

    let mut seen = HashSet::new();
    for def in &defs {
        if !seen.insert(def.job_id.as_str()) {
            return Err(WorkerError::Definition(format!(
                "duplicate job id {}",
                def.job_id
            )));
        }
    }

    let prepared = defs
        .into_iter()
        .map(|def| prepare(def, root))
        .collect::<Result<Vec<_>>>()?;
    info!(path = %file.display(), count = prepared.len(), "job definitions loaded");
    Ok(prepared)
}

/// Create the working directory; jobs without a package get a launcher
/// wrapping their command, which then becomes the command that runs.
pub fn prepare(mut def: JobDefinition, root: &Path) -> Result<JobDefinition> {
    if def.cmd.trim().is_empty() {
        return Err(WorkerError::Definition(format!(
            "job {} has an empty command",
            def.job_id
        )));
    }

    let dir = job_workdir(root, def.job_id.as_str(), &def.file_code);
    std::fs::create_dir_all(&dir)?;
    if !def.has_package {
        def.cmd = materialize(&dir, &def.cmd)
            .map_err(|e| WorkerError::Definition(format!("job {}: {e}", def.job_id)))?;
        debug!(job_id = %def.job_id, dir = %dir.display(), "launcher written");
    }
    Ok(def)
}
