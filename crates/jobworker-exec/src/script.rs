//! Working-directory layout and the generated launcher for command-only jobs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

#[cfg(unix)]
pub const SCRIPT_NAME: &str = "run.sh";
#[cfg(windows)]
pub const SCRIPT_NAME: &str = "run.bat";

/// `<root>/<job_id>/<file_code>`, the directory a job's process runs in.
pub fn job_workdir(root: &Path, job_id: &str, file_code: &str) -> PathBuf {
    root.join(job_id).join(file_code)
}

/// Write a launcher wrapping `command` into `dir` and return the command line
/// that runs it, relative to `dir`.
///
/// Any previous launcher is replaced, so calling this again with the same
/// command leaves identical contents behind.
pub fn materialize(dir: &Path, command: &str) -> Result<String> {
    let path = dir.join(SCRIPT_NAME);
    if path.exists() {
        fs::remove_file(&path)?;
    }
    fs::write(&path, script_body(command))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o777))?;
    }

    debug!(path = %path.display(), "launcher written");
    Ok(launch_line())
}

#[cfg(unix)]
fn script_body(command: &str) -> String {
    format!("#!/bin/bash\n\n{command}\n")
}

#[cfg(windows)]
fn script_body(command: &str) -> String {
    format!("@echo off\r\n\r\n{command}\r\n")
}

#[cfg(unix)]
fn launch_line() -> String {
    format!("./{SCRIPT_NAME}")
}

#[cfg(windows)]
fn launch_line() -> String {
    SCRIPT_NAME.to_string()
}
