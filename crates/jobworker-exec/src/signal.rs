//! Platform termination primitives.
//!
//! Both operations address the whole process tree started for a job: on unix
//! the process group created at spawn (the child is its leader), on windows
//! the `taskkill /T` tree. A target that is already gone is not an error.

pub use imp::{alive, interrupt, kill};

#[cfg(unix)]
mod imp {
    use crate::error::{ExecError, Result};

    /// Cooperative stop: `SIGINT` to the process group.
    pub fn interrupt(pid: u32) -> Result<()> {
        send(pid, libc::SIGINT, "SIGINT")
    }

    /// Forced stop: `SIGKILL` to the process group.
    pub fn kill(pid: u32) -> Result<()> {
        send(pid, libc::SIGKILL, "SIGKILL")
    }

    /// Whether any member of the group is still around.
    pub fn alive(pid: u32) -> bool {
        let Ok(pgid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // Safety: signal 0 only checks that the group can be addressed.
        let rc = unsafe { libc::kill(-pgid, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn send(pid: u32, signal: libc::c_int, name: &'static str) -> Result<()> {
        let pgid = libc::pid_t::try_from(pid).map_err(|_| ExecError::Signal {
            pid,
            signal: name,
            reason: "pid out of range".to_string(),
        })?;

        // Safety: a negative pid addresses the group the child leads; kill(2)
        // has no memory-safety preconditions.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(ExecError::Signal {
            pid,
            signal: name,
            reason: err.to_string(),
        })
    }
}

#[cfg(windows)]
mod imp {
    use std::process::Command;

    use crate::error::{ExecError, Result};

    /// Cooperative stop: ask the process tree to close.
    pub fn interrupt(pid: u32) -> Result<()> {
        taskkill(pid, false)
    }

    /// Forced stop: terminate the process tree.
    pub fn kill(pid: u32) -> Result<()> {
        taskkill(pid, true)
    }

    /// The tree cannot be looked up once its root is gone.
    pub fn alive(_pid: u32) -> bool {
        false
    }

    fn taskkill(pid: u32, force: bool) -> Result<()> {
        let pid_arg = pid.to_string();
        let mut args = vec!["/T", "/PID", pid_arg.as_str()];
        if force {
            args.insert(0, "/F");
        }
        let output = Command::new("taskkill").args(&args).output()?;
        // 128: no such process.
        if output.status.success() || output.status.code() == Some(128) {
            return Ok(());
        }
        Err(ExecError::Signal {
            pid,
            signal: if force { "taskkill /F" } else { "taskkill" },
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
