//! `ProcessSupervisor`: spawns a job's command, drains its output and stops
//! it on request.
//!
//! Spawning returns as soon as the OS has created the process. Waiting for
//! exit and reading stdout/stderr happen in a detached Tokio task that hands
//! the final [`ProcessExit`] back over a oneshot channel, so callers never
//! block on a running process.
//!
//! A run ends when the shell exits, not when its pipes close. Background
//! descendants that still hold stdout or stderr get [`DRAIN_AFTER_EXIT`] to
//! finish writing, then the rest of the group is killed.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ExecError, Result};
use crate::signal;

/// How often `terminate` checks whether the process has gone.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long an interrupted process gets before it is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// How long a killed process gets to be reaped before giving up.
const KILL_CONFIRM: Duration = Duration::from_secs(1);

/// How long output is still read once the shell has exited.
pub const DRAIN_AFTER_EXIT: Duration = Duration::from_millis(200);

/// What to run and where.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Shell command line, run through `sh -c` (`cmd /C` on windows).
    pub command: String,
    /// Working directory of the child.
    pub workdir: PathBuf,
    /// `KEY=VALUE` overrides layered over the host environment.
    pub env: Vec<String>,
}

/// Final report of one process run.
#[derive(Debug, Clone, Default)]
pub struct ProcessExit {
    /// Exit code, absent when the process died from a signal.
    pub code: Option<i32>,
    /// `None` on a zero exit; otherwise the exit status or wait failure.
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock seconds from spawn to exit.
    pub duration_secs: f64,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }
}

/// A started process: a handle to stop it and a receiver for its exit report.
#[derive(Debug)]
pub struct Spawned {
    pub handle: ProcessHandle,
    pub exit: oneshot::Receiver<ProcessExit>,
}

/// Launches supervised processes.
#[derive(Debug, Clone, Copy)]
pub struct ProcessSupervisor {
    grace: Duration,
    poll: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self {
            grace: STOP_GRACE,
            poll: STOP_POLL_INTERVAL,
        }
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the interrupt-to-kill grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Start `spec` and return once the process exists.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `Spawn`: the shell could not be started (missing workdir, no `sh`).
    pub fn spawn(&self, spec: &CommandSpec) -> Result<Spawned> {
        let mut command = shell(&spec.command);
        command
            .current_dir(&spec.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for entry in &spec.env {
            match split_env(entry) {
                Some((key, value)) => {
                    command.env(key, value);
                }
                None => warn!(entry = %entry, "skipping malformed environment entry"),
            }
        }
        #[cfg(unix)]
        command.process_group(0);

        let started = Instant::now();
        let mut child = command
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", spec.command)))?;
        let pid = child
            .id()
            .ok_or_else(|| ExecError::Spawn("process exited before its pid was read".into()))?;
        info!(pid, command = %spec.command, workdir = %spec.workdir.display(), "process started");

        let handle = ProcessHandle {
            inner: Arc::new(HandleInner {
                pid,
                exited: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                grace: self.grace,
                poll: self.poll,
            }),
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let inner = Arc::clone(&handle.inner);
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (cutoff, _) = watch::channel(false);
            // Both pipes are drained concurrently so a full stderr buffer
            // cannot stall stdout.
            let stdout = drain(stdout, "stdout", cutoff.subscribe());
            let stderr = drain(stderr, "stderr", cutoff.subscribe());
            let wait = async {
                let status = child.wait().await;
                inner.exited.store(true, Ordering::SeqCst);
                let duration_secs = started.elapsed().as_secs_f64();

                // Drains drop their receivers at EOF.
                let held_open = tokio::select! {
                    _ = cutoff.closed() => false,
                    _ = tokio::time::sleep(DRAIN_AFTER_EXIT) => true,
                };
                if held_open {
                    warn!(pid, "output still open after exit, killing leftover processes");
                    cutoff.send_replace(true);
                    if let Err(e) = signal::kill(pid) {
                        warn!(pid, error = %e, "leftover kill failed");
                    }
                }
                (status, duration_secs)
            };
            let ((status, duration_secs), stdout, stderr) = tokio::join!(wait, stdout, stderr);

            let (code, error) = classify(status);
            debug!(pid, ?code, duration_secs, "process exited");
            let _ = tx.send(ProcessExit {
                code,
                error,
                stdout,
                stderr,
                duration_secs,
            });
        });

        Ok(Spawned { handle, exit: rx })
    }
}

/// Shared view of a running process used to stop it.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    pid: u32,
    exited: AtomicBool,
    stopping: AtomicBool,
    grace: Duration,
    poll: Duration,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn has_exited(&self) -> bool {
        self.inner.exited.load(Ordering::SeqCst)
    }

    /// Interrupt the process group, wait up to the grace period, then kill it.
    ///
    /// The group is signalled even when the shell has already exited, so
    /// background descendants are stopped too. Safe to call concurrently or
    /// repeatedly: only the first call sends the interrupt, later calls join
    /// the wait.
    ///
    /// # Errors
    ///
    /// - `Signal`: the kill could not be delivered.
    /// - `Terminal`: the shell was still alive after the kill.
    pub async fn terminate(&self) -> Result<()> {
        let pid = self.pid();
        if self.is_gone() {
            return Ok(());
        }

        if !self.inner.stopping.swap(true, Ordering::SeqCst) {
            info!(pid, "interrupting process group");
            if let Err(e) = signal::interrupt(pid) {
                warn!(pid, error = %e, "interrupt failed");
            }
        }
        if self.wait_gone(self.inner.grace).await {
            return Ok(());
        }

        warn!(pid, grace_ms = self.inner.grace.as_millis() as u64, "process group outlived grace period, killing");
        signal::kill(pid)?;
        if self.wait_gone(KILL_CONFIRM).await {
            return Ok(());
        }
        if self.has_exited() {
            // Killed members nobody has reaped yet.
            warn!(pid, "process group still listed after kill");
            return Ok(());
        }
        error!(pid, "process still alive after kill");
        Err(ExecError::Terminal { pid })
    }

    /// The shell has exited and nothing in its group is left.
    fn is_gone(&self) -> bool {
        self.has_exited() && !signal::alive(self.pid())
    }

    async fn wait_gone(&self, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        loop {
            if self.is_gone() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(self.inner.poll).await;
        }
    }
}

#[cfg(unix)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

/// Split `KEY=VALUE`; the key must be non-empty.
fn split_env(entry: &str) -> Option<(&str, &str)> {
    entry
        .split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
}

/// Read `reader` to EOF, or until `cutoff` flips, and keep what arrived.
async fn drain<R: AsyncRead + Unpin>(
    reader: Option<R>,
    stream: &'static str,
    mut cutoff: watch::Receiver<bool>,
) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    warn!(stream, error = %e, "output read failed");
                    break;
                }
            },
            _ = cutoff.wait_for(|cut| *cut) => {
                debug!(stream, "output cut off");
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn classify(status: std::io::Result<ExitStatus>) -> (Option<i32>, Option<String>) {
    match status {
        Ok(status) if status.success() => (status.code(), None),
        Ok(status) => (status.code(), Some(status.to_string())),
        Err(e) => (None, Some(format!("wait failed: {e}"))),
    }
}
