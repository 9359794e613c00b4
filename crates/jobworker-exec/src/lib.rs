//! jobworker-exec: launching, draining and stopping job processes.
//!
//! - [`supervisor::ProcessSupervisor`] spawns a command through the shell in
//!   its own process group and reports exit, output and duration.
//! - [`supervisor::ProcessHandle::terminate`] interrupts the group, polls for
//!   exit every 100 ms for up to 5 s, then kills it.
//! - [`script`] lays out job working directories and writes the launcher for
//!   jobs that ship no package.
//! - [`truncate`] trims captured output for logs and API responses.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use jobworker_exec::{CommandSpec, ProcessSupervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let spec = CommandSpec {
//!         command: "echo hello".into(),
//!         workdir: "/tmp".into(),
//!         env: vec!["GREETING=hi".into()],
//!     };
//!     let spawned = ProcessSupervisor::new().spawn(&spec).unwrap();
//!     let exit = spawned.exit.await.unwrap();
//!     println!("{} in {:.3}s", exit.stdout, exit.duration_secs);
//! }
//! ```

pub mod error;
pub mod script;
pub mod signal;
pub mod supervisor;
pub mod truncate;

pub use error::{ExecError, Result};
pub use supervisor::{CommandSpec, ProcessExit, ProcessHandle, ProcessSupervisor, Spawned};
