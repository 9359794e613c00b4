//! Notifier task: turns driver events into structured log records.

use jobworker_driver::{DriverContext, DriverEvent, ExecState};
use jobworker_exec::truncate::clean_output;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Drain `events` until every sender is gone.
pub async fn run(mut events: mpsc::Receiver<DriverEvent>, max_output_chars: usize) {
    while let Some(event) = events.recv().await {
        report(&event, max_output_chars);
    }
    debug!("event channel closed, notifier stopped");
}

/// Context with captured output cleaned up for logging.
pub fn prepared(context: &DriverContext, max_output_chars: usize) -> DriverContext {
    DriverContext {
        stdout: clean_output(&context.stdout, max_output_chars),
        stderr: clean_output(&context.stderr, max_output_chars),
        ..context.clone()
    }
}

fn report(event: &DriverEvent, max_output_chars: usize) {
    let ctx = prepared(event.context(), max_output_chars);
    let next_at = ctx.next_at.map(|t| t.to_rfc3339()).unwrap_or_default();
    let exec_at = ctx.exec_at.map(|t| t.to_rfc3339()).unwrap_or_default();

    match event.state() {
        Some(ExecState::Failed) => warn!(
            event_id = %ctx.event_id,
            job_id = %ctx.job_id,
            kind = event.kind(),
            error = %ctx.exec_err,
            %exec_at,
            %next_at,
            stdout = %ctx.stdout,
            stderr = %ctx.stderr,
            "job failed"
        ),
        Some(ExecState::Started) => info!(
            event_id = %ctx.event_id,
            job_id = %ctx.job_id,
            name = %ctx.name,
            command = %ctx.command,
            workdir = %ctx.workdir.display(),
            %exec_at,
            "job started"
        ),
        Some(ExecState::Stopped) => info!(
            event_id = %ctx.event_id,
            job_id = %ctx.job_id,
            kind = event.kind(),
            %exec_at,
            %next_at,
            exec_secs = ctx.exec_secs,
            stdout = %ctx.stdout,
            stderr = %ctx.stderr,
            "job stopped"
        ),
        None => info!(
            event_id = %ctx.event_id,
            job_id = %ctx.job_id,
            %next_at,
            "job armed"
        ),
    }
}
