#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone};
use jobworker_core::JobId;
use jobworker_driver::{
    Driver, DriverEvent, ExecState, JobAction, JobDefinition, JobState,
};
use jobworker_exec::ProcessSupervisor;
use jobworker_scheduler::{FakeClock, Schedule, Timestamp, TurnMode};
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Harness {
    driver: Driver,
    clock: FakeClock,
    events: mpsc::UnboundedReceiver<DriverEvent>,
    dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (tx, events) = mpsc::unbounded_channel();
        let clock = FakeClock::new(at(8, 59, 0));
        let driver = Driver::with_parts(
            dir.path(),
            Arc::new(tx),
            Arc::new(clock.clone()),
            ProcessSupervisor::new().with_grace(Duration::from_millis(500)),
        );
        Self {
            driver,
            clock,
            events,
            dir,
        }
    }

    /// Definition whose working directory exists on disk.
    fn definition(&self, id: &str, cmd: &str, schedules: Vec<Schedule>) -> JobDefinition {
        std::fs::create_dir_all(self.dir.path().join(id)).unwrap();
        JobDefinition {
            job_id: JobId::from(id),
            name: format!("{id} job"),
            file_code: String::new(),
            cmd: cmd.to_string(),
            env: vec!["GREETING=hello".to_string()],
            timeout: 0,
            schedules,
            has_package: true,
        }
    }

    async fn next(&mut self) -> DriverEvent {
        tokio::time::timeout(Duration::from_secs(10), self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event channel closed")
    }

    async fn quiet(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.events.recv()).await.is_err()
    }
}

fn at(h: u32, m: u32, s: u32) -> Timestamp {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 1, h, m, s)
        .unwrap()
}

fn daily(id: &str, start_time: &str) -> Schedule {
    Schedule {
        id: id.to_string(),
        turn_mode: TurnMode::Daily,
        start_date: "01/01/2024".to_string(),
        start_time: start_time.to_string(),
        ..Schedule::default()
    }
}

fn assert_execute(event: &DriverEvent, expected: ExecState) {
    assert!(
        matches!(event, DriverEvent::Execute { state, .. } if *state == expected),
        "expected execute {expected}, got {event:?}"
    );
}

#[tokio::test]
async fn daily_rule_fires_and_rearms_for_the_next_day() {
    let mut h = Harness::new();
    let def = h.definition("nightly", "echo $GREETING", vec![daily("r1", "09:00")]);
    h.driver.set(def).await;

    let selected = h.next().await;
    assert!(matches!(selected, DriverEvent::Select { .. }));
    assert_eq!(selected.context().next_at, Some(at(9, 0, 0)));

    h.driver.dispatch();
    assert!(h.quiet(Duration::from_millis(100)).await);

    h.clock.set(at(9, 0, 0));
    h.driver.dispatch();
    h.clock.set(at(9, 0, 1));

    let started = h.next().await;
    assert_execute(&started, ExecState::Started);
    assert_eq!(started.context().exec_at, Some(at(9, 0, 0)));
    assert_eq!(started.context().next_at, None);
    assert_eq!(h.driver.job("nightly").unwrap().state, JobState::Running);

    let done = h.next().await;
    assert_execute(&done, ExecState::Stopped);
    let ctx = done.context();
    assert_eq!(ctx.stdout.trim(), "hello");
    assert!(ctx.exec_err.is_empty());
    assert_eq!(ctx.exec_at, Some(at(9, 0, 0)));
    assert_eq!(
        ctx.next_at,
        Some(at(9, 0, 0) + chrono::Duration::days(1))
    );

    let snapshot = h.driver.job("nightly").unwrap();
    assert_eq!(snapshot.state, JobState::Waiting);
    assert_eq!(snapshot.last_exec_at, Some(at(9, 0, 0)));
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn earliest_rule_wins_and_ties_go_to_lowest_id() {
    let mut h = Harness::new();
    let def = h.definition(
        "multi",
        "true",
        vec![daily("c", "11:00"), daily("b", "10:00"), daily("a", "10:00")],
    );
    h.driver.set(def).await;

    let selected = h.next().await;
    assert_eq!(selected.context().next_at, Some(at(10, 0, 0)));
    assert_eq!(h.driver.job("multi").unwrap().selected.as_deref(), Some("a"));
}

#[tokio::test]
async fn selection_outcomes_without_a_usable_rule() {
    let mut h = Harness::new();

    let mut off = daily("r1", "09:00");
    off.enabled = false;
    let def = h.definition("disabled", "true", vec![off]);
    h.driver.set(def).await;
    let def = h.definition("empty", "true", vec![]);
    h.driver.set(def).await;
    assert!(h.quiet(Duration::from_millis(100)).await);

    let mut expired = daily("r1", "09:00");
    expired.end_date = "02/01/2024".to_string();
    let def = h.definition("expired", "true", vec![expired]);
    h.driver.set(def).await;

    let failed = h.next().await;
    assert_execute(&failed, ExecState::Failed);
    assert_eq!(failed.context().exec_err, "job all schedules invalid.");
    assert_eq!(failed.context().next_at, None);
}

#[tokio::test]
async fn manual_start_on_a_rule_less_job() {
    let mut h = Harness::new();
    let def = h.definition("adhoc", "echo manual", vec![]);
    h.driver.set(def).await;

    h.driver.action("adhoc", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);

    let done = h.next().await;
    assert_execute(&done, ExecState::Stopped);
    assert_eq!(done.context().stdout.trim(), "manual");
    assert_eq!(done.context().next_at, None);
    assert_eq!(h.driver.job("adhoc").unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn failing_command_reports_an_exception() {
    let mut h = Harness::new();
    let def = h.definition("broken", "echo oops >&2; exit 3", vec![]);
    h.driver.set(def).await;

    h.driver.action("broken", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);

    let done = h.next().await;
    assert_execute(&done, ExecState::Failed);
    assert!(done
        .context()
        .exec_err
        .starts_with("job execute exception:"));
    assert_eq!(done.context().stderr.trim(), "oops");

    // An idle stop now echoes the remembered failure.
    h.driver.action("broken", JobAction::Stop).await.unwrap();
    let echo = h.next().await;
    assert!(matches!(
        echo,
        DriverEvent::Stopped {
            state: ExecState::Failed,
            ..
        }
    ));
    assert!(echo.context().exec_err.starts_with("job execute exception:"));
}

#[tokio::test]
async fn missing_workdir_fails_without_running() {
    let mut h = Harness::new();
    let mut def = h.definition("nowhere", "true", vec![]);
    def.file_code = "v9".to_string();
    h.driver.set(def).await;

    h.driver.action("nowhere", JobAction::Start).await.unwrap();
    let failed = h.next().await;
    assert_execute(&failed, ExecState::Failed);
    assert!(failed
        .context()
        .exec_err
        .starts_with("job execute exception:"));
    assert_eq!(h.driver.job("nowhere").unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn idle_stop_echoes_status() {
    let mut h = Harness::new();
    let def = h.definition("idle", "true", vec![daily("r1", "09:00")]);
    h.driver.set(def).await;
    h.next().await;

    h.driver.action("idle", JobAction::Stop).await.unwrap();
    let echo = h.next().await;
    assert!(matches!(
        echo,
        DriverEvent::Stopped {
            state: ExecState::Stopped,
            ..
        }
    ));
    assert!(echo.context().exec_err.is_empty());
    assert_eq!(echo.context().exec_at, None);
    assert_eq!(echo.context().next_at, Some(at(9, 0, 0)));
}

#[tokio::test]
async fn idle_stop_on_a_rule_less_job() {
    let mut h = Harness::new();
    let def = h.definition("manual", "true", vec![]);
    h.driver.set(def).await;
    assert!(h.quiet(Duration::from_millis(100)).await);

    h.driver.action("manual", JobAction::Stop).await.unwrap();
    let echo = h.next().await;
    assert!(matches!(
        echo,
        DriverEvent::Stopped {
            state: ExecState::Stopped,
            ..
        }
    ));
    assert!(echo.context().exec_err.is_empty());
    assert_eq!(echo.context().exec_at, None);
    assert_eq!(echo.context().next_at, None);
    assert_eq!(h.driver.job("manual").unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn stop_while_running_is_not_a_failure() {
    let mut h = Harness::new();
    let def = h.definition("long", "sleep 30", vec![]);
    h.driver.set(def).await;

    h.driver.action("long", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);

    // A second start while running is ignored.
    h.driver.action("long", JobAction::Start).await.unwrap();

    h.driver.action("long", JobAction::Stop).await.unwrap();
    let done = h.next().await;
    assert_execute(&done, ExecState::Stopped);
    assert!(done.context().exec_err.is_empty());
    assert!(done.context().exec_secs < 10.0);
    assert!(h.quiet(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn deadline_kills_the_run_and_reports_failure() {
    let mut h = Harness::new();
    let mut def = h.definition("slow", "sleep 30", vec![]);
    def.timeout = 2;
    h.driver.set(def).await;

    h.driver.action("slow", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);
    assert_eq!(
        h.driver.job("slow").unwrap().deadline,
        Some(at(8, 59, 2))
    );

    h.clock.set(at(8, 59, 1));
    h.driver.dispatch();
    assert!(h.quiet(Duration::from_millis(100)).await);

    h.clock.set(at(8, 59, 2));
    h.driver.dispatch();
    let done = h.next().await;
    assert_execute(&done, ExecState::Failed);
    assert_eq!(
        done.context().exec_err,
        "the job has been executed for too long and has exceeded the timeout threshold."
    );
    assert_eq!(h.driver.job("slow").unwrap().deadline, None);
}

#[tokio::test]
async fn unrepresentable_timeout_runs_without_a_deadline() {
    let mut h = Harness::new();
    let mut def = h.definition("endless", "sleep 30", vec![]);
    def.timeout = u64::MAX / 4;
    h.driver.set(def).await;

    h.driver.action("endless", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);
    let snapshot = h.driver.job("endless").unwrap();
    assert_eq!(snapshot.state, JobState::Running);
    assert_eq!(snapshot.deadline, None);

    h.driver.dispatch();
    assert!(h.quiet(Duration::from_millis(100)).await);

    h.driver.action("endless", JobAction::Stop).await.unwrap();
    assert_execute(&h.next().await, ExecState::Stopped);
}

#[tokio::test]
async fn removing_a_running_rule_retires_its_unit() {
    let mut h = Harness::new();
    let def = h.definition("swap", "sleep 30", vec![daily("old", "09:00")]);
    h.driver.set(def).await;
    h.next().await;

    h.clock.set(at(9, 0, 0));
    h.driver.dispatch();
    assert_execute(&h.next().await, ExecState::Started);

    let def = h.definition("swap", "sleep 30", vec![daily("new", "10:00")]);
    h.driver.set(def).await;

    let done = h.next().await;
    assert_execute(&done, ExecState::Stopped);
    assert_eq!(done.context().next_at, Some(at(10, 0, 0)));

    let snapshot = h.driver.job("swap").unwrap();
    assert_eq!(snapshot.state, JobState::Waiting);
    let ids: Vec<_> = snapshot.rules.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["new"]);
}

#[tokio::test]
async fn remove_and_clear_stop_running_jobs() {
    let mut h = Harness::new();
    for id in ["one", "two"] {
        let def = h.definition(id, "sleep 30", vec![]);
        h.driver.set(def).await;
        h.driver.action(id, JobAction::Start).await.unwrap();
        assert_execute(&h.next().await, ExecState::Started);
    }

    assert!(h.driver.remove("one").await);
    assert!(h.driver.job("one").is_none());

    h.driver.clear().await;
    assert!(h.driver.is_empty());
    assert!(h.quiet(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn background_child_does_not_keep_the_job_running() {
    let mut h = Harness::new();
    let def = h.definition("spawner", "sleep 30 & echo x", vec![]);
    h.driver.set(def).await;

    h.driver.action("spawner", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);

    let done = h.next().await;
    assert_execute(&done, ExecState::Stopped);
    assert_eq!(done.context().stdout.trim(), "x");
    assert!(done.context().exec_secs < 5.0);
    assert_eq!(h.driver.job("spawner").unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn stop_reaches_background_children() {
    let mut h = Harness::new();
    let def = h.definition("holder", "sleep 30 & echo x; sleep 30", vec![]);
    h.driver.set(def).await;

    h.driver.action("holder", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        h.driver.action("holder", JobAction::Stop),
    )
    .await
    .expect("stop did not return")
    .unwrap();
    let done = h.next().await;
    assert_execute(&done, ExecState::Stopped);
    assert!(done.context().exec_err.is_empty());
    assert_eq!(done.context().stdout.trim(), "x");
    assert!(done.context().exec_secs < 5.0);
    assert_eq!(h.driver.job("holder").unwrap().state, JobState::Waiting);
}

#[tokio::test]
async fn deadline_reaches_background_children() {
    let mut h = Harness::new();
    let mut def = h.definition("lingering", "sleep 30 & sleep 30", vec![]);
    def.timeout = 1;
    h.driver.set(def).await;

    h.driver.action("lingering", JobAction::Start).await.unwrap();
    assert_execute(&h.next().await, ExecState::Started);
    tokio::time::sleep(Duration::from_millis(200)).await;

    h.clock.set(at(8, 59, 1));
    h.driver.dispatch();
    let done = h.next().await;
    assert_execute(&done, ExecState::Failed);
    assert_eq!(
        done.context().exec_err,
        "the job has been executed for too long and has exceeded the timeout threshold."
    );
    assert_eq!(h.driver.job("lingering").unwrap().state, JobState::Waiting);
}
