//! Interrupt and resume.

use crate::integration::test_utils::{plan, test_engine, transient, ScriptedService};
use chrono::Utc;
use genloom::job::JobStatus;
use genloom::results::ResultLog;
use genloom::types::JobId;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SIX: &str = r#"
name = "Six"
template = "frame {n}"

[variables]
n = ["1", "2", "3", "4", "5", "6"]

[overrides]
max_concurrency = 1
"#;

fn final_statuses(session: &genloom::session::Session) -> BTreeMap<JobId, JobStatus> {
    session.jobs.iter().map(|j| (j.id, j.status)).collect()
}

#[tokio::test(start_paused = true)]
async fn interrupted_session_resumes_to_the_same_result() {
    // Uninterrupted reference run.
    let reference_dir = TempDir::new().unwrap();
    let reference_engine = test_engine(&reference_dir, |_| {});
    let reference_service = Arc::new(
        ScriptedService::new(Arc::clone(reference_engine.artifacts()))
            .with_latency(Duration::from_secs(1)),
    );
    let session = reference_engine.plan(&plan(SIX), "six.toml").unwrap();
    let reference = reference_engine
        .run(session, reference_service, CancellationToken::new())
        .await
        .unwrap()
        .session;

    // Interrupted run.
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts())).with_latency(Duration::from_secs(1)),
    );
    let prepared = engine.prepare(&plan(SIX), "six.toml", None, false).unwrap();
    let session_id = prepared.session.id.clone();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        trigger.cancel();
    });
    let interrupted = engine
        .run(prepared.session, service.clone(), cancel)
        .await
        .unwrap();

    assert!(interrupted.cancelled);
    // The call in flight at cancellation was allowed to finish.
    assert_eq!(interrupted.session.counts.succeeded, 3);
    assert_eq!(interrupted.session.counts.pending, 3);
    assert!(interrupted.session.ended_at.is_none());

    let at_rest = engine.load_session(&session_id).unwrap();
    assert!(at_rest.jobs.iter().all(|j| j.status != JobStatus::Running));
    assert_eq!(at_rest.counts.succeeded, 3);

    // Resume.
    let prepared = engine.prepare(&plan(SIX), "six.toml", None, false).unwrap();
    assert!(prepared.resumed);
    let resumed = engine
        .run(prepared.session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert!(!resumed.cancelled);
    assert_eq!(final_statuses(&resumed.session), final_statuses(&reference));
    assert_eq!(service.call_count(), 6);

    let records = ResultLog::read(engine.results_path(&session_id)).unwrap();
    let ids: HashSet<JobId> = records.iter().map(|r| r.job_id).collect();
    assert_eq!(records.len(), 6);
    assert_eq!(ids.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn job_left_running_by_a_crash_is_retried_with_attempts_kept() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 3);
    let input = plan(
        r#"
name = "Crash"
template = "crash {x}"

[variables]
x = ["a"]
"#,
    );
    let mut session = engine.plan(&input, "crash.toml").unwrap();
    session.jobs[0].begin_attempt(Utc::now()).unwrap();
    engine.checkpoints().save(&session).unwrap();

    let prepared = engine.prepare(&input, "crash.toml", None, false).unwrap();
    assert!(prepared.resumed);
    assert_eq!(prepared.session.jobs[0].status, JobStatus::Pending);
    assert_eq!(prepared.session.jobs[0].attempts, 1);

    let service = Arc::new(ScriptedService::new(Arc::clone(engine.artifacts())));
    let outcome = engine
        .run(prepared.session, service.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.session.jobs[0].status, JobStatus::Succeeded);
    assert_eq!(outcome.session.jobs[0].attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn spent_retry_budget_is_closed_out_on_resume() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 1);
    let input = plan(
        r#"
name = "Spent"
template = "spent {x}"

[variables]
x = ["a"]
"#,
    );
    let mut session = engine.plan(&input, "spent.toml").unwrap();
    let now = Utc::now();
    let job = &mut session.jobs[0];
    job.begin_attempt(now).unwrap();
    job.fail(transient("busy"), false, now).unwrap();
    job.begin_attempt(now).unwrap();
    job.fail(transient("busy"), false, now).unwrap();
    engine.checkpoints().save(&session).unwrap();

    let prepared = engine.prepare(&input, "spent.toml", None, false).unwrap();
    let service = Arc::new(ScriptedService::new(Arc::clone(engine.artifacts())));
    let outcome = engine
        .run(prepared.session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let job = &outcome.session.jobs[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempts, 2);
    assert_eq!(service.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn job_cut_short_on_its_final_attempt_is_not_called_again() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 3);
    let input = plan(
        r#"
name = "Last Try"
template = "last {x}"

[variables]
x = ["a"]
"#,
    );
    let mut session = engine.plan(&input, "last.toml").unwrap();
    let now = Utc::now();
    let job = &mut session.jobs[0];
    for _ in 0..3 {
        job.begin_attempt(now).unwrap();
        job.fail(transient("busy"), false, now).unwrap();
    }
    // Fourth and final call in flight when the checkpoint is written.
    job.begin_attempt(now).unwrap();
    engine.checkpoints().save(&session).unwrap();

    let prepared = engine.prepare(&input, "last.toml", None, false).unwrap();
    assert!(prepared.resumed);
    assert_eq!(prepared.session.jobs[0].status, JobStatus::Pending);
    assert_eq!(prepared.session.jobs[0].attempts, 4);

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts())).always_failing(transient("busy")),
    );
    let outcome = engine
        .run(prepared.session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let job = &outcome.session.jobs[0];
    assert_eq!(service.call_count(), 0);
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempts, 4);

    let records = ResultLog::read(engine.results_path(&outcome.session.id)).unwrap();
    assert_eq!(records.len(), 1);
}
