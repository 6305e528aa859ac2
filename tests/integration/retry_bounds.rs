//! Retry budget, terminal classification and call timeouts.

use crate::integration::test_utils::{plan, test_engine, transient, ScriptedService};
use genloom::error::{ServiceError, ServiceErrorKind};
use genloom::job::JobStatus;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ONE_JOB: &str = r#"
name = "Retry"
template = "retry {x}"

[variables]
x = ["me"]
"#;

#[tokio::test(start_paused = true)]
async fn exhausted_retries_end_failed_terminal() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 2);
    let session = engine.plan(&plan(ONE_JOB), "retry.toml").unwrap();

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts())).always_failing(transient("down")),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let job = &outcome.session.jobs[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempts, 3);
    assert_eq!(service.call_count(), 3);
    assert_eq!(
        job.last_error.as_ref().map(|e| e.kind),
        Some(ServiceErrorKind::Unavailable)
    );
    assert_eq!(outcome.session.counts.failed, 1);
    // The session still completes: a failed job does not abort it.
    assert!(outcome.session.is_complete());
}

#[tokio::test(start_paused = true)]
async fn terminal_error_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 5);
    let session = engine.plan(&plan(ONE_JOB), "retry.toml").unwrap();

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts()))
            .always_failing(ServiceError::new(ServiceErrorKind::Denied, "blocked")),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let job = &outcome.session.jobs[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempts, 1);
    assert_eq!(service.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn call_timeout_counts_as_retryable() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| {
        config.retry.max_retries = 1;
        config.scheduler.call_timeout_secs = 1;
    });
    let session = engine.plan(&plan(ONE_JOB), "retry.toml").unwrap();

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts())).with_latency(Duration::from_secs(5)),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let job = &outcome.session.jobs[0];
    assert_eq!(job.status, JobStatus::FailedTerminal);
    assert_eq!(job.attempts, 2);
    assert_eq!(service.call_count(), 2);
    assert_eq!(
        job.last_error.as_ref().map(|e| e.kind),
        Some(ServiceErrorKind::Timeout)
    );
}

#[tokio::test(start_paused = true)]
async fn one_failing_job_does_not_block_others() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 0);
    let session = engine
        .plan(
            &plan(
                r#"
name = "Mixed"
template = "item {x}"

[variables]
x = ["good", "bad", "fine"]
"#,
            ),
            "mixed.toml",
        )
        .unwrap();

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts()))
            .fail_prompt("item bad", vec![transient("boom")]),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.session.counts.succeeded, 2);
    assert_eq!(outcome.session.counts.failed, 1);
    let failed: Vec<_> = outcome.session.failed_jobs().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].prompt, "item bad");
}
