//! End-to-end planning and run scenarios.

use crate::integration::test_utils::{plan, test_engine, transient, ScriptedService};
use genloom::job::JobStatus;
use genloom::results::ResultLog;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const PLAN_A: &str = r#"
name = "Scenario A"
template = "A {x} thing"

[variables]
x = ["a", "b"]
"#;

const PLAN_B: &str = r#"
name = "Scenario B"
template = "{style} poster, {count} items"

[variables]
style = ["s1", "s2", "s3"]
count = ["c1", "c2"]

[sampling]
mode = "random"
seed = 42
count = 3
"#;

#[tokio::test(start_paused = true)]
async fn scenario_a_all_mode_dispatches_both_jobs() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let session = engine.plan(&plan(PLAN_A), "a.toml").unwrap();

    assert_eq!(session.jobs.len(), 2);
    assert_eq!(session.jobs[0].bindings["x"], "a");
    assert_eq!(session.jobs[1].bindings["x"], "b");

    let service = Arc::new(ScriptedService::new(Arc::clone(engine.artifacts())));
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.cancelled);
    assert_eq!(service.call_count(), 2);
    assert_eq!(service.calls_for("A a thing"), 1);
    assert_eq!(service.calls_for("A b thing"), 1);
    assert!(outcome
        .session
        .jobs
        .iter()
        .all(|job| job.status == JobStatus::Succeeded && job.artifact_ref.is_some()));
    assert!(outcome.session.ended_at.is_some());

    let records = ResultLog::read(engine.results_path(&outcome.session.id)).unwrap();
    assert_eq!(records.len(), 2);
}

#[test]
fn scenario_b_random_sampling_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});

    let first = engine.plan(&plan(PLAN_B), "b.toml").unwrap();
    let second = engine.plan(&plan(PLAN_B), "b.toml").unwrap();

    assert_eq!(first.jobs.len(), 3);
    let bindings: Vec<_> = first.jobs.iter().map(|j| j.bindings.clone()).collect();
    let again: Vec<_> = second.jobs.iter().map(|j| j.bindings.clone()).collect();
    assert_eq!(bindings, again);

    let distinct: HashSet<Vec<(String, String)>> = bindings
        .iter()
        .map(|b| b.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .collect();
    assert_eq!(distinct.len(), 3);
    assert_eq!(first.id, second.id);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_concurrency_and_rate_bounds_hold() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| {
        config.scheduler.max_concurrency = 2;
        config.rate_limit.calls = 2;
        config.rate_limit.window_secs = 10;
    });
    let session = engine
        .plan(
            &plan(
                r#"
name = "Scenario C"
template = "job {n}"

[variables]
n = ["1", "2", "3", "4", "5"]
"#,
            ),
            "c.toml",
        )
        .unwrap();
    assert_eq!(session.jobs.len(), 5);

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts())).with_latency(Duration::from_secs(1)),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.session.counts.succeeded, 5);
    assert!(service.max_in_flight() <= 2);

    let window = Duration::from_secs(10);
    let starts: Vec<_> = service.calls().iter().map(|c| c.started).collect();
    assert_eq!(starts.len(), 5);
    for start in &starts {
        let in_window = starts
            .iter()
            .filter(|other| **other >= *start && **other < *start + window)
            .count();
        assert!(in_window <= 2, "{} calls within one window", in_window);
    }
}

#[tokio::test(start_paused = true)]
async fn scenario_d_transient_failures_then_success() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |config| config.retry.max_retries = 3);
    let session = engine
        .plan(
            &plan(
                r#"
name = "Scenario D"
template = "flaky {x}"

[variables]
x = ["one"]
"#,
            ),
            "d.toml",
        )
        .unwrap();

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts()))
            .fail_prompt("flaky one", vec![transient("busy"), transient("busy")]),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let job = &outcome.session.jobs[0];
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.is_none());
    assert_eq!(service.call_count(), 3);
}
