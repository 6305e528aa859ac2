//! Content-keyed cache shared across sessions.

use crate::integration::test_utils::{plan, test_engine, ScriptedService};
use genloom::job::JobStatus;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn same_job_in_a_later_session_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let service = Arc::new(ScriptedService::new(Arc::clone(engine.artifacts())));

    let first = engine
        .plan(
            &plan(
                r#"
name = "first"
template = "A {x} thing"

[variables]
x = ["a", "b"]
"#,
            ),
            "first.toml",
        )
        .unwrap();
    let first = engine
        .run(first, service.clone(), CancellationToken::new())
        .await
        .unwrap()
        .session;
    assert_eq!(service.call_count(), 2);

    let second = engine
        .plan(
            &plan(
                r#"
name = "second"
template = "A {x} thing"

[variables]
x = ["a", "b", "c"]
"#,
            ),
            "second.toml",
        )
        .unwrap();
    let second = engine
        .run(second, service.clone(), CancellationToken::new())
        .await
        .unwrap()
        .session;

    assert_eq!(service.call_count(), 3);
    assert_eq!(service.calls_for("A a thing"), 1);
    assert_eq!(second.counts.cached, 2);
    assert_eq!(second.counts.succeeded, 1);

    for job in second.jobs.iter().filter(|j| j.status == JobStatus::Cached) {
        let original = first
            .jobs
            .iter()
            .find(|j| j.content_key == job.content_key)
            .unwrap();
        assert_eq!(job.artifact_ref, original.artifact_ref);
        assert_eq!(job.attempts, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn fresh_rerun_makes_no_calls() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let input = plan(
        r#"
name = "again"
template = "draw {x}"

[variables]
x = ["cat", "dog"]
"#,
    );
    let service = Arc::new(ScriptedService::new(Arc::clone(engine.artifacts())));

    let prepared = engine.prepare(&input, "again.toml", None, false).unwrap();
    engine
        .run(prepared.session, service.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(service.call_count(), 2);

    let prepared = engine.prepare(&input, "again.toml", None, true).unwrap();
    assert!(!prepared.resumed);
    let outcome = engine
        .run(prepared.session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(service.call_count(), 2);
    assert_eq!(outcome.session.counts.cached, 2);
    assert_eq!(engine.cache().stats().unwrap().total_hits, 2);
}
