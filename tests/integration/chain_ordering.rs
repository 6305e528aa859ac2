//! Dependent chains: one step in flight at a time, context from earlier
//! successful steps only.

use crate::integration::test_utils::{plan, test_engine, ScriptedService};
use genloom::error::{ServiceError, ServiceErrorKind};
use genloom::job::JobStatus;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const STORY: &str = r#"
name = "Story"
template = "cover {v}"

[variables]
v = ["one", "two"]

[[chains]]
name = "story"
steps = ["page 0", "page 1", "page 2", "page 3"]

[overrides]
context_window = 2
max_concurrency = 4
"#;

#[tokio::test(start_paused = true)]
async fn chain_steps_call_in_order_with_prior_context() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let session = engine.plan(&plan(STORY), "story.toml").unwrap();
    assert_eq!(session.jobs.len(), 6);

    let service = Arc::new(
        ScriptedService::new(Arc::clone(engine.artifacts())).with_latency(Duration::from_secs(1)),
    );
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.session.counts.succeeded, 6);

    let chain_calls: Vec<_> = service
        .calls()
        .into_iter()
        .filter(|c| c.prompt.starts_with("page"))
        .collect();
    let prompts: Vec<&str> = chain_calls.iter().map(|c| c.prompt.as_str()).collect();
    assert_eq!(prompts, vec!["page 0", "page 1", "page 2", "page 3"]);

    // Each step starts only after the previous one returned.
    for pair in chain_calls.windows(2) {
        assert!(pair[1].started >= pair[0].started + Duration::from_secs(1));
    }

    let artifact_of = |index: u32| {
        outcome
            .session
            .jobs
            .iter()
            .find(|j| j.sequence_index == Some(index))
            .and_then(|j| j.artifact_ref.clone())
            .unwrap()
    };
    assert!(chain_calls[0].context.is_empty());
    assert_eq!(chain_calls[1].context, vec![artifact_of(0)]);
    assert_eq!(chain_calls[3].context, vec![artifact_of(1), artifact_of(2)]);

    for job in outcome.session.jobs.iter().filter(|j| j.is_chained()) {
        let index = job.sequence_index.unwrap();
        assert!(job.context_ref.len() <= 2);
        for reference in &job.context_ref {
            let source = outcome
                .session
                .jobs
                .iter()
                .find(|j| j.artifact_ref.as_ref() == Some(reference))
                .unwrap();
            assert!(source.sequence_index.unwrap() < index);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn failed_step_is_skipped_in_later_context() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir, |_| {});
    let session = engine
        .plan(
            &plan(
                r#"
name = "Gap"

[[chains]]
name = "doc"
steps = ["p0", "p1", "p2"]

[overrides]
context_window = 2
"#,
            ),
            "gap.toml",
        )
        .unwrap();

    let service = Arc::new(ScriptedService::new(Arc::clone(engine.artifacts())).fail_prompt(
        "p1",
        vec![ServiceError::new(ServiceErrorKind::InvalidRequest, "bad page")],
    ));
    let outcome = engine
        .run(session, service.clone(), CancellationToken::new())
        .await
        .unwrap();

    let jobs = &outcome.session.jobs;
    assert_eq!(jobs[0].status, JobStatus::Succeeded);
    assert_eq!(jobs[1].status, JobStatus::FailedTerminal);
    assert_eq!(jobs[2].status, JobStatus::Succeeded);
    assert_eq!(jobs[2].context_ref, vec![jobs[0].artifact_ref.clone().unwrap()]);
    assert_eq!(service.call_count(), 3);
}
