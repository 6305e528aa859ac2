//! Scheduler
//!
//! Drives a session to completion with a bounded pool of workers pulling
//! ready jobs from a shared queue. Independent jobs are all ready up front;
//! each dependent chain contributes one ready job at a time, and releases
//! its next step only once the current one is terminal.
//!
//! Per job: compute context and content key, check the cache, and on a miss
//! loop over `acquire → call → classify`, sleeping the backoff delay between
//! retryable failures. Terminal transitions are queued under the state lock
//! and written to the result log (and the periodic checkpoint) after it is
//! released, one writer at a time, in completion order.
//!
//! Cancellation stops dispatching. Calls already in flight run to completion
//! or timeout; waits on the rate limiter and backoff sleeps end immediately.
//! A final checkpoint is always written and never holds a `Running` job.

use crate::cache::{ArtifactCache, PutOutcome};
use crate::checkpoint::CheckpointStore;
use crate::context::ContextTracker;
use crate::error::{EngineError, ServiceError};
use crate::fingerprint::{compute_content_key, context_fingerprint};
use crate::job::{Job, JobStatus};
use crate::ratelimit::RateLimiter;
use crate::results::{ResultLog, ResultRecord};
use crate::retry::{Classification, RetryPolicy};
use crate::service::{GenerationRequest, GenerationService};
use crate::session::Session;
use crate::types::{key_hex, ContentKey, JobId};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub max_concurrency: usize,
    /// Bound on a single service call.
    pub call_timeout: Duration,
    /// Save a checkpoint after this many terminal transitions.
    pub checkpoint_every: usize,
    /// Prior chain artifacts handed to each chain step.
    pub context_window: usize,
}

/// Result of a scheduler run.
#[derive(Debug)]
pub struct RunOutcome {
    pub session: Session,
    pub cancelled: bool,
}

pub struct Scheduler {
    service: Arc<dyn GenerationService>,
    cache: Arc<ArtifactCache>,
    checkpoints: Arc<CheckpointStore>,
    results: Arc<ResultLog>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    options: SchedulerOptions,
}

struct RunState {
    session: Session,
    tracker: ContextTracker,
    ready: VecDeque<JobId>,
    /// Steps of each chain not yet released, in sequence order.
    chain_backlog: HashMap<String, VecDeque<JobId>>,
    /// Jobs not yet terminal.
    remaining: usize,
    since_checkpoint: usize,
    /// Result records not yet appended, in completion order.
    outbox: VecDeque<ResultRecord>,
    /// Latest session state awaiting a checkpoint write.
    pending_checkpoint: Option<Session>,
}

struct Shared {
    service: Arc<dyn GenerationService>,
    cache: Arc<ArtifactCache>,
    checkpoints: Arc<CheckpointStore>,
    results: Arc<ResultLog>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    options: SchedulerOptions,
    state: Mutex<RunState>,
    /// Serializes result log and checkpoint writes. Never taken while
    /// `state` is held.
    writer: Mutex<()>,
    notify: Notify,
}

/// Everything a worker needs to call the service for one job.
struct Dispatch {
    key: ContentKey,
    request: GenerationRequest,
}

enum Prepared {
    Ready(Dispatch),
    /// The job reached a terminal status during preparation.
    Done,
}

impl Scheduler {
    pub fn new(
        service: Arc<dyn GenerationService>,
        cache: Arc<ArtifactCache>,
        checkpoints: Arc<CheckpointStore>,
        results: Arc<ResultLog>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            service,
            cache,
            checkpoints,
            results,
            limiter,
            retry,
            options,
        }
    }

    /// Run every non-terminal job of the session.
    ///
    /// Jobs already `Succeeded`, `Cached` or `FailedTerminal` are skipped.
    pub async fn run(
        &self,
        mut session: Session,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        session.prepare_for_resume();
        let tracker = ContextTracker::from_session(&session, self.options.context_window);

        let mut ready = VecDeque::new();
        for job in session.independent_jobs() {
            if !job.status.is_terminal() {
                ready.push_back(job.id);
            }
        }
        let mut chain_backlog = HashMap::new();
        for (chain, steps) in session.chains() {
            let mut backlog: VecDeque<JobId> = steps
                .into_iter()
                .filter(|id| session.job(*id).is_some_and(|job| !job.status.is_terminal()))
                .collect();
            if let Some(first) = backlog.pop_front() {
                ready.push_back(first);
            }
            chain_backlog.insert(chain, backlog);
        }
        let remaining = session
            .jobs
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count();

        info!(
            session_id = %session.id,
            service = self.service.service_name(),
            total = session.jobs.len(),
            remaining,
            max_concurrency = self.options.max_concurrency,
            "Starting session"
        );

        let shared = Arc::new(Shared {
            service: Arc::clone(&self.service),
            cache: Arc::clone(&self.cache),
            checkpoints: Arc::clone(&self.checkpoints),
            results: Arc::clone(&self.results),
            limiter: Arc::clone(&self.limiter),
            retry: self.retry.clone(),
            options: self.options.clone(),
            state: Mutex::new(RunState {
                session,
                tracker,
                ready,
                chain_backlog,
                remaining,
                since_checkpoint: 0,
                outbox: VecDeque::new(),
                pending_checkpoint: None,
            }),
            writer: Mutex::new(()),
            notify: Notify::new(),
        });

        let workers = self.options.max_concurrency.max(1);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(worker_loop(worker_id, shared, cancel)));
        }
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Scheduler worker panicked");
            }
        }

        flush_writes(&shared);
        let mut session = match Arc::try_unwrap(shared) {
            Ok(shared) => shared.state.into_inner().session,
            Err(shared) => shared.state.lock().session.clone(),
        };
        for job in &mut session.jobs {
            if job.status == JobStatus::Running {
                warn!(job_id = %job.id, "Job still running after workers stopped; reverting to pending");
                let _ = job.revert_to_pending();
            }
        }
        session.recount();
        let complete = session.is_complete();
        let cancelled = cancel.is_cancelled() && !complete;
        if complete {
            session.ended_at = Some(Utc::now());
        }
        self.checkpoints.save(&session)?;

        info!(
            session_id = %session.id,
            succeeded = session.counts.succeeded,
            cached = session.counts.cached,
            failed = session.counts.failed,
            pending = session.counts.pending,
            cancelled,
            "Session stopped"
        );
        Ok(RunOutcome { session, cancelled })
    }
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, cancel: CancellationToken) {
    debug!(worker_id, "Worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Register interest before looking at the queue so a release between
        // the check and the wait is not missed.
        let notified = shared.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let next = {
            let mut state = shared.state.lock();
            if state.remaining == 0 {
                None
            } else {
                Some(state.ready.pop_front())
            }
        };

        match next {
            None => break,
            Some(Some(job_id)) => process_job(worker_id, &shared, job_id, &cancel).await,
            Some(None) => {
                tokio::select! {
                    _ = &mut notified => {}
                    _ = cancel.cancelled() => break,
                }
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

async fn process_job(worker_id: usize, shared: &Shared, job_id: JobId, cancel: &CancellationToken) {
    let dispatch = match prepare(shared, job_id) {
        Prepared::Ready(dispatch) => dispatch,
        Prepared::Done => {
            flush_writes(shared);
            return;
        }
    };

    match shared.cache.get(&dispatch.key) {
        Ok(Some(artifact)) => {
            info!(worker_id, job_id = %job_id, artifact = %artifact, "Cache hit");
            finish(shared, job_id, |job| job.serve_from_cache(artifact, Utc::now()));
            return;
        }
        Ok(None) => {}
        Err(e) => warn!(job_id = %job_id, error = %e, "Cache lookup failed; calling service"),
    }

    let Dispatch { key, request } = dispatch;

    loop {
        if shared.limiter.acquire(cancel).await.is_err() {
            debug!(job_id = %job_id, "Cancelled while waiting for rate limit");
            return;
        }

        let attempts = {
            let mut state = shared.state.lock();
            let begun = match state.session.job_mut(job_id) {
                Some(job) => job.begin_attempt(Utc::now()).map(|()| job.attempts),
                None => return,
            };
            match begun {
                Ok(attempts) => attempts,
                Err(e) => {
                    error!(error = %e, "Refusing to dispatch job");
                    abandon_locked(shared, &mut state, job_id);
                    return;
                }
            }
        };
        info!(
            worker_id,
            job_id = %job_id,
            attempt = attempts,
            content_key = %key_hex(&key),
            "Dispatching job"
        );

        let call = shared.service.generate(request.clone());
        let result = match tokio::time::timeout(shared.options.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::timeout(format!(
                "call exceeded {}s",
                shared.options.call_timeout.as_secs_f64()
            ))),
        };

        match result {
            Ok(artifact) => {
                match shared.cache.put(&key, &artifact) {
                    Ok(PutOutcome::Collision { previous }) => warn!(
                        job_id = %job_id,
                        previous = %previous,
                        "Content key collision; keeping fresh artifact"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(job_id = %job_id, error = %e, "Failed to cache artifact"),
                }
                info!(job_id = %job_id, attempt = attempts, artifact = %artifact, "Job succeeded");
                finish(shared, job_id, |job| job.succeed(artifact, Utc::now()));
                return;
            }
            Err(err) => {
                let classification = shared.retry.classify(&err);
                let terminal = classification == Classification::Terminal
                    || !shared.retry.can_retry(attempts);
                if terminal {
                    error!(
                        job_id = %job_id,
                        attempt = attempts,
                        kind = %err.kind,
                        error = %err.message,
                        "Job failed permanently"
                    );
                    finish(shared, job_id, |job| job.fail(err, true, Utc::now()));
                    return;
                }

                let delay = shared.retry.jittered_delay(attempts, &key);
                warn!(
                    job_id = %job_id,
                    attempt = attempts,
                    kind = %err.kind,
                    error = %err.message,
                    delay_ms = delay.as_millis() as u64,
                    "Retry scheduled"
                );
                {
                    let mut state = shared.state.lock();
                    if let Some(job) = state.session.job_mut(job_id) {
                        if let Err(e) = job.fail(err, false, Utc::now()) {
                            error!(error = %e, "Failed to record retryable failure");
                            return;
                        }
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        debug!(job_id = %job_id, "Cancelled during backoff");
                        return;
                    }
                }
            }
        }
    }
}

/// Fix the job's context and content key. Jobs whose budget is already spent
/// are closed out here without another call.
fn prepare(shared: &Shared, job_id: JobId) -> Prepared {
    let mut guard = shared.state.lock();
    let state = &mut *guard;
    let generation = state.session.generation.clone();
    let Some(job) = state.session.job_mut(job_id) else {
        error!(job_id = %job_id, "Queued job is missing from the session");
        abandon_locked(shared, state, job_id);
        return Prepared::Done;
    };

    if job.status.is_terminal() {
        return Prepared::Done;
    }

    if let (Some(chain), Some(index)) = (&job.chain, job.sequence_index) {
        job.context_ref = state.tracker.context_for(chain, index);
    }
    let key = compute_content_key(
        &job.prompt,
        &job.bindings,
        &context_fingerprint(&job.context_ref),
        &generation,
    );
    job.content_key = Some(key);

    let dispatch = Dispatch {
        key,
        request: GenerationRequest {
            prompt: job.prompt.clone(),
            context: job.context_ref.clone(),
            config: generation,
        },
    };

    // Attempts survive checkpoints, so a job restored as `Pending` may have
    // spent its budget on a call that was cut short.
    if !shared.retry.can_retry(job.attempts) {
        warn!(
            job_id = %job_id,
            attempts = job.attempts,
            max_attempts = shared.retry.max_attempts(),
            "Retry budget spent; closing out job"
        );
        match job.exhaust(Utc::now()) {
            Ok(()) => complete_locked(shared, state, job_id),
            Err(e) => {
                error!(error = %e, "Failed to close out exhausted job");
                abandon_locked(shared, state, job_id);
            }
        }
        return Prepared::Done;
    }

    Prepared::Ready(dispatch)
}

/// Apply a terminal transition and do the bookkeeping that follows it.
fn finish<F>(shared: &Shared, job_id: JobId, transition: F)
where
    F: FnOnce(&mut Job) -> Result<(), crate::job::InvalidTransition>,
{
    {
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        let Some(job) = state.session.job_mut(job_id) else {
            return;
        };
        if let Err(e) = transition(job) {
            error!(error = %e, "Rejected job transition");
            abandon_locked(shared, state, job_id);
            return;
        }
        complete_locked(shared, state, job_id);
    }
    flush_writes(shared);
}

/// Write queued result records and the latest pending checkpoint.
///
/// Callers must not hold the state lock.
fn flush_writes(shared: &Shared) {
    let _writer = shared.writer.lock();
    let (records, checkpoint) = {
        let mut state = shared.state.lock();
        (
            std::mem::take(&mut state.outbox),
            state.pending_checkpoint.take(),
        )
    };

    for record in records {
        if let Err(e) = shared.results.append(&record) {
            error!(job_id = %record.job_id, error = %e, "Failed to append result record");
        }
    }
    if let Some(session) = checkpoint {
        if let Err(e) = shared.checkpoints.save(&session) {
            error!(session_id = %session.id, error = %e, "Failed to save checkpoint");
        }
    }
}

/// Stop tracking a job that cannot make progress so the run still drains.
fn abandon_locked(shared: &Shared, state: &mut RunState, job_id: JobId) {
    warn!(job_id = %job_id, "Abandoning job for this run");
    let chain = state.session.job(job_id).and_then(|job| job.chain.clone());
    if let Some(next) = chain
        .as_ref()
        .and_then(|chain| state.chain_backlog.get_mut(chain))
        .and_then(|backlog| backlog.pop_front())
    {
        state.ready.push_back(next);
    }
    state.remaining = state.remaining.saturating_sub(1);
    shared.notify.notify_waiters();
}

fn complete_locked(shared: &Shared, state: &mut RunState, job_id: JobId) {
    let Some(job) = state.session.job(job_id) else {
        return;
    };
    debug_assert!(job.status.is_terminal());

    state
        .outbox
        .push_back(ResultRecord::from_job(&state.session.id, job));

    if let (Some(chain), Some(index)) = (job.chain.clone(), job.sequence_index) {
        if job.status.is_success() {
            if let Some(artifact) = job.artifact_ref.clone() {
                state.tracker.record_success(&chain, index, artifact);
            }
        }
        if let Some(next) = state
            .chain_backlog
            .get_mut(&chain)
            .and_then(|backlog| backlog.pop_front())
        {
            debug!(chain = %chain, next = %next, "Releasing next chain step");
            state.ready.push_back(next);
        }
    }

    state.remaining = state.remaining.saturating_sub(1);
    state.since_checkpoint += 1;
    if state.since_checkpoint >= shared.options.checkpoint_every.max(1) {
        state.session.recount();
        state.pending_checkpoint = Some(state.session.snapshot());
        state.since_checkpoint = 0;
    }

    shared.notify.notify_waiters();
}
