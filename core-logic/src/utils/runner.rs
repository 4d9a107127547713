use crate::aggregator::{EntityResult, EntityStatus, ResultAggregator};
use crate::config::BatchConfig;
use crate::report::RunReport;
use crate::traits::{Entity, Operation, Outcome};
use crate::utils::retry::RetryPolicy;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::task::{JoinError, JoinSet};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

pub const INELIGIBLE_REASON: &str = "insufficient balance";
pub const CANCELLED_REASON: &str = "cancelled";

/// Lifecycle of one entity inside a worker. `RetryWaiting` is the only
/// state that suspends on a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityState {
    Pending,
    Attempting(u32),
    RetryWaiting { next: u32, delay: Duration },
    Done(EntityStatus),
}

struct WorkerShared {
    operation: Arc<dyn Operation>,
    policy: RetryPolicy,
    aggregator: Arc<ResultAggregator>,
    queue: Mutex<VecDeque<Arc<Entity>>>,
    total: usize,
    completed: AtomicUsize,
    token: CancellationToken,
}

impl WorkerShared {
    fn next_entity(&self) -> Option<Arc<Entity>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    fn requeue(&self, entity: Arc<Entity>) {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_front(entity);
    }

    fn finish(&self, result: EntityResult) {
        let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        log_result(&result, self.total, self.policy.max_attempts);
        info!(target: "batch", "Progress: {}/{} completed", done, self.total);
        self.aggregator.record(result);
    }
}

/// Bounded worker pool that drives every entity through its retry loop.
///
/// Each worker takes one entity at a time from a shared queue and runs it to
/// a final status before taking the next, so at most `concurrency` entities
/// are in flight. `concurrency == 1` is plain sequential processing.
pub struct BatchRunner {
    operation: Arc<dyn Operation>,
    policy: RetryPolicy,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(operation: Arc<dyn Operation>, policy: RetryPolicy, concurrency: usize) -> Self {
        Self {
            operation,
            policy,
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_config(operation: Arc<dyn Operation>, config: &BatchConfig) -> Self {
        Self::new(operation, config.policy(), config.concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns a token cancelled on Ctrl+C.
    pub fn shutdown_on_ctrl_c() -> CancellationToken {
        let token = CancellationToken::new();
        let cloned_token = token.clone();

        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    warn!(target: "batch", "Received Ctrl+C. Finishing in-flight attempts...");
                    cloned_token.cancel();
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                }
            }
        });

        token
    }

    /// Processes every entity exactly once and returns once all of them have
    /// a final result. Cancelling `token` stops new attempts; entities that
    /// never finished are recorded as failed with [`CANCELLED_REASON`].
    pub async fn run(&self, entities: Vec<Entity>, token: CancellationToken) -> RunReport {
        let total = entities.len();
        let aggregator = Arc::new(ResultAggregator::new());
        let shared = Arc::new(WorkerShared {
            operation: self.operation.clone(),
            policy: self.policy.clone(),
            aggregator: aggregator.clone(),
            queue: Mutex::new(entities.into_iter().map(Arc::new).collect()),
            total,
            completed: AtomicUsize::new(0),
            token,
        });

        let workers = self.concurrency.min(total);
        info!(
            target: "batch",
            "Starting [{}] on {} entities with {} workers (max attempts: {})",
            self.operation.name(),
            total,
            workers,
            self.policy.max_attempts
        );

        let mut set = JoinSet::new();
        for i in 0..workers {
            let id = i + 1;
            let span = tracing::info_span!("worker", worker_id = format!("{:03}", id));
            set.spawn(worker_loop(shared.clone()).instrument(span));
        }

        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                error!("A worker task panicked or failed to join: {:?}", e);
            }
        }

        // Whatever is still queued was never started because of cancellation,
        // or because its worker died.
        while let Some(entity) = shared.next_entity() {
            let reason = if shared.token.is_cancelled() {
                CANCELLED_REASON.to_string()
            } else {
                "worker stopped before processing".to_string()
            };
            shared.finish(build_result(&entity, EntityStatus::Failed, 0, None, Some(reason), Duration::ZERO));
        }

        let report = RunReport::from_aggregator(&aggregator, self.operation.metadata());
        log_summary(&aggregator, workers);
        report
    }
}

async fn worker_loop(shared: Arc<WorkerShared>) {
    let mut first = true;

    loop {
        if shared.token.is_cancelled() {
            info!("Worker stopping (cancelled).");
            break;
        }

        let Some(entity) = shared.next_entity() else {
            break;
        };

        let pacing = shared.policy.entity_pacing;
        if !first && !pacing.is_zero() {
            tokio::select! {
                _ = shared.token.cancelled() => {
                    shared.requeue(entity);
                    info!("Worker stopping (cancelled during pacing).");
                    break;
                }
                _ = sleep(pacing) => {}
            }
        }
        first = false;

        let attempts = Arc::new(AtomicU32::new(0));
        let start_time = Instant::now();
        let handle = tokio::spawn(process_entity(shared.clone(), entity.clone(), attempts.clone()));

        let result = match handle.await {
            Ok(result) => result,
            Err(e) => build_result(
                &entity,
                EntityStatus::Failed,
                attempts.load(Ordering::SeqCst),
                None,
                Some(describe_join_error(e)),
                start_time.elapsed(),
            ),
        };

        shared.finish(result);
    }
}

async fn process_entity(shared: Arc<WorkerShared>, entity: Arc<Entity>, attempts: Arc<AtomicU32>) -> EntityResult {
    let start_time = Instant::now();
    let policy = &shared.policy;
    let mut last: Option<Outcome> = None;
    let mut state = EntityState::Pending;

    let status = loop {
        state = match state {
            EntityState::Pending => {
                if !shared.operation.is_eligible(&entity) {
                    return build_result(
                        &entity,
                        EntityStatus::Failed,
                        0,
                        None,
                        Some(INELIGIBLE_REASON.to_string()),
                        start_time.elapsed(),
                    );
                }
                EntityState::Attempting(1)
            }
            EntityState::Attempting(attempt) => {
                if shared.token.is_cancelled() {
                    return cancelled_result(&entity, attempt - 1, last, start_time.elapsed());
                }

                attempts.store(attempt, Ordering::SeqCst);
                let outcome = shared.operation.attempt(&entity, attempt).await;
                let decision = policy.should_retry(&outcome, attempt);

                let next = match &outcome {
                    Outcome::Success(_) => EntityState::Done(EntityStatus::Success),
                    Outcome::TerminalFailure(_) => EntityState::Done(EntityStatus::AlreadyClaimed),
                    Outcome::RetryableFailure(_) if decision.retry => {
                        warn!(
                            target: "entity_result",
                            "[{}/{}] Attempt {}/{} failed for {}: {}. Retrying in {:.1}s",
                            entity.index() + 1,
                            shared.total,
                            attempt,
                            policy.max_attempts,
                            entity.address(),
                            outcome.detail().reason.as_deref().unwrap_or("unknown error"),
                            decision.delay.as_secs_f64()
                        );
                        EntityState::RetryWaiting {
                            next: attempt + 1,
                            delay: decision.delay,
                        }
                    }
                    Outcome::RetryableFailure(_) => EntityState::Done(EntityStatus::Failed),
                };
                last = Some(outcome);
                next
            }
            EntityState::RetryWaiting { next, delay } => {
                tokio::select! {
                    _ = shared.token.cancelled() => {
                        return cancelled_result(&entity, next - 1, last, start_time.elapsed());
                    }
                    _ = sleep(delay) => EntityState::Attempting(next),
                }
            }
            EntityState::Done(status) => break status,
        };
    };

    let detail = last.map(Outcome::into_detail).unwrap_or_default();
    let error = match status {
        EntityStatus::Success => None,
        _ => detail.reason,
    };
    let mut result = build_result(
        &entity,
        status,
        attempts.load(Ordering::SeqCst),
        detail.token,
        error,
        start_time.elapsed(),
    );
    result.fields = detail.fields;
    result
}

fn cancelled_result(entity: &Entity, attempts: u32, last: Option<Outcome>, duration: Duration) -> EntityResult {
    let detail = last.map(Outcome::into_detail).unwrap_or_default();
    let mut result = build_result(
        entity,
        EntityStatus::Failed,
        attempts,
        detail.token,
        Some(CANCELLED_REASON.to_string()),
        duration,
    );
    result.fields = detail.fields;
    result
}

fn build_result(
    entity: &Entity,
    status: EntityStatus,
    attempts: u32,
    token: Option<String>,
    error: Option<String>,
    duration: Duration,
) -> EntityResult {
    EntityResult {
        index: entity.index(),
        address: entity.address().to_string(),
        private_key: entity.private_key().to_string(),
        status,
        attempts,
        error,
        token,
        fields: Default::default(),
        duration,
    }
}

fn describe_join_error(e: JoinError) -> String {
    if e.is_panic() {
        let payload = e.into_panic();
        if let Some(msg) = payload.downcast_ref::<&str>() {
            format!("panic: {}", msg)
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            format!("panic: {}", msg)
        } else {
            "panic: <non-string payload>".to_string()
        }
    } else {
        format!("task aborted: {}", e)
    }
}

fn log_result(result: &EntityResult, total: usize, max_attempts: u32) {
    let position = result.index + 1;
    let status = result.status.as_str();

    match result.status {
        EntityStatus::Success => info!(
            target: "entity_result",
            "[{}/{}] {} {} (attempt {}/{}){}",
            position,
            total,
            status,
            result.address,
            result.attempts,
            max_attempts,
            result
                .token
                .as_deref()
                .map(|t| format!(" token: {}", t))
                .unwrap_or_default()
        ),
        _ => warn!(
            target: "entity_result",
            "[{}/{}] {} {} after {} attempt(s): {}",
            position,
            total,
            status,
            result.address,
            result.attempts,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn log_summary(aggregator: &ResultAggregator, workers: usize) {
    let counts = aggregator.counts();
    let perf = aggregator.performance();

    info!(target: "batch", "Run complete.");
    info!(
        target: "batch",
        "Total Time: {:.1}s | Total: {} | Success: {} | Already Claimed: {} | Failed: {} | Success Rate: {:.2}% | Workers: {}",
        aggregator.uptime().as_secs_f64(),
        counts.total,
        counts.success,
        counts.already_claimed,
        counts.failed,
        aggregator.success_rate(),
        workers
    );
    info!(
        target: "batch",
        "Per entity: avg {:.2}s | min {:.2}s | max {:.2}s",
        perf.avg_entity_duration_ms / 1000.0,
        perf.min_entity_duration_ms as f64 / 1000.0,
        perf.max_entity_duration_ms as f64 / 1000.0
    );
}
