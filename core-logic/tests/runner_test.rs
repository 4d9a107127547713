use async_trait::async_trait;
use core_logic::{
    BatchConfig, BatchRunner, Entity, EntityStatus, Operation, Outcome, RetryPolicy,
    CANCELLED_REASON, INELIGIBLE_REASON,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

type Script = Box<dyn Fn(&Entity, u32) -> Outcome + Send + Sync>;

struct MockOperation {
    script: Script,
    eligible: bool,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts_seen: Mutex<HashMap<usize, Vec<u32>>>,
}

impl MockOperation {
    fn new(script: impl Fn(&Entity, u32) -> Outcome + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            eligible: true,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            attempts_seen: Mutex::new(HashMap::new()),
        }
    }

    fn ineligible(mut self) -> Self {
        self.eligible = false;
        self
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempts_for(&self, index: usize) -> Vec<u32> {
        self.attempts_seen
            .lock()
            .unwrap()
            .get(&index)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Operation for MockOperation {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_eligible(&self, _entity: &Entity) -> bool {
        self.eligible
    }

    fn metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("network".to_string(), Value::from("Mocknet"));
        map
    }

    async fn attempt(&self, entity: &Entity, attempt: u32) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.attempts_seen
            .lock()
            .unwrap()
            .entry(entity.index())
            .or_default()
            .push(attempt);

        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }

        let outcome = (self.script)(entity, attempt);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn entities(n: usize) -> Vec<Entity> {
    (0..n)
        .map(|i| Entity::new(i, format!("0x{:040x}", i + 1), format!("0x{:064x}", i + 1)))
        .collect()
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, 10)
}

#[tokio::test]
async fn test_scenario_all_succeed_first_attempt() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::success().with_token("0xhash")));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 2);

    let report = runner.run(entities(5), CancellationToken::new()).await;

    assert_eq!(report.total, 5);
    assert_eq!(report.success, 5);
    assert_eq!(report.failed, 0);
    assert_eq!(report.already_claimed, 0);
    assert_eq!(op.calls(), 5);
    for detail in &report.details {
        assert_eq!(detail.status, EntityStatus::Success);
        assert_eq!(detail.attempts, 1);
        assert_eq!(detail.token.as_deref(), Some("0xhash"));
        assert!(detail.error.is_none());
    }
}

#[tokio::test]
async fn test_scenario_retries_exhausted() {
    let op = Arc::new(MockOperation::new(|_, n| Outcome::retryable(format!("timeout #{}", n))));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 1);

    let report = runner.run(entities(1), CancellationToken::new()).await;

    let detail = &report.details[0];
    assert_eq!(detail.status, EntityStatus::Failed);
    assert_eq!(detail.attempts, 3);
    assert_eq!(detail.error.as_deref(), Some("timeout #3"));
    assert_eq!(op.calls(), 3);
    assert_eq!(op.attempts_for(0), vec![1, 2, 3]);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_scenario_terminal_failure_stops_immediately() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::terminal("already claimed")));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 1);

    let report = runner.run(entities(1), CancellationToken::new()).await;

    let detail = &report.details[0];
    assert_eq!(detail.status, EntityStatus::AlreadyClaimed);
    assert_eq!(detail.attempts, 1);
    assert_eq!(op.calls(), 1);
    assert_eq!(op.attempts_for(0), vec![1]);
    assert_eq!(report.already_claimed, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_scenario_ineligible_never_attempts() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::success()).ineligible());
    let runner = BatchRunner::new(op.clone(), fast_policy(), 3);

    let report = runner.run(entities(2), CancellationToken::new()).await;

    assert_eq!(op.calls(), 0);
    assert_eq!(report.failed, 2);
    for detail in &report.details {
        assert_eq!(detail.status, EntityStatus::Failed);
        assert_eq!(detail.error.as_deref(), Some(INELIGIBLE_REASON));
        assert_eq!(detail.attempts, 0);
    }
}

#[tokio::test]
async fn test_terminal_on_second_attempt_prevents_third() {
    let op = Arc::new(MockOperation::new(|_, n| {
        if n == 1 {
            Outcome::retryable("rpc error")
        } else {
            Outcome::terminal("execution reverted")
        }
    }));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 1);

    let report = runner.run(entities(1), CancellationToken::new()).await;

    assert_eq!(report.details[0].status, EntityStatus::AlreadyClaimed);
    assert_eq!(report.details[0].attempts, 2);
    assert_eq!(op.attempts_for(0), vec![1, 2]);
}

#[tokio::test]
async fn test_success_after_retry_keeps_fields() {
    let op = Arc::new(MockOperation::new(|_, n| {
        if n < 2 {
            Outcome::retryable("nonce too low")
        } else {
            Outcome::success()
                .with_token("0xfeed")
                .with_field("tx_hash", "0xfeed")
        }
    }));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 1);

    let report = runner.run(entities(1), CancellationToken::new()).await;

    let detail = &report.details[0];
    assert_eq!(detail.status, EntityStatus::Success);
    assert_eq!(detail.attempts, 2);
    assert!(detail.error.is_none());
    assert_eq!(detail.fields.get("tx_hash"), Some(&Value::from("0xfeed")));
}

#[tokio::test]
async fn test_concurrency_bound_is_respected() {
    let op = Arc::new(
        MockOperation::new(|_, _| Outcome::success()).with_latency(Duration::from_millis(20)),
    );
    let runner = BatchRunner::new(op.clone(), fast_policy(), 3);

    let report = runner.run(entities(20), CancellationToken::new()).await;

    assert_eq!(report.success, 20);
    let peak = op.max_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight {} exceeded bound", peak);
    assert!(peak >= 1);
}

#[tokio::test]
async fn test_sequential_mode_runs_one_at_a_time() {
    let op = Arc::new(
        MockOperation::new(|_, _| Outcome::success()).with_latency(Duration::from_millis(5)),
    );
    let runner = BatchRunner::new(op.clone(), fast_policy(), 1);

    let report = runner.run(entities(6), CancellationToken::new()).await;

    assert_eq!(report.success, 6);
    assert_eq!(op.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panic_in_one_entity_is_isolated() {
    let op = Arc::new(MockOperation::new(|entity, _| {
        if entity.index() == 2 {
            panic!("boom");
        }
        Outcome::success()
    }));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 2);

    let report = runner.run(entities(5), CancellationToken::new()).await;

    assert_eq!(report.total, 5);
    assert_eq!(report.success, 4);
    assert_eq!(report.failed, 1);

    let crashed = report.details.iter().find(|d| d.index == 2).unwrap();
    assert_eq!(crashed.status, EntityStatus::Failed);
    assert_eq!(crashed.attempts, 1);
    assert!(crashed.error.as_deref().unwrap_or_default().contains("panic: boom"));
}

#[tokio::test]
async fn test_counts_partition_mixed_outcomes() {
    let op = Arc::new(MockOperation::new(|entity, _| match entity.index() % 3 {
        0 => Outcome::success(),
        1 => Outcome::terminal("already claimed"),
        _ => Outcome::retryable("503"),
    }));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 4);

    let report = runner.run(entities(30), CancellationToken::new()).await;

    assert_eq!(report.total, 30);
    assert_eq!(report.success, 10);
    assert_eq!(report.already_claimed, 10);
    assert_eq!(report.failed, 10);
    assert_eq!(report.success + report.failed + report.already_claimed, report.total);

    let indices: Vec<usize> = report.details.iter().map(|d| d.index).collect();
    assert_eq!(indices, (0..30).collect::<Vec<_>>());
    for detail in &report.details {
        assert!(detail.attempts >= 1 && detail.attempts <= 3);
    }
    assert_eq!(op.calls(), 10 + 10 + 10 * 3);
}

#[tokio::test]
async fn test_cancelled_before_start_records_every_entity() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::success()));
    let runner = BatchRunner::new(op.clone(), fast_policy(), 2);
    let token = CancellationToken::new();
    token.cancel();

    let report = runner.run(entities(4), token).await;

    assert_eq!(op.calls(), 0);
    assert_eq!(report.total, 4);
    assert_eq!(report.failed, 4);
    for detail in &report.details {
        assert_eq!(detail.error.as_deref(), Some(CANCELLED_REASON));
        assert_eq!(detail.attempts, 0);
    }
}

#[tokio::test]
async fn test_cancel_interrupts_retry_wait() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::retryable("rate limited")));
    let runner = BatchRunner::new(op.clone(), RetryPolicy::new(3, 10_000), 1);
    let token = CancellationToken::new();

    let cancel = token.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    let start = Instant::now();
    let report = runner.run(entities(1), token).await;

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(op.calls(), 1);
    let detail = &report.details[0];
    assert_eq!(detail.status, EntityStatus::Failed);
    assert_eq!(detail.attempts, 1);
    assert_eq!(detail.error.as_deref(), Some(CANCELLED_REASON));
}

#[tokio::test]
async fn test_empty_input_produces_empty_report() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::success()));
    let runner = BatchRunner::new(op, fast_policy(), 3);

    let report = runner.run(Vec::new(), CancellationToken::new()).await;

    assert_eq!(report.total, 0);
    assert!(report.details.is_empty());
}

#[tokio::test]
async fn test_entity_pacing_applies_per_worker() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::success()));
    let policy = fast_policy().with_entity_pacing(Duration::from_millis(40));
    let runner = BatchRunner::new(op, policy, 1);

    let start = Instant::now();
    let report = runner.run(entities(3), CancellationToken::new()).await;

    assert_eq!(report.success, 3);
    // two gaps between three entities, none before the first
    assert!(start.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn test_runner_from_config_and_metadata() {
    let op = Arc::new(MockOperation::new(|_, _| Outcome::success()));
    let config = BatchConfig {
        retry_delay_ms: 1,
        entity_pacing_ms: 0,
        ..BatchConfig::faucet()
    };
    let runner = BatchRunner::from_config(op, &config);
    assert_eq!(runner.concurrency(), 5);

    let report = runner.run(entities(2), CancellationToken::new()).await;
    assert_eq!(report.metadata.get("network"), Some(&Value::from("Mocknet")));
}
