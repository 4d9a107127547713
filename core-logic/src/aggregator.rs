use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Success,
    /// Terminal skip: the operation reported the work as already done.
    AlreadyClaimed,
    /// Retries exhausted, ineligible, cancelled, or the attempt panicked.
    Failed,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Success => "SUCCESS",
            EntityStatus::AlreadyClaimed => "SKIPPED",
            EntityStatus::Failed => "FAILED",
        }
    }
}

/// Final record for one entity, written once by the worker that owned it.
#[derive(Debug, Clone, Serialize)]
pub struct EntityResult {
    #[serde(skip)]
    pub index: usize,
    pub address: String,
    pub private_key: String,
    pub status: EntityStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    #[serde(skip)]
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregateCounts {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub already_claimed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_duration_ms: u64,
    pub avg_entity_duration_ms: f64,
    pub min_entity_duration_ms: u64,
    pub max_entity_duration_ms: u64,
}

#[derive(Debug, Default)]
struct AggregateState {
    counts: AggregateCounts,
    results: Vec<EntityResult>,
    duration_sum_ms: u64,
    min_duration_ms: Option<u64>,
    max_duration_ms: u64,
}

/// Shared sink for finished entities.
///
/// Every update goes through [`record`](Self::record) under one mutex, so the
/// counters always partition the recorded results by status.
#[derive(Debug)]
pub struct ResultAggregator {
    state: Mutex<AggregateState>,
    start_time: Instant,
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self {
            state: Mutex::new(AggregateState::default()),
            start_time: Instant::now(),
        }
    }
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, AggregateState> {
        // A panicking recorder cannot leave the counters half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, result: EntityResult) {
        let duration_ms = result.duration.as_millis() as u64;
        let mut state = self.lock();

        state.counts.total += 1;
        match result.status {
            EntityStatus::Success => state.counts.success += 1,
            EntityStatus::AlreadyClaimed => state.counts.already_claimed += 1,
            EntityStatus::Failed => state.counts.failed += 1,
        }

        state.duration_sum_ms += duration_ms;
        state.min_duration_ms = Some(state.min_duration_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        state.max_duration_ms = state.max_duration_ms.max(duration_ms);
        state.results.push(result);
    }

    pub fn counts(&self) -> AggregateCounts {
        self.lock().counts
    }

    /// Results ordered by input position.
    pub fn results(&self) -> Vec<EntityResult> {
        let mut results = self.lock().results.clone();
        results.sort_by_key(|r| r.index);
        results
    }

    pub fn performance(&self) -> PerformanceMetrics {
        let state = self.lock();
        let total = state.counts.total;
        PerformanceMetrics {
            total_duration_ms: state.duration_sum_ms,
            avg_entity_duration_ms: if total > 0 {
                state.duration_sum_ms as f64 / total as f64
            } else {
                0.0
            },
            min_entity_duration_ms: state.min_duration_ms.unwrap_or(0),
            max_entity_duration_ms: state.max_duration_ms,
        }
    }

    pub fn success_rate(&self) -> f64 {
        let counts = self.counts();
        if counts.total > 0 {
            counts.success as f64 / counts.total as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
