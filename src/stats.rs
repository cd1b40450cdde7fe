use std::{
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{ErrorCode, MongoHttpError};

/// Counters for every logical operation run through a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Re-attempts made by the retry policy, across all operations.
    pub retry_count: u64,
    /// Running mean of operation latency, retries and backoff included.
    pub average_latency_ms: f64,
    /// Connections ever opened through the client.
    pub total_connections: u64,
    /// Connections opened and not yet closed.
    pub active_connections: u64,
}

impl Stats {
    /// Percentage of successful operations; `100.0` before any operation ran.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 100.0;
        }
        self.successful_operations as f64 / self.total_operations as f64 * 100.0
    }
}

/// The most recent surfaced failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LastError {
    pub code: ErrorCode,
    pub message: String,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl LastError {
    pub fn from_error(err: &MongoHttpError) -> Self {
        Self {
            code: err.code(),
            message: err.summary(),
            detail: err.detail(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    stats: Stats,
    last_error: Option<LastError>,
}

/// Shared, lock-guarded stats and last-error state.
#[derive(Debug, Default)]
pub struct StatsTracker {
    state: Mutex<State>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Every update leaves the counters consistent, so a poisoned lock
        // still holds usable state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(&self, latency: Duration) {
        let mut state = self.lock();
        state.stats.successful_operations += 1;
        Self::record_latency(&mut state.stats, latency);
        state.last_error = None;
    }

    pub fn record_failure(&self, err: &MongoHttpError, latency: Duration) {
        let mut state = self.lock();
        state.stats.failed_operations += 1;
        Self::record_latency(&mut state.stats, latency);
        state.last_error = Some(LastError::from_error(err));
    }

    /// Records an error raised outside any counted operation.
    pub fn set_last_error(&self, err: &MongoHttpError) {
        self.lock().last_error = Some(LastError::from_error(err));
    }

    pub fn record_retry(&self) {
        self.lock().stats.retry_count += 1;
    }

    pub fn record_connection_opened(&self) {
        let mut state = self.lock();
        state.stats.total_connections += 1;
        state.stats.active_connections += 1;
    }

    pub fn record_connection_closed(&self) {
        let mut state = self.lock();
        state.stats.active_connections = state.stats.active_connections.saturating_sub(1);
    }

    fn record_latency(stats: &mut Stats, latency: Duration) {
        stats.total_operations += 1;
        let sample = latency.as_secs_f64() * 1000.0;
        let n = stats.total_operations as f64;
        stats.average_latency_ms += (sample - stats.average_latency_ms) / n;
    }

    pub fn snapshot(&self) -> Stats {
        self.lock().stats
    }

    pub fn last_error(&self) -> Option<LastError> {
        self.lock().last_error.clone()
    }

    pub fn clear_last_error(&self) {
        self.lock().last_error = None;
    }

    /// Zeroes all counters. The last error and the open-connection gauge are kept.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.stats = Stats {
            active_connections: state.stats.active_connections,
            ..Stats::default()
        };
    }
}
