// ============================================================================
// Pipeline Health
// Running counters and the derived healthy/unhealthy predicate
// ============================================================================

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Errors newer than this make the pipeline unhealthy
fn error_window() -> TimeDelta {
    TimeDelta::seconds(60)
}

#[derive(Debug, Clone)]
struct LastError {
    message: String,
    at: DateTime<Utc>,
}

/// Shared between the pipeline loop (writer) and the health endpoint (reader)
#[derive(Debug, Default)]
pub struct PipelineHealth {
    messages_processed: AtomicU64,
    error_count: AtomicU64,
    connected: AtomicBool,
    last_error: Mutex<Option<LastError>>,
}

/// Metrics as reported to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub connected: bool,
    pub messages_processed: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Body for an external health endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: &'static str,
    pub metrics: HealthSnapshot,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, error: &dyn Display) {
        self.record_error_at(error, Utc::now());
    }

    pub fn record_error_at(&self, error: &dyn Display, at: DateTime<Utc>) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(LastError {
            message: error.to_string(),
            at,
        });
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_error = self.last_error.lock().clone();
        HealthSnapshot {
            connected: self.is_connected(),
            messages_processed: self.messages_processed(),
            error_count: self.error_count(),
            last_error: last_error.as_ref().map(|e| e.message.clone()),
            last_error_time: last_error.map(|e| e.at),
        }
    }

    /// Unhealthy while disconnected or within a minute of any error
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Utc::now())
    }

    pub fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_connected() {
            return false;
        }
        match &*self.last_error.lock() {
            Some(last) => last.at <= now - error_window(),
            None => true,
        }
    }

    pub fn report(&self) -> HealthReport {
        let healthy = self.is_healthy();
        HealthReport {
            healthy,
            status: if healthy { "healthy" } else { "unhealthy" },
            metrics: self.snapshot(),
        }
    }
}
