use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Process-wide request counters
///
/// Shared through an `Arc` by every request handler; each counter is updated
/// with a relaxed atomic add, so no request ever waits on another.
#[derive(Debug)]
pub struct ServiceStats {
    started_at: DateTime<Utc>,
    blended_requests: AtomicU64,
    offline_requests: AtomicU64,
    online_requests: AtomicU64,
    offline_personal: AtomicU64,
    offline_default: AtomicU64,
    history_empty: AtomicU64,
    history_failures: AtomicU64,
    similarity_failures: AtomicU64,
    upstream_timeouts: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub blended_requests: u64,
    pub offline_requests: u64,
    pub online_requests: u64,
    pub offline_personal: u64,
    pub offline_default: u64,
    pub history_empty: u64,
    pub history_failures: u64,
    pub similarity_failures: u64,
    pub upstream_timeouts: u64,
}

/// Which endpoint a request came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Blended,
    Offline,
    Online,
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            blended_requests: AtomicU64::new(0),
            offline_requests: AtomicU64::new(0),
            online_requests: AtomicU64::new(0),
            offline_personal: AtomicU64::new(0),
            offline_default: AtomicU64::new(0),
            history_empty: AtomicU64::new(0),
            history_failures: AtomicU64::new(0),
            similarity_failures: AtomicU64::new(0),
            upstream_timeouts: AtomicU64::new(0),
        }
    }

    pub fn record_request(&self, kind: RequestKind) {
        let counter = match kind {
            RequestKind::Blended => &self.blended_requests,
            RequestKind::Offline => &self.offline_requests,
            RequestKind::Online => &self.online_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records whether an offline lookup hit a personal list or the default one
    pub fn record_offline_lookup(&self, personal: bool) {
        if personal {
            self.offline_personal.fetch_add(1, Ordering::Relaxed);
        } else {
            self.offline_default.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_history_empty(&self) {
        self.history_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_history_failure(&self) {
        self.history_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_similarity_failure(&self) {
        self.similarity_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.upstream_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            blended_requests: self.blended_requests.load(Ordering::Relaxed),
            offline_requests: self.offline_requests.load(Ordering::Relaxed),
            online_requests: self.online_requests.load(Ordering::Relaxed),
            offline_personal: self.offline_personal.load(Ordering::Relaxed),
            offline_default: self.offline_default.load(Ordering::Relaxed),
            history_empty: self.history_empty.load(Ordering::Relaxed),
            history_failures: self.history_failures.load(Ordering::Relaxed),
            similarity_failures: self.similarity_failures.load(Ordering::Relaxed),
            upstream_timeouts: self.upstream_timeouts.load(Ordering::Relaxed),
        }
    }

    /// Writes every counter to the log, one line each
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        tracing::info!(started_at = %snapshot.started_at, "Stats for recommendations");
        let rows = [
            ("blended_requests", snapshot.blended_requests),
            ("offline_requests", snapshot.offline_requests),
            ("online_requests", snapshot.online_requests),
            ("offline_personal", snapshot.offline_personal),
            ("offline_default", snapshot.offline_default),
            ("history_empty", snapshot.history_empty),
            ("history_failures", snapshot.history_failures),
            ("similarity_failures", snapshot.similarity_failures),
            ("upstream_timeouts", snapshot.upstream_timeouts),
        ];
        for (name, value) in rows {
            tracing::info!(counter = name, value, "stat");
        }
    }
}
