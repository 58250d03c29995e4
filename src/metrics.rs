use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Error;
use crate::outcome::Outcome;
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FanoutMetricsSnapshot {
    pub batches_dispatched: u64,
    pub targets_dispatched: u64,
    pub build_failures: u64,
    pub attempts: u64,
    pub retries: u64,
    pub rate_limit_backoffs: u64,
    pub transport_errors: u64,
    pub outcomes_delivered: u64,
    pub outcomes_succeeded: u64,
    pub in_flight: u64,
    pub quorums_met: u64,
    pub quorums_missed: u64,
    pub latency_samples: u64,
    pub latency_total_ms: u64,
    pub latency_avg_ms: f64,
    pub status_counts: BTreeMap<u16, u64>,
    pub error_counts: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FanoutMetrics {
    inner: Option<Arc<FanoutMetricsInner>>,
}

#[derive(Debug, Default)]
struct FanoutMetricsInner {
    batches_dispatched: AtomicU64,
    targets_dispatched: AtomicU64,
    build_failures: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    rate_limit_backoffs: AtomicU64,
    transport_errors: AtomicU64,
    outcomes_delivered: AtomicU64,
    outcomes_succeeded: AtomicU64,
    in_flight: AtomicU64,
    quorums_met: AtomicU64,
    quorums_missed: AtomicU64,
    latency_total_ms: AtomicU64,
    latency_samples: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
    error_counts: Mutex<BTreeMap<String, u64>>,
}

pub(crate) struct InFlightGuard {
    inner: Option<Arc<FanoutMetricsInner>>,
}

impl FanoutMetrics {
    pub(crate) fn enabled() -> Self {
        Self {
            inner: Some(Arc::new(FanoutMetricsInner::default())),
        }
    }

    pub(crate) fn disabled() -> Self {
        Self::default()
    }

    pub(crate) fn record_batch_dispatched(&self, targets: usize) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        inner
            .targets_dispatched
            .fetch_add(targets as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_build_failure(&self, error: &Error) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.build_failures.fetch_add(1, Ordering::Relaxed);
        self.add_error_count(error.code().as_str().to_owned());
    }

    pub(crate) fn enter_in_flight(&self) -> InFlightGuard {
        match &self.inner {
            Some(inner) => {
                inner.in_flight.fetch_add(1, Ordering::Relaxed);
                InFlightGuard {
                    inner: Some(Arc::clone(inner)),
                }
            }
            None => InFlightGuard { inner: None },
        }
    }

    pub(crate) fn record_attempt(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rate_limit_backoff(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.rate_limit_backoffs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_error(&self) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_outcome(&self, outcome: &Outcome, latency: Duration) {
        let Some(inner) = &self.inner else {
            return;
        };
        inner.outcomes_delivered.fetch_add(1, Ordering::Relaxed);
        if outcome.is_success_status() {
            inner.outcomes_succeeded.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(status) = outcome.status() {
            self.add_status_count(status.as_u16());
        }
        if let Some(error) = outcome.error() {
            self.add_error_count(error.code().as_str().to_owned());
        }
        inner.latency_samples.fetch_add(1, Ordering::Relaxed);
        inner.latency_total_ms.fetch_add(
            latency.as_millis().min(u64::MAX as u128) as u64,
            Ordering::Relaxed,
        );
    }

    pub(crate) fn record_quorum(&self, met: bool) {
        let Some(inner) = &self.inner else {
            return;
        };
        if met {
            inner.quorums_met.fetch_add(1, Ordering::Relaxed);
        } else {
            inner.quorums_missed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> FanoutMetricsSnapshot {
        let Some(inner) = &self.inner else {
            return FanoutMetricsSnapshot::default();
        };
        let latency_samples = inner.latency_samples.load(Ordering::Relaxed);
        let latency_total_ms = inner.latency_total_ms.load(Ordering::Relaxed);
        let latency_avg_ms = if latency_samples == 0 {
            0.0
        } else {
            latency_total_ms as f64 / latency_samples as f64
        };

        FanoutMetricsSnapshot {
            batches_dispatched: inner.batches_dispatched.load(Ordering::Relaxed),
            targets_dispatched: inner.targets_dispatched.load(Ordering::Relaxed),
            build_failures: inner.build_failures.load(Ordering::Relaxed),
            attempts: inner.attempts.load(Ordering::Relaxed),
            retries: inner.retries.load(Ordering::Relaxed),
            rate_limit_backoffs: inner.rate_limit_backoffs.load(Ordering::Relaxed),
            transport_errors: inner.transport_errors.load(Ordering::Relaxed),
            outcomes_delivered: inner.outcomes_delivered.load(Ordering::Relaxed),
            outcomes_succeeded: inner.outcomes_succeeded.load(Ordering::Relaxed),
            in_flight: inner.in_flight.load(Ordering::Relaxed),
            quorums_met: inner.quorums_met.load(Ordering::Relaxed),
            quorums_missed: inner.quorums_missed.load(Ordering::Relaxed),
            latency_samples,
            latency_total_ms,
            latency_avg_ms,
            status_counts: lock_unpoisoned(&inner.status_counts).clone(),
            error_counts: lock_unpoisoned(&inner.error_counts).clone(),
        }
    }

    fn add_status_count(&self, status: u16) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut status_counts = lock_unpoisoned(&inner.status_counts);
        *status_counts.entry(status).or_insert(0) += 1;
    }

    fn add_error_count(&self, error_key: String) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut error_counts = lock_unpoisoned(&inner.error_counts);
        *error_counts.entry(error_key).or_insert(0) += 1;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(inner) = &self.inner {
            inner.in_flight.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
