// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-provider call metrics over a rolling window.
//!
//! Counters accumulate within the window and reset when it rolls over.
//! Failure rate and average latency are derived on read, never stored, so
//! the two can never drift apart.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

/// Raw counters for one provider within the current window.
#[derive(Debug, Clone)]
struct ProviderCounters {
    window_started_at: Instant,
    total_calls: u64,
    total_failures: u64,
    total_latency_ms: u64,
}

impl ProviderCounters {
    fn new() -> Self {
        Self {
            window_started_at: Instant::now(),
            total_calls: 0,
            total_failures: 0,
            total_latency_ms: 0,
        }
    }
}

/// Derived view of a provider's metrics, computed at read time.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub provider: String,
    pub total_calls: u64,
    pub total_failures: u64,
    pub failure_rate: f64,
    pub average_latency_ms: f64,
}

impl MetricsSnapshot {
    fn empty(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            total_calls: 0,
            total_failures: 0,
            failure_rate: 0.0,
            average_latency_ms: 0.0,
        }
    }
}

/// Collector of per-provider call counts, failures, and latency.
///
/// Keyed by provider name; each provider's counters are independent, so a
/// sharded map is all the synchronization required.
#[derive(Debug)]
pub struct MetricsCollector {
    window: Duration,
    providers: DashMap<String, ProviderCounters>,
}

impl MetricsCollector {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            providers: DashMap::new(),
        }
    }

    /// Record a successful call and its latency.
    pub fn record_success(&self, provider: &str, latency_ms: u64) {
        self.record(provider, latency_ms, false);
    }

    /// Record a failed call and its latency.
    pub fn record_failure(&self, provider: &str, latency_ms: u64) {
        self.record(provider, latency_ms, true);
    }

    fn record(&self, provider: &str, latency_ms: u64, failed: bool) {
        let mut counters = self
            .providers
            .entry(provider.to_string())
            .or_insert_with(ProviderCounters::new);

        if counters.window_started_at.elapsed() >= self.window {
            *counters = ProviderCounters::new();
        }

        counters.total_calls += 1;
        counters.total_latency_ms += latency_ms;
        if failed {
            counters.total_failures += 1;
        }
    }

    /// Snapshot of the current window for one provider.
    pub fn snapshot(&self, provider: &str) -> MetricsSnapshot {
        match self.providers.get(provider) {
            Some(counters) if counters.window_started_at.elapsed() < self.window => {
                let calls = counters.total_calls;
                MetricsSnapshot {
                    provider: provider.to_string(),
                    total_calls: calls,
                    total_failures: counters.total_failures,
                    failure_rate: if calls == 0 {
                        0.0
                    } else {
                        counters.total_failures as f64 / calls as f64
                    },
                    average_latency_ms: if calls == 0 {
                        0.0
                    } else {
                        counters.total_latency_ms as f64 / calls as f64
                    },
                }
            }
            _ => MetricsSnapshot::empty(provider),
        }
    }

    /// Average call latency within the current window, if any calls landed.
    pub fn average_latency_ms(&self, provider: &str) -> Option<f64> {
        let snapshot = self.snapshot(provider);
        (snapshot.total_calls > 0).then_some(snapshot.average_latency_ms)
    }

    /// Calls recorded within the current window, for rate-limit headroom.
    pub fn calls_in_window(&self, provider: &str) -> u64 {
        self.snapshot(provider).total_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_values_computed_on_read() {
        let metrics = MetricsCollector::new(Duration::from_secs(60));
        metrics.record_success("chain-rail", 100);
        metrics.record_success("chain-rail", 300);
        metrics.record_failure("chain-rail", 200);

        let snapshot = metrics.snapshot("chain-rail");
        assert_eq!(snapshot.total_calls, 3);
        assert_eq!(snapshot.total_failures, 1);
        assert!((snapshot.failure_rate - 1.0 / 3.0).abs() < f64::EPSILON);
        assert!((snapshot.average_latency_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_provider_snapshots_are_zeroed() {
        let metrics = MetricsCollector::new(Duration::from_secs(60));
        let snapshot = metrics.snapshot("ghost");
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.failure_rate, 0.0);
        assert!(metrics.average_latency_ms("ghost").is_none());
    }

    #[test]
    fn window_rollover_resets_counters() {
        let metrics = MetricsCollector::new(Duration::from_millis(1));
        metrics.record_failure("chain-rail", 50);
        std::thread::sleep(Duration::from_millis(5));

        // Expired window reads as empty ...
        assert_eq!(metrics.snapshot("chain-rail").total_calls, 0);

        // ... and the next write starts a fresh window.
        metrics.record_success("chain-rail", 10);
        let snapshot = metrics.snapshot("chain-rail");
        assert_eq!(snapshot.total_calls, 1);
        assert_eq!(snapshot.total_failures, 0);
    }

    #[test]
    fn providers_are_tracked_independently() {
        let metrics = MetricsCollector::new(Duration::from_secs(60));
        metrics.record_failure("chain-rail", 10);
        metrics.record_success("custody-rail", 20);

        assert_eq!(metrics.snapshot("chain-rail").total_failures, 1);
        assert_eq!(metrics.snapshot("custody-rail").total_failures, 0);
    }
}
