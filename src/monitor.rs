// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Health Monitor
//!
//! Background task that periodically probes every registered provider and
//! classifies it as healthy, degraded, warning, or critical.
//!
//! ## Sub-checks
//!
//! Each probe runs three sub-checks; a failing sub-check never stops the
//! others, and the aggregate verdict is the worst of them:
//!
//! 1. **connectivity**: the rail's self-check under the provider timeout.
//!    Failure or timeout is critical; success with latency above the
//!    configured threshold is degraded.
//! 2. **dependencies**: the rail's self-reported upstream dependencies.
//!    Any impaired dependency is a warning.
//! 3. **rate_limit**: call volume in the current metrics window against
//!    the provider's rated throughput. Less than 20% headroom is a warning.
//!
//! ## Transition rule
//!
//! A provider is marked unavailable only after `max_consecutive_failures`
//! consecutive critical verdicts, absorbing transient blips without
//! flapping routing decisions. A single healthy/degraded verdict clears
//! the streak.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown;
//! `start` is idempotent and cancels any previous timer first.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::availability::AvailabilityStore;
use crate::config::RouterConfig;
use crate::events::{EventBus, RouterEvent};
use crate::metrics::MetricsCollector;
use crate::models::{HealthCheckResult, HealthVerdict, SubCheck};
use crate::rail::RailSet;
use crate::registry::CapabilityRegistry;

/// Default capacity of the recent-alert ring buffer.
const DEFAULT_ALERT_CAPACITY: usize = 100;

/// Minimum remaining share of the rated call budget before the rate-limit
/// sub-check raises a warning.
const RATE_LIMIT_HEADROOM: f64 = 0.2;

/// An entry in the bounded recent-alert ring buffer.
#[derive(Debug, Clone, Serialize)]
pub struct HealthAlert {
    pub provider: String,
    pub verdict: HealthVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Runs the sub-checks for a single provider and aggregates the verdict.
///
/// Shared between the monitor's timer loop and the availability store's
/// on-demand cold probe, so both paths produce identical verdicts.
pub struct ProbeRunner {
    rails: Arc<RailSet>,
    registry: Arc<CapabilityRegistry>,
    metrics: Arc<MetricsCollector>,
    config: Arc<RouterConfig>,
}

impl ProbeRunner {
    pub fn new(
        rails: Arc<RailSet>,
        registry: Arc<CapabilityRegistry>,
        metrics: Arc<MetricsCollector>,
        config: Arc<RouterConfig>,
    ) -> Self {
        Self {
            rails,
            registry,
            metrics,
            config,
        }
    }

    /// Probe one provider. Never fails: probe problems become verdicts.
    pub async fn check_provider(&self, provider: &str) -> HealthCheckResult {
        let connectivity = self.connectivity_check(provider).await;
        let dependencies = self.dependency_check(provider).await;
        let rate_limit = self.rate_limit_check(provider);

        let checks = vec![connectivity, dependencies, rate_limit];
        let verdict = checks
            .iter()
            .map(|check| check.verdict)
            .max()
            .unwrap_or(HealthVerdict::Healthy);

        HealthCheckResult {
            provider: provider.to_string(),
            checked_at: Utc::now(),
            checks,
            verdict,
        }
    }

    async fn connectivity_check(&self, provider: &str) -> SubCheck {
        let Some(rail) = self.rails.get(provider) else {
            return SubCheck {
                name: "connectivity",
                verdict: HealthVerdict::Critical,
                detail: Some("no rail attached for this provider".to_string()),
                latency_ms: None,
            };
        };

        let timeout = self.config.provider_timeout(provider);
        let started = tokio::time::Instant::now();
        match tokio::time::timeout(timeout, rail.is_available()).await {
            Ok(true) => {
                let probe_latency = started.elapsed().as_millis() as u64;
                // Operational latency dominates the probe when traffic has
                // flowed in the current window.
                let observed = self
                    .metrics
                    .average_latency_ms(provider)
                    .map(|avg| avg as u64)
                    .unwrap_or(probe_latency)
                    .max(probe_latency);

                if observed > self.config.degraded_latency_ms {
                    SubCheck {
                        name: "connectivity",
                        verdict: HealthVerdict::Degraded,
                        detail: Some(format!(
                            "latency {observed} ms above threshold {} ms",
                            self.config.degraded_latency_ms
                        )),
                        latency_ms: Some(probe_latency),
                    }
                } else {
                    SubCheck {
                        name: "connectivity",
                        verdict: HealthVerdict::Healthy,
                        detail: None,
                        latency_ms: Some(probe_latency),
                    }
                }
            }
            Ok(false) => SubCheck {
                name: "connectivity",
                verdict: HealthVerdict::Critical,
                detail: Some("provider reports itself unavailable".to_string()),
                latency_ms: Some(started.elapsed().as_millis() as u64),
            },
            Err(_) => SubCheck {
                name: "connectivity",
                verdict: HealthVerdict::Critical,
                detail: Some(format!(
                    "connectivity probe timed out after {} ms",
                    timeout.as_millis()
                )),
                latency_ms: Some(timeout.as_millis() as u64),
            },
        }
    }

    async fn dependency_check(&self, provider: &str) -> SubCheck {
        let Some(rail) = self.rails.get(provider) else {
            return SubCheck {
                name: "dependencies",
                verdict: HealthVerdict::Healthy,
                detail: None,
                latency_ms: None,
            };
        };

        let impaired: Vec<String> = rail
            .dependency_health()
            .await
            .into_iter()
            .filter(|dependency| !dependency.healthy)
            .map(|dependency| dependency.name)
            .collect();

        if impaired.is_empty() {
            SubCheck {
                name: "dependencies",
                verdict: HealthVerdict::Healthy,
                detail: None,
                latency_ms: None,
            }
        } else {
            SubCheck {
                name: "dependencies",
                verdict: HealthVerdict::Warning,
                detail: Some(format!("impaired: {}", impaired.join(", "))),
                latency_ms: None,
            }
        }
    }

    fn rate_limit_check(&self, provider: &str) -> SubCheck {
        let Some(descriptor) = self.registry.get(provider) else {
            return SubCheck {
                name: "rate_limit",
                verdict: HealthVerdict::Healthy,
                detail: None,
                latency_ms: None,
            };
        };

        let window_secs = self.config.metrics_window.as_secs().max(1);
        let budget = (descriptor.throughput.calls_per_minute() * window_secs / 60).max(1);
        let used = self.metrics.calls_in_window(provider);
        let headroom = 1.0 - used as f64 / budget as f64;

        if headroom < RATE_LIMIT_HEADROOM {
            SubCheck {
                name: "rate_limit",
                verdict: HealthVerdict::Warning,
                detail: Some(format!(
                    "{used} of {budget} rated calls used in the current window"
                )),
                latency_ms: None,
            }
        } else {
            SubCheck {
                name: "rate_limit",
                verdict: HealthVerdict::Healthy,
                detail: None,
                latency_ms: None,
            }
        }
    }
}

/// Periodic health monitor over all registered providers.
pub struct HealthMonitor {
    probe: Arc<ProbeRunner>,
    store: Arc<AvailabilityStore>,
    registry: Arc<CapabilityRegistry>,
    events: EventBus,
    config: Arc<RouterConfig>,
    last_verdicts: Mutex<HashMap<String, HealthVerdict>>,
    alerts: Mutex<VecDeque<HealthAlert>>,
    alert_capacity: usize,
    timer: Mutex<Option<CancellationToken>>,
}

impl HealthMonitor {
    pub fn new(
        probe: Arc<ProbeRunner>,
        store: Arc<AvailabilityStore>,
        registry: Arc<CapabilityRegistry>,
        events: EventBus,
        config: Arc<RouterConfig>,
    ) -> Self {
        Self {
            probe,
            store,
            registry,
            events,
            config,
            last_verdicts: Mutex::new(HashMap::new()),
            alerts: Mutex::new(VecDeque::new()),
            alert_capacity: DEFAULT_ALERT_CAPACITY,
            timer: Mutex::new(None),
        }
    }

    /// Override the recent-alert ring capacity.
    pub fn with_alert_capacity(mut self, capacity: usize) -> Self {
        self.alert_capacity = capacity.max(1);
        self
    }

    /// The single-provider check, also used for on-demand probes.
    pub async fn check_provider(&self, provider: &str) -> HealthCheckResult {
        self.probe.check_provider(provider).await
    }

    /// Begin the repeating probe timer.
    ///
    /// Idempotent: starting while already running cancels the previous
    /// timer before spawning the new one.
    pub fn start(self: Arc<Self>, interval: Duration) {
        let token = CancellationToken::new();
        if let Some(previous) = self.timer.lock().replace(token.clone()) {
            previous.cancel();
        }

        let monitor = self;
        tokio::spawn(async move {
            info!(
                interval_ms = interval.as_millis() as u64,
                providers = monitor.registry.len(),
                "Health monitor starting"
            );

            loop {
                if token.is_cancelled() {
                    info!("Health monitor shutting down");
                    return;
                }

                monitor.run_cycle().await;

                tokio::select! {
                    _ = tokio::time::sleep(interval) => {},
                    _ = token.cancelled() => {
                        info!("Health monitor shutting down");
                        return;
                    }
                }
            }
        });
    }

    /// Cancel the probe timer; safe to call when not started.
    pub fn stop(&self) {
        if let Some(token) = self.timer.lock().take() {
            token.cancel();
        }
    }

    /// Execute one probe cycle over every registered provider.
    pub async fn run_cycle(&self) {
        let mut verdicts = HashMap::new();

        for provider in self.registry.names_by_priority() {
            let result = self.probe.check_provider(&provider).await;
            let record = self
                .store
                .apply_verdict(&provider, &result, self.config.max_consecutive_failures)
                .await;

            if result.verdict >= HealthVerdict::Warning {
                self.push_alert(HealthAlert {
                    provider: provider.clone(),
                    verdict: result.verdict,
                    detail: result.worst_detail(),
                    at: result.checked_at,
                });
            }

            let previous = self
                .last_verdicts
                .lock()
                .insert(provider.clone(), result.verdict);
            if previous != Some(result.verdict) {
                if result.verdict >= HealthVerdict::Degraded {
                    warn!(
                        provider = %provider,
                        previous = previous.map(|v| v.as_str()).unwrap_or("unknown"),
                        current = %result.verdict,
                        consecutive_failures = record.consecutive_failures,
                        available = record.available,
                        "Provider health changed"
                    );
                } else {
                    info!(
                        provider = %provider,
                        previous = previous.map(|v| v.as_str()).unwrap_or("unknown"),
                        current = %result.verdict,
                        "Provider health changed"
                    );
                }
                self.events.emit(RouterEvent::ProviderStatusChanged {
                    provider: provider.clone(),
                    previous,
                    current: result.verdict,
                });
            } else {
                debug!(provider = %provider, verdict = %result.verdict, "Provider health unchanged");
            }

            verdicts.insert(provider, result.verdict);
        }

        self.events.emit(RouterEvent::HealthStatus {
            verdicts,
            timestamp: Utc::now(),
        });
    }

    fn push_alert(&self, alert: HealthAlert) {
        let mut alerts = self.alerts.lock();
        if alerts.len() == self.alert_capacity {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }

    /// Recent alerts, oldest first.
    pub fn recent_alerts(&self) -> Vec<HealthAlert> {
        self.alerts.lock().iter().cloned().collect()
    }

    /// Aggregate verdict from the most recent cycle that probed the
    /// provider, if any.
    pub fn last_verdict(&self, provider: &str) -> Option<HealthVerdict> {
        self.last_verdicts.lock().get(provider).copied()
    }
}
