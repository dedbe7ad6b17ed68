// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Availability Store
//!
//! Single source of truth for "is provider P currently usable". One
//! [`AvailabilityRecord`] per provider, written only by the health monitor
//! (every probe cycle) and by the execution engine's fast-reaction path
//! ([`AvailabilityStore::mark_unavailable`]); routing only reads.
//!
//! ## Lazy initialization
//!
//! A provider with no record yet is probed on demand through the health
//! monitor's single-provider check. Probes are single-flight: concurrent
//! callers for the same cold provider await the same in-flight probe
//! instead of issuing duplicates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::warn;

use crate::models::{HealthCheckResult, HealthVerdict};
use crate::monitor::ProbeRunner;

/// Mutable availability state for one provider.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityRecord {
    pub available: bool,
    pub last_checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
}

impl AvailabilityRecord {
    fn fresh() -> Self {
        Self {
            available: true,
            last_checked_at: Utc::now(),
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// In-memory cache of the latest availability verdict per provider.
pub struct AvailabilityStore {
    probe: Arc<ProbeRunner>,
    records: RwLock<HashMap<String, AvailabilityRecord>>,
    /// Single-flight guards for cold-provider probes.
    inflight: Mutex<HashMap<String, Arc<OnceCell<bool>>>>,
}

impl AvailabilityStore {
    pub fn new(probe: Arc<ProbeRunner>) -> Self {
        Self {
            probe,
            records: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Cached availability of a provider, probing on demand when no record
    /// exists yet.
    pub async fn is_available(&self, provider: &str) -> bool {
        if let Some(record) = self.records.read().await.get(provider) {
            return record.available;
        }

        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let available = *cell
            .get_or_init(|| async {
                // A probe that finished between the record check and the
                // guard acquisition already cached its answer.
                if let Some(record) = self.records.read().await.get(provider) {
                    return record.available;
                }

                let result = self.probe.check_provider(provider).await;
                let available = !result.verdict.is_critical();
                let mut records = self.records.write().await;
                records.insert(
                    provider.to_string(),
                    AvailabilityRecord {
                        available,
                        last_checked_at: result.checked_at,
                        last_error: if available { None } else { result.worst_detail() },
                        consecutive_failures: u32::from(!available),
                    },
                );
                available
            })
            .await;

        self.inflight.lock().await.remove(provider);
        available
    }

    /// Immediately mark a provider unusable after a hard failure.
    ///
    /// This is the fast-reaction path: routing avoids a known-bad provider
    /// before the next scheduled probe would catch it.
    pub async fn mark_unavailable(&self, provider: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let mut records = self.records.write().await;
        let record = records
            .entry(provider.to_string())
            .or_insert_with(AvailabilityRecord::fresh);
        record.available = false;
        record.consecutive_failures += 1;
        record.last_error = Some(reason.clone());
        record.last_checked_at = Utc::now();
        warn!(provider = %provider, reason = %reason, "Provider marked unavailable");
    }

    /// Mark a provider usable again and clear its failure streak.
    pub async fn mark_available(&self, provider: &str) {
        let mut records = self.records.write().await;
        let record = records
            .entry(provider.to_string())
            .or_insert_with(AvailabilityRecord::fresh);
        record.available = true;
        record.consecutive_failures = 0;
        record.last_error = None;
        record.last_checked_at = Utc::now();
    }

    /// Fold one probe result into the provider's record.
    ///
    /// Called by the health monitor every cycle. Critical verdicts extend
    /// the failure streak and flip availability only once the streak
    /// reaches `max_consecutive_failures`; healthy/degraded verdicts clear
    /// the streak immediately; warnings touch neither.
    pub async fn apply_verdict(
        &self,
        provider: &str,
        result: &HealthCheckResult,
        max_consecutive_failures: u32,
    ) -> AvailabilityRecord {
        let mut records = self.records.write().await;
        let record = records
            .entry(provider.to_string())
            .or_insert_with(AvailabilityRecord::fresh);

        match result.verdict {
            HealthVerdict::Critical => {
                record.consecutive_failures += 1;
                record.last_error = result.worst_detail();
                if record.consecutive_failures >= max_consecutive_failures {
                    record.available = false;
                }
            }
            HealthVerdict::Healthy | HealthVerdict::Degraded => {
                record.consecutive_failures = 0;
                record.available = true;
                record.last_error = None;
            }
            HealthVerdict::Warning => {
                // Impaired but functioning: the streak neither grows nor
                // clears, and availability stands.
            }
        }
        record.last_checked_at = result.checked_at;
        record.clone()
    }

    /// Current record for a provider, if it has ever been probed or marked.
    pub async fn record(&self, provider: &str) -> Option<AvailabilityRecord> {
        self.records.read().await.get(provider).cloned()
    }

    /// Snapshot of every known record.
    pub async fn snapshot(&self) -> HashMap<String, AvailabilityRecord> {
        self.records.read().await.clone()
    }
}
