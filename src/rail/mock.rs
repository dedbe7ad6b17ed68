// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Mock Rail
//!
//! In-memory rail with scripted behavior, used by the demo daemon and by
//! tests. Mirrors the mock mode the production rails expose for
//! development environments: configurable latency, scripted failures, and
//! toggleable availability, with no network access.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{DependencyStatus, Rail, RailRequest};
use crate::error::RailError;
use crate::models::{Currency, Operation};

/// Scripted in-memory rail.
pub struct MockRail {
    name: String,
    currencies: HashSet<Currency>,
    latency: Duration,
    probe_delay: Duration,
    available: AtomicBool,
    calls: AtomicU64,
    probes: AtomicU64,
    /// Errors returned by upcoming calls, in order, before normal behavior
    /// resumes.
    scripted_failures: Mutex<VecDeque<RailError>>,
    dependencies: Mutex<Vec<DependencyStatus>>,
}

impl MockRail {
    pub fn new<I, C>(name: impl Into<String>, currencies: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Currency>,
    {
        Self {
            name: name.into(),
            currencies: currencies.into_iter().map(Into::into).collect(),
            latency: Duration::ZERO,
            probe_delay: Duration::ZERO,
            available: AtomicBool::new(true),
            calls: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            scripted_failures: Mutex::new(VecDeque::new()),
            dependencies: Mutex::new(Vec::new()),
        }
    }

    /// Simulate per-operation latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Simulate connectivity-probe latency.
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    /// Toggle the connectivity self-check result.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Queue an error for the next operation call.
    pub fn fail_next(&self, error: RailError) {
        self.scripted_failures.lock().push_back(error);
    }

    /// Queue the same error for the next `n` operation calls.
    pub fn fail_next_n(&self, error: RailError, n: usize) {
        let mut failures = self.scripted_failures.lock();
        for _ in 0..n {
            failures.push_back(error.clone());
        }
    }

    /// Report an upstream dependency as healthy or impaired.
    pub fn set_dependency(&self, name: impl Into<String>, healthy: bool) {
        let name = name.into();
        let mut dependencies = self.dependencies.lock();
        if let Some(dep) = dependencies.iter_mut().find(|dep| dep.name == name) {
            dep.healthy = healthy;
        } else {
            dependencies.push(DependencyStatus {
                name,
                healthy,
                detail: None,
            });
        }
    }

    /// Number of operation calls that reached this rail.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of connectivity probes that reached this rail.
    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }

    async fn respond(&self, operation: Operation, request: &RailRequest) -> Result<Value, RailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }

        if !self.currencies.contains(&request.currency) {
            return Err(RailError::UnsupportedCurrency(request.currency.clone()));
        }

        Ok(json!({
            "id": format!("{}_{}", self.name, Uuid::new_v4()),
            "operation": operation.as_str(),
            "currency": request.currency.as_str(),
            "amount_in_minor": request.amount_in_minor,
            "status": "confirmed",
        }))
    }
}

#[async_trait]
impl Rail for MockRail {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create_wallet(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.respond(Operation::CreateWallet, request).await
    }

    async fn deposit(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.respond(Operation::Deposit, request).await
    }

    async fn withdraw(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.respond(Operation::Withdraw, request).await
    }

    async fn transfer(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.respond(Operation::Transfer, request).await
    }

    async fn batch_transfer(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.respond(Operation::BatchTransfer, request).await
    }

    async fn swap(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.respond(Operation::Swap, request).await
    }

    async fn get_balance(&self, request: &RailRequest) -> Result<Value, RailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }

        Ok(json!({
            "currency": request.currency.as_str(),
            "balance_in_minor": 0,
        }))
    }

    async fn is_available(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.available.load(Ordering::SeqCst)
    }

    async fn dependency_health(&self) -> Vec<DependencyStatus> {
        self.dependencies.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(currency: &str) -> RailRequest {
        RailRequest {
            request_id: Uuid::new_v4(),
            currency: Currency::from(currency),
            amount_in_minor: Some(500),
            args: json!({}),
        }
    }

    #[tokio::test]
    async fn confirmed_payload_for_supported_currency() {
        let rail = MockRail::new("chain-rail", ["USDC"]);
        let payload = rail.transfer(&request("usdc")).await.unwrap();
        assert_eq!(payload["status"], "confirmed");
        assert_eq!(payload["currency"], "USDC");
    }

    #[tokio::test]
    async fn unsupported_currency_is_rejected() {
        let rail = MockRail::new("custody-rail", ["EURC"]);
        let err = rail.transfer(&request("GBP")).await.unwrap_err();
        assert!(matches!(err, RailError::UnsupportedCurrency(_)));
    }

    #[tokio::test]
    async fn scripted_failures_pop_in_order() {
        let rail = MockRail::new("chain-rail", ["USDC"]);
        rail.fail_next(RailError::Connection("refused".into()));

        assert!(rail.transfer(&request("USDC")).await.is_err());
        assert!(rail.transfer(&request("USDC")).await.is_ok());
        assert_eq!(rail.calls(), 2);
    }

    #[tokio::test]
    async fn scripted_failure_bursts() {
        let rail = MockRail::new("chain-rail", ["USDC"]);
        rail.fail_next_n(RailError::Unavailable("maintenance".into()), 2);

        assert!(rail.transfer(&request("USDC")).await.is_err());
        assert!(rail.transfer(&request("USDC")).await.is_err());
        assert!(rail.transfer(&request("USDC")).await.is_ok());
    }

    #[tokio::test]
    async fn availability_toggle() {
        let rail = MockRail::new("chain-rail", ["USDC"]);
        assert!(rail.is_available().await);
        rail.set_available(false);
        assert!(!rail.is_available().await);
    }

    #[tokio::test]
    async fn dependency_reports_update_in_place() {
        let rail = MockRail::new("chain-rail", ["USDC"]);
        rail.set_dependency("rpc-archive", false);
        rail.set_dependency("rpc-archive", true);

        let deps = rail.dependency_health().await;
        assert_eq!(deps.len(), 1);
        assert!(deps[0].healthy);
    }
}
