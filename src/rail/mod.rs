// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rail abstraction: the capability-typed executor behind each provider.
//!
//! Concrete rails (a blockchain RPC client, a regulated custodial API
//! client) live outside this crate; the router only sees this trait. Every
//! method suspends on the network and is always invoked under a timeout by
//! the execution engine.

pub mod mock;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::RailError;
use crate::models::{Currency, Operation};

pub use mock::MockRail;

/// Health of one of a rail's upstream dependencies, self-reported for the
/// monitor's dependency sub-check.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Context handed to a rail with every operation call.
#[derive(Debug, Clone)]
pub struct RailRequest {
    pub request_id: Uuid,
    pub currency: Currency,
    pub amount_in_minor: Option<u64>,
    /// Operation arguments, opaque to the router.
    pub args: Value,
}

/// A backing execution path for financial operations.
#[async_trait]
pub trait Rail: Send + Sync {
    /// Provider name, matching the registered descriptor.
    fn name(&self) -> &str;

    async fn create_wallet(&self, request: &RailRequest) -> Result<Value, RailError>;
    async fn deposit(&self, request: &RailRequest) -> Result<Value, RailError>;
    async fn withdraw(&self, request: &RailRequest) -> Result<Value, RailError>;
    async fn transfer(&self, request: &RailRequest) -> Result<Value, RailError>;
    async fn batch_transfer(&self, request: &RailRequest) -> Result<Value, RailError>;
    async fn swap(&self, request: &RailRequest) -> Result<Value, RailError>;
    async fn get_balance(&self, request: &RailRequest) -> Result<Value, RailError>;

    /// Connectivity self-check used by the health monitor. Rails without a
    /// cheap probe can keep the default.
    async fn is_available(&self) -> bool {
        true
    }

    /// Upstream dependency health, used by the monitor's dependency
    /// sub-check. Rails without observable dependencies report none.
    async fn dependency_health(&self) -> Vec<DependencyStatus> {
        Vec::new()
    }
}

/// Dispatch an operation to the matching rail method.
pub async fn dispatch(
    rail: &dyn Rail,
    operation: Operation,
    request: &RailRequest,
) -> Result<Value, RailError> {
    match operation {
        Operation::CreateWallet => rail.create_wallet(request).await,
        Operation::Deposit => rail.deposit(request).await,
        Operation::Withdraw => rail.withdraw(request).await,
        Operation::Transfer => rail.transfer(request).await,
        Operation::BatchTransfer => rail.batch_transfer(request).await,
        Operation::Swap => rail.swap(request).await,
        Operation::GetBalance => rail.get_balance(request).await,
    }
}

/// The set of live rails, keyed by provider name.
///
/// Built once at startup alongside the capability registry and shared
/// immutably afterwards.
#[derive(Default)]
pub struct RailSet {
    rails: HashMap<String, Arc<dyn Rail>>,
}

impl RailSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rail; replaces nothing because the registry already enforces
    /// name uniqueness before rails are attached.
    pub fn insert(&mut self, rail: Arc<dyn Rail>) {
        self.rails.insert(rail.name().to_string(), rail);
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn Rail>> {
        self.rails.get(provider).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.rails.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rails.is_empty()
    }
}
