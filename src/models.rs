// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Core Data Models
//!
//! This module defines the data structures shared across the router:
//! provider capability descriptors, operation requests, execution attempts,
//! and health verdicts. All wire-facing types derive `Serialize` for the
//! event channel.
//!
//! ## Currency Type
//!
//! The [`Currency`] newtype wraps uppercase ISO-style currency codes
//! (`USDC`, `EURC`, ...). Construction normalizes case so lookups never
//! depend on caller formatting.
//!
//! ## Model Categories
//!
//! - **Capabilities**: what a provider can do ([`ProviderDescriptor`])
//! - **Operations**: the closed set of routable operations ([`Operation`])
//! - **Execution**: per-request options and the per-candidate attempt trail
//! - **Health**: sub-check results and aggregate verdicts

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Currency Type
// =============================================================================

/// Uppercase currency code wrapper.
///
/// Provides type safety for currency codes throughout the router.
/// Construction uppercases the code, so `Currency::from("usdc")` and
/// `Currency::from("USDC")` compare equal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency(String);

impl Currency {
    /// Get the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(value: &str) -> Self {
        Currency(value.to_ascii_uppercase())
    }
}

impl From<String> for Currency {
    fn from(value: String) -> Self {
        Currency(value.to_ascii_uppercase())
    }
}

// =============================================================================
// Provider Capabilities
// =============================================================================

/// Rough throughput ceiling a provider is rated for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThroughputClass {
    Standard,
    High,
    VeryHigh,
}

impl ThroughputClass {
    /// Rated call budget per minute, used by the rate-limit headroom check.
    pub fn calls_per_minute(&self) -> u64 {
        match self {
            ThroughputClass::Standard => 600,
            ThroughputClass::High => 6_000,
            ThroughputClass::VeryHigh => 60_000,
        }
    }
}

/// Average fee band for operations on a provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeeClass {
    Low,
    Medium,
    High,
}

/// How quickly a provider settles an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementLatencyClass {
    Instant,
    Seconds,
    Minutes,
    Hours,
}

/// Optional capabilities a provider may declare.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RailFeature {
    BatchTransfer,
    NativeSwap,
    InstantFinality,
    MultiCurrencyMint,
}

/// Static description of a provider's capabilities and rank.
///
/// Created once at startup and never mutated. Lower `priority` means the
/// provider is preferred by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider name (registration rejects duplicates).
    pub name: String,
    /// Priority rank; lower is preferred.
    pub priority: u32,
    /// Currencies this provider can settle.
    pub currencies: HashSet<Currency>,
    /// Rated throughput class.
    pub throughput: ThroughputClass,
    /// Average fee band.
    pub fee: FeeClass,
    /// Settlement latency class.
    pub settlement: SettlementLatencyClass,
    /// Declared optional features.
    pub features: HashSet<RailFeature>,
}

impl ProviderDescriptor {
    /// Create a descriptor with empty capability sets and mid-range classes.
    pub fn new(name: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            priority,
            currencies: HashSet::new(),
            throughput: ThroughputClass::Standard,
            fee: FeeClass::Medium,
            settlement: SettlementLatencyClass::Seconds,
            features: HashSet::new(),
        }
    }

    /// Add supported currencies.
    pub fn with_currencies<I, C>(mut self, currencies: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Currency>,
    {
        self.currencies.extend(currencies.into_iter().map(Into::into));
        self
    }

    /// Set the throughput class.
    pub fn with_throughput(mut self, throughput: ThroughputClass) -> Self {
        self.throughput = throughput;
        self
    }

    /// Set the fee class.
    pub fn with_fee(mut self, fee: FeeClass) -> Self {
        self.fee = fee;
        self
    }

    /// Set the settlement latency class.
    pub fn with_settlement(mut self, settlement: SettlementLatencyClass) -> Self {
        self.settlement = settlement;
        self
    }

    /// Add declared features.
    pub fn with_features<I>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = RailFeature>,
    {
        self.features.extend(features);
        self
    }

    /// Whether this provider declares support for a currency.
    pub fn supports_currency(&self, currency: &Currency) -> bool {
        self.currencies.contains(currency)
    }

    /// Whether this provider declares a feature.
    pub fn has_feature(&self, feature: RailFeature) -> bool {
        self.features.contains(&feature)
    }
}

// =============================================================================
// Operations
// =============================================================================

/// The closed set of routable financial operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    CreateWallet,
    Deposit,
    Withdraw,
    Transfer,
    BatchTransfer,
    Swap,
    GetBalance,
}

impl Operation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateWallet => "createWallet",
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
            Operation::Transfer => "transfer",
            Operation::BatchTransfer => "batchTransfer",
            Operation::Swap => "swap",
            Operation::GetBalance => "getBalance",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Execution Models
// =============================================================================

/// Per-request routing options.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Currency the operation settles in (required for routing).
    pub currency: Currency,
    /// Explicit provider preference for this request.
    pub preferred_provider: Option<String>,
    /// Maximum number of candidates to try; `None` means all.
    pub max_candidates: Option<usize>,
    /// Overall deadline for the request, including failover.
    pub deadline: Option<Duration>,
    /// Operation amount in minor units, when applicable.
    pub amount_in_minor: Option<u64>,
}

impl ExecuteOptions {
    /// Options with only the required currency set.
    pub fn for_currency(currency: impl Into<Currency>) -> Self {
        Self {
            currency: currency.into(),
            preferred_provider: None,
            max_candidates: None,
            deadline: None,
            amount_in_minor: None,
        }
    }

    /// Set an explicit provider preference.
    pub fn preferring(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    /// Bound the number of candidates tried.
    pub fn max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = Some(max);
        self
    }

    /// Set the overall request deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the operation amount in minor units.
    pub fn amount_in_minor(mut self, amount: u64) -> Self {
        self.amount_in_minor = Some(amount);
        self
    }
}

/// Outcome of a single candidate attempt.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed {
        error: String,
        /// Whether the failure was classified critical (network-class).
        critical: bool,
    },
}

/// Record of one provider tried for one operation request.
///
/// The ordered sequence of attempts forms the audit trail carried by
/// exhaustion errors and failure events.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ExecutionAttempt {
    pub provider: String,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub outcome: AttemptOutcome,
}

/// A successful operation result, stamped with the provider that served it.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedOperation {
    pub request_id: Uuid,
    pub operation: Operation,
    /// Provider that served the request.
    pub provider: String,
    /// Wall-clock latency of the winning attempt.
    pub latency_ms: u64,
    /// Opaque provider result payload.
    pub payload: serde_json::Value,
}

// =============================================================================
// Health Models
// =============================================================================

/// Classified provider health state.
///
/// Variants are declared in ascending severity so `Ord` ranks
/// `critical > degraded > warning > healthy` for worst-wins aggregation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    /// A non-critical dependency is impaired, but the provider functions.
    Warning,
    /// Elevated latency above the configured threshold, but functioning.
    Degraded,
    /// The provider cannot serve requests.
    Critical,
}

impl HealthVerdict {
    pub fn is_critical(&self) -> bool {
        matches!(self, HealthVerdict::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthVerdict::Healthy => "healthy",
            HealthVerdict::Warning => "warning",
            HealthVerdict::Degraded => "degraded",
            HealthVerdict::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single sub-check within a provider probe.
#[derive(Debug, Clone, Serialize)]
pub struct SubCheck {
    /// Sub-check name (`connectivity`, `dependencies`, `rate_limit`).
    pub name: &'static str,
    pub verdict: HealthVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Full result of one provider probe: sub-checks plus aggregate verdict.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub provider: String,
    pub checked_at: DateTime<Utc>,
    pub checks: Vec<SubCheck>,
    /// Worst sub-check verdict.
    pub verdict: HealthVerdict,
}

impl HealthCheckResult {
    /// Detail string of the worst sub-check, for availability records.
    pub fn worst_detail(&self) -> Option<String> {
        self.checks
            .iter()
            .filter(|check| check.verdict == self.verdict)
            .find_map(|check| check.detail.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_normalizes_case() {
        assert_eq!(Currency::from("usdc"), Currency::from("USDC"));
        assert_eq!(Currency::from("eurc").as_str(), "EURC");
    }

    #[test]
    fn verdict_severity_ordering() {
        assert!(HealthVerdict::Critical > HealthVerdict::Degraded);
        assert!(HealthVerdict::Degraded > HealthVerdict::Warning);
        assert!(HealthVerdict::Warning > HealthVerdict::Healthy);

        let worst = [
            HealthVerdict::Healthy,
            HealthVerdict::Degraded,
            HealthVerdict::Warning,
        ]
        .into_iter()
        .max()
        .unwrap();
        assert_eq!(worst, HealthVerdict::Degraded);
    }

    #[test]
    fn descriptor_capability_lookups() {
        let descriptor = ProviderDescriptor::new("chain-rail", 1)
            .with_currencies(["USDC", "eurc"])
            .with_features([RailFeature::BatchTransfer]);

        assert!(descriptor.supports_currency(&Currency::from("EURC")));
        assert!(!descriptor.supports_currency(&Currency::from("GBP")));
        assert!(descriptor.has_feature(RailFeature::BatchTransfer));
        assert!(!descriptor.has_feature(RailFeature::NativeSwap));
    }

    #[test]
    fn operation_wire_names() {
        assert_eq!(Operation::CreateWallet.as_str(), "createWallet");
        assert_eq!(Operation::BatchTransfer.as_str(), "batchTransfer");
        assert_eq!(
            serde_json::to_string(&Operation::GetBalance).unwrap(),
            "\"getBalance\""
        );
    }
}
