// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the rail router.
//!
//! [`RailError`] covers failures raised by a single provider call and knows
//! how to classify itself (critical/network vs business vs capability).
//! [`RouterError`] is the surface the caller sees: registration conflicts,
//! routing dead-ends, exhaustion, and deadline overruns.

use thiserror::Error;

use crate::models::{Currency, ExecutionAttempt, Operation};

/// Classification of a failed provider call.
///
/// Drives the execution engine's failover decision:
/// - `Critical` failures mark the provider unavailable and move on to the
///   next candidate.
/// - `Business` failures short-circuit to the caller; another rail cannot
///   fix an insufficient balance or a validation error.
/// - `Capability` failures (this rail cannot settle the currency) move on
///   to the next candidate without penalizing the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Critical,
    Business,
    Capability,
}

/// Markers that identify a network-class failure in freeform error text.
const CRITICAL_MARKERS: &[&str] = &[
    "ECONNREFUSED",
    "ECONNRESET",
    "ETIMEDOUT",
    "ENOTFOUND",
    "dns error",
    "Service Unavailable",
    "Gateway Timeout",
];

/// Failure raised by a single rail call.
#[derive(Debug, Clone, Error)]
pub enum RailError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("call timed out after {0} ms")]
    Timeout(u64),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("currency {0} not supported by this rail")]
    UnsupportedCurrency(Currency),

    #[error("{0}")]
    Other(String),
}

impl RailError {
    /// Classify this failure for the failover decision.
    ///
    /// Freeform `Other` errors are sniffed for the network markers the
    /// upstream vendors put in their messages; anything unrecognized is
    /// treated as a business error and propagated rather than retried.
    pub fn kind(&self) -> FailureKind {
        match self {
            RailError::Connection(_) | RailError::Timeout(_) | RailError::Unavailable(_) => {
                FailureKind::Critical
            }
            RailError::InsufficientFunds(_)
            | RailError::Validation(_)
            | RailError::Rejected(_) => FailureKind::Business,
            RailError::UnsupportedCurrency(_) => FailureKind::Capability,
            RailError::Other(message) => {
                if CRITICAL_MARKERS
                    .iter()
                    .any(|marker| message.contains(marker))
                {
                    FailureKind::Critical
                } else {
                    FailureKind::Business
                }
            }
        }
    }

    pub fn is_critical(&self) -> bool {
        self.kind() == FailureKind::Critical
    }
}

/// Errors surfaced to callers of the router/engine pair.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Registration-time name collision; fatal to startup.
    #[error("provider already registered: {0}")]
    DuplicateProvider(String),

    /// Provider name not known to the registry.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Providers are up, but none supports the requested currency.
    #[error("no registered provider supports {currency} for {operation}")]
    CapabilityMismatch {
        operation: Operation,
        currency: Currency,
    },

    /// The router produced zero candidates; no call was attempted.
    #[error("no provider available for {operation}")]
    NoProviderAvailable { operation: Operation },

    /// A single provider call failed with a business error; not retried.
    #[error("provider {provider} failed: {source}")]
    ProviderCall {
        provider: String,
        #[source]
        source: RailError,
    },

    /// Every candidate failed; carries the ordered attempt trail.
    #[error("all {count} candidate provider(s) failed; last error: {last_error}")]
    AllProvidersFailed {
        count: usize,
        attempts: Vec<ExecutionAttempt>,
        last_error: String,
    },

    /// The caller-supplied deadline elapsed mid-failover.
    #[error("deadline of {deadline_ms} ms exceeded after {} attempt(s)", attempts.len())]
    DeadlineExceeded {
        deadline_ms: u64,
        attempts: Vec<ExecutionAttempt>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_errors_are_critical() {
        assert!(RailError::Connection("refused".into()).is_critical());
        assert!(RailError::Timeout(30_000).is_critical());
        assert!(RailError::Unavailable("maintenance".into()).is_critical());
    }

    #[test]
    fn business_errors_are_not_critical() {
        assert_eq!(
            RailError::InsufficientFunds("balance 0".into()).kind(),
            FailureKind::Business
        );
        assert_eq!(
            RailError::Validation("bad address".into()).kind(),
            FailureKind::Business
        );
    }

    #[test]
    fn unsupported_currency_is_capability() {
        let err = RailError::UnsupportedCurrency(Currency::from("GBP"));
        assert_eq!(err.kind(), FailureKind::Capability);
        assert!(!err.is_critical());
    }

    #[test]
    fn freeform_errors_sniffed_for_network_markers() {
        assert!(RailError::Other("connect ECONNREFUSED 10.0.0.1:443".into()).is_critical());
        assert!(RailError::Other("upstream returned 503 Service Unavailable".into()).is_critical());
        assert_eq!(
            RailError::Other("account is frozen".into()).kind(),
            FailureKind::Business
        );
    }
}
