// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Execution Engine
//!
//! Walks the router's candidate list and invokes the operation on each
//! provider in turn until one succeeds or all are exhausted. Retry here
//! means failover: each retry targets a *different* provider, never the
//! same one twice within a request.
//!
//! ## Failure handling
//!
//! - **Critical/network** failures mark the provider unavailable (so
//!   routing reacts before the next probe cycle) and move to the next
//!   candidate.
//! - **Business** failures short-circuit to the caller; a different rail
//!   cannot fix an insufficient balance.
//! - **Capability** failures (the last-resort routing path handed us a
//!   provider without the currency) move on without penalty.
//!
//! Every attempt runs under a per-provider timeout capped by the request
//! deadline; a timed-out attempt is treated identically to a failed one.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityStore;
use crate::config::RouterConfig;
use crate::error::{FailureKind, RailError, RouterError};
use crate::events::{EventBus, RouterEvent};
use crate::metrics::MetricsCollector;
use crate::models::{
    AttemptOutcome, ExecuteOptions, ExecutedOperation, ExecutionAttempt, Operation,
};
use crate::rail::{dispatch, RailRequest, RailSet};
use crate::router::{RouteDecision, Router};

/// Runs operations against routed candidates with failover semantics.
pub struct ExecutionEngine {
    rails: Arc<RailSet>,
    router: Arc<Router>,
    availability: Arc<AvailabilityStore>,
    metrics: Arc<MetricsCollector>,
    events: EventBus,
    config: Arc<RouterConfig>,
}

impl ExecutionEngine {
    pub fn new(
        rails: Arc<RailSet>,
        router: Arc<Router>,
        availability: Arc<AvailabilityStore>,
        metrics: Arc<MetricsCollector>,
        events: EventBus,
        config: Arc<RouterConfig>,
    ) -> Self {
        Self {
            rails,
            router,
            availability,
            metrics,
            events,
            config,
        }
    }

    /// Execute one operation with routing, failover, and a deadline.
    ///
    /// Returns the first successful result, stamped with the provider that
    /// served it and the attempt latency, or one error from the taxonomy
    /// with the attempt trail attached where it helps diagnosis.
    pub async fn execute(
        &self,
        operation: Operation,
        args: Value,
        options: ExecuteOptions,
    ) -> Result<ExecutedOperation, RouterError> {
        let request_id = Uuid::new_v4();
        let deadline_ms = options.deadline.map(|d| d.as_millis() as u64);
        let deadline = options.deadline.map(|d| tokio::time::Instant::now() + d);

        let routing = self
            .router
            .route(&options.currency, options.preferred_provider.as_deref());
        let decision = match deadline {
            Some(at) => match tokio::time::timeout_at(at, routing).await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!(
                        request_id = %request_id,
                        operation = %operation,
                        "Deadline elapsed during routing"
                    );
                    return self.fail(
                        request_id,
                        operation,
                        Vec::new(),
                        RouterError::DeadlineExceeded {
                            deadline_ms: deadline_ms.unwrap_or_default(),
                            attempts: Vec::new(),
                        },
                    );
                }
            },
            None => routing.await,
        };

        let candidates = match decision {
            RouteDecision::Candidates(candidates) => candidates,
            RouteDecision::CapabilityGap => {
                return self.fail(
                    request_id,
                    operation,
                    Vec::new(),
                    RouterError::CapabilityMismatch {
                        operation,
                        currency: options.currency.clone(),
                    },
                );
            }
            RouteDecision::Unavailable => {
                return self.fail(
                    request_id,
                    operation,
                    Vec::new(),
                    RouterError::NoProviderAvailable { operation },
                );
            }
        };

        let limit = options.max_candidates.unwrap_or(candidates.len());
        let request = RailRequest {
            request_id,
            currency: options.currency.clone(),
            amount_in_minor: options.amount_in_minor,
            args,
        };

        let mut attempts: Vec<ExecutionAttempt> = Vec::new();
        let mut last_error: Option<RailError> = None;

        for provider in candidates.into_iter().take(limit) {
            if let Some(at) = deadline {
                if tokio::time::Instant::now() >= at {
                    warn!(
                        request_id = %request_id,
                        operation = %operation,
                        attempts = attempts.len(),
                        "Deadline elapsed mid-failover"
                    );
                    let trail = attempts.clone();
                    return self.fail(
                        request_id,
                        operation,
                        trail,
                        RouterError::DeadlineExceeded {
                            deadline_ms: deadline_ms.unwrap_or_default(),
                            attempts,
                        },
                    );
                }
            }

            let Some(rail) = self.rails.get(&provider) else {
                warn!(provider = %provider, "Routed provider has no rail attached; skipping");
                continue;
            };

            let mut budget = self.config.provider_timeout(&provider);
            if let Some(at) = deadline {
                budget = budget.min(at.saturating_duration_since(tokio::time::Instant::now()));
            }

            let started_at = Utc::now();
            let attempt_started = tokio::time::Instant::now();
            let outcome =
                tokio::time::timeout(budget, dispatch(rail.as_ref(), operation, &request)).await;
            let latency_ms = attempt_started.elapsed().as_millis() as u64;

            let error = match outcome {
                Ok(Ok(payload)) => {
                    self.metrics.record_success(&provider, latency_ms);
                    info!(
                        request_id = %request_id,
                        operation = %operation,
                        provider = %provider,
                        latency_ms = latency_ms,
                        "Operation served"
                    );
                    self.events.emit(RouterEvent::OperationSuccess {
                        request_id,
                        operation,
                        provider: provider.clone(),
                        latency_ms,
                    });
                    return Ok(ExecutedOperation {
                        request_id,
                        operation,
                        provider,
                        latency_ms,
                        payload,
                    });
                }
                Ok(Err(error)) => error,
                Err(_) => RailError::Timeout(budget.as_millis() as u64),
            };

            self.metrics.record_failure(&provider, latency_ms);
            self.events.emit(RouterEvent::ProviderError {
                provider: provider.clone(),
                error: error.to_string(),
                timestamp: Utc::now(),
            });

            let kind = error.kind();
            attempts.push(ExecutionAttempt {
                provider: provider.clone(),
                started_at,
                latency_ms,
                outcome: AttemptOutcome::Failed {
                    error: error.to_string(),
                    critical: kind == FailureKind::Critical,
                },
            });

            match kind {
                FailureKind::Critical => {
                    warn!(
                        request_id = %request_id,
                        provider = %provider,
                        error = %error,
                        "Critical provider failure; failing over"
                    );
                    self.availability
                        .mark_unavailable(&provider, error.to_string())
                        .await;
                    last_error = Some(error);
                }
                FailureKind::Capability => {
                    debug!(
                        request_id = %request_id,
                        provider = %provider,
                        "Provider cannot settle the currency; trying next candidate"
                    );
                    last_error = Some(error);
                }
                FailureKind::Business => {
                    let trail = attempts.clone();
                    return self.fail(
                        request_id,
                        operation,
                        trail,
                        RouterError::ProviderCall {
                            provider,
                            source: error,
                        },
                    );
                }
            }
        }

        let last_error = last_error
            .map(|error| error.to_string())
            .unwrap_or_else(|| "no candidate attempted".to_string());
        let trail = attempts.clone();
        self.fail(
            request_id,
            operation,
            trail,
            RouterError::AllProvidersFailed {
                count: attempts.len(),
                attempts,
                last_error,
            },
        )
    }

    /// Emit the single failure event for this request and return the error.
    fn fail(
        &self,
        request_id: Uuid,
        operation: Operation,
        attempts: Vec<ExecutionAttempt>,
        error: RouterError,
    ) -> Result<ExecutedOperation, RouterError> {
        self.events.emit(RouterEvent::OperationFailed {
            request_id,
            operation,
            attempts,
        });
        Err(error)
    }
}
