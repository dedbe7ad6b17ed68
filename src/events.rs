// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Typed event channel for operation outcomes and health transitions.
//!
//! External collaborators (logging, alerting, dashboards) subscribe to a
//! broadcast channel instead of hooking ad hoc emitter callbacks, so the
//! dependency direction is visible in the types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{ExecutionAttempt, HealthVerdict, Operation};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Events emitted by the engine and the health monitor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouterEvent {
    /// An operation succeeded; exactly one per successful request.
    OperationSuccess {
        request_id: Uuid,
        operation: Operation,
        provider: String,
        latency_ms: u64,
    },
    /// An operation failed after routing; exactly one per failed request,
    /// carrying the full attempt trail.
    OperationFailed {
        request_id: Uuid,
        operation: Operation,
        attempts: Vec<ExecutionAttempt>,
    },
    /// A single provider call failed (one per failed attempt).
    ProviderError {
        provider: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// Per-cycle health snapshot of every registered provider.
    HealthStatus {
        verdicts: HashMap<String, HealthVerdict>,
        timestamp: DateTime<Utc>,
    },
    /// A provider's aggregate verdict changed since the previous cycle.
    ProviderStatusChanged {
        provider: String,
        previous: Option<HealthVerdict>,
        current: HealthVerdict,
    },
}

/// Broadcast bus for [`RouterEvent`]s.
///
/// Sending never fails: with no subscribers the event is dropped, and slow
/// subscribers observe a `Lagged` error rather than blocking the router.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RouterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: RouterEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(RouterEvent::ProviderError {
            provider: "chain-rail".to_string(),
            error: "connection failed".to_string(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            RouterEvent::ProviderError { provider, .. } => assert_eq!(provider, "chain-rail"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_a_noop() {
        let bus = EventBus::default();
        bus.emit(RouterEvent::HealthStatus {
            verdicts: HashMap::new(),
            timestamp: Utc::now(),
        });
    }
}
