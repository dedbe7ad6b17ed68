// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Service Wiring
//!
//! Builds the registry, availability store, health monitor, router, and
//! execution engine into one [`RailRouterService`] with explicit
//! construction instead of module-level singletons, so tests can stand up
//! isolated instances with fake rails.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::availability::{AvailabilityRecord, AvailabilityStore};
use crate::config::RouterConfig;
use crate::engine::ExecutionEngine;
use crate::error::RouterError;
use crate::events::{EventBus, RouterEvent};
use crate::metrics::{MetricsCollector, MetricsSnapshot};
use crate::models::{
    ExecuteOptions, ExecutedOperation, HealthCheckResult, HealthVerdict, Operation,
    ProviderDescriptor,
};
use crate::monitor::{HealthAlert, HealthMonitor, ProbeRunner};
use crate::rail::{Rail, RailSet};
use crate::registry::CapabilityRegistry;
use crate::router::Router;

/// Per-provider snapshot for operator dashboards: capabilities,
/// availability, last verdict, and windowed metrics side by side.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderComparison {
    pub name: String,
    pub priority: u32,
    pub currencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<AvailabilityRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<HealthVerdict>,
    pub metrics: MetricsSnapshot,
}

/// Builder for [`RailRouterService`]; registration failures surface before
/// anything starts running.
pub struct RailRouterBuilder {
    config: RouterConfig,
    registry: CapabilityRegistry,
    rails: RailSet,
}

impl RailRouterBuilder {
    pub fn new(config: RouterConfig) -> Self {
        let registry = CapabilityRegistry::new(config.universal_fallback_currency.clone());
        Self {
            config,
            registry,
            rails: RailSet::new(),
        }
    }

    /// Register a provider: its capability descriptor plus the rail that
    /// executes its operations. The rail's name must match the descriptor.
    pub fn register(
        mut self,
        descriptor: ProviderDescriptor,
        rail: Arc<dyn Rail>,
    ) -> Result<Self, RouterError> {
        if descriptor.name != rail.name() {
            return Err(RouterError::UnknownProvider(rail.name().to_string()));
        }
        self.registry.register(descriptor)?;
        self.rails.insert(rail);
        Ok(self)
    }

    pub fn build(self) -> RailRouterService {
        let config = Arc::new(self.config);
        let registry = Arc::new(self.registry);
        let rails = Arc::new(self.rails);
        let metrics = Arc::new(MetricsCollector::new(config.metrics_window));
        let events = EventBus::default();

        let probe = Arc::new(ProbeRunner::new(
            rails.clone(),
            registry.clone(),
            metrics.clone(),
            config.clone(),
        ));
        let availability = Arc::new(AvailabilityStore::new(probe.clone()));
        let router = Arc::new(Router::new(
            registry.clone(),
            availability.clone(),
            config.clone(),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            probe,
            availability.clone(),
            registry.clone(),
            events.clone(),
            config.clone(),
        ));
        let engine = ExecutionEngine::new(
            rails,
            router.clone(),
            availability.clone(),
            metrics.clone(),
            events.clone(),
            config.clone(),
        );

        RailRouterService {
            config,
            registry,
            availability,
            metrics,
            events,
            router,
            monitor,
            engine,
        }
    }
}

/// The assembled multi-rail router service.
pub struct RailRouterService {
    config: Arc<RouterConfig>,
    registry: Arc<CapabilityRegistry>,
    availability: Arc<AvailabilityStore>,
    metrics: Arc<MetricsCollector>,
    events: EventBus,
    router: Arc<Router>,
    monitor: Arc<HealthMonitor>,
    engine: ExecutionEngine,
}

impl RailRouterService {
    /// Start the periodic health monitor, when auto-failover is enabled.
    pub fn start(&self) {
        if self.config.auto_failover {
            self.monitor
                .clone()
                .start(self.config.health_check_interval);
        } else {
            info!("Auto-failover disabled; health monitor not started");
        }
    }

    /// Stop background work; safe to call more than once.
    pub fn shutdown(&self) {
        self.monitor.stop();
    }

    /// Execute one operation with routing and failover.
    pub async fn execute(
        &self,
        operation: Operation,
        args: serde_json::Value,
        options: ExecuteOptions,
    ) -> Result<ExecutedOperation, RouterError> {
        self.engine.execute(operation, args, options).await
    }

    /// Subscribe to operation and health events.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.events.subscribe()
    }

    /// Run the single-provider health check on demand.
    pub async fn check_provider(&self, provider: &str) -> HealthCheckResult {
        self.monitor.check_provider(provider).await
    }

    /// Switch the default primary provider at runtime.
    pub fn switch_primary_provider(&self, provider: &str) -> Result<(), RouterError> {
        if !self.registry.contains(provider) {
            return Err(RouterError::UnknownProvider(provider.to_string()));
        }
        self.router.set_primary(Some(provider.to_string()));
        info!(provider = %provider, "Primary provider switched");
        Ok(())
    }

    /// Current default primary provider, if any.
    pub fn primary_provider(&self) -> Option<String> {
        self.router.primary()
    }

    /// Side-by-side provider snapshot for operator dashboards.
    pub async fn provider_comparison(&self) -> Vec<ProviderComparison> {
        let availability = self.availability.snapshot().await;

        self.registry
            .names_by_priority()
            .into_iter()
            .filter_map(|name| {
                let descriptor = self.registry.get(&name)?;
                let mut currencies: Vec<String> = descriptor
                    .currencies
                    .iter()
                    .map(|currency| currency.as_str().to_string())
                    .collect();
                currencies.sort();

                Some(ProviderComparison {
                    priority: descriptor.priority,
                    currencies,
                    availability: availability.get(&name).cloned(),
                    verdict: self.monitor.last_verdict(&name),
                    metrics: self.metrics.snapshot(&name),
                    name,
                })
            })
            .collect()
    }

    /// Recent warning-or-worse health alerts, oldest first.
    pub fn recent_alerts(&self) -> Vec<HealthAlert> {
        self.monitor.recent_alerts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RailError;
    use crate::rail::MockRail;
    use serde_json::json;

    fn service() -> (RailRouterService, Arc<MockRail>, Arc<MockRail>) {
        let chain = Arc::new(MockRail::new("chain-rail", ["USDC", "EURC"]));
        let custody = Arc::new(MockRail::new("custody-rail", ["USDC"]));

        let service = RailRouterBuilder::new(RouterConfig::default())
            .register(
                ProviderDescriptor::new("chain-rail", 1).with_currencies(["USDC", "EURC"]),
                chain.clone(),
            )
            .unwrap()
            .register(
                ProviderDescriptor::new("custody-rail", 2).with_currencies(["USDC"]),
                custody.clone(),
            )
            .unwrap()
            .build();

        (service, chain, custody)
    }

    #[tokio::test]
    async fn end_to_end_execute_and_failover() {
        let (service, chain, _custody) = service();
        chain.fail_next(RailError::Connection("ECONNREFUSED".into()));

        let result = service
            .execute(
                Operation::Transfer,
                json!({"to": "0xabc"}),
                ExecuteOptions::for_currency("USDC"),
            )
            .await
            .unwrap();

        assert_eq!(result.provider, "custody-rail");
    }

    #[test]
    fn builder_rejects_mismatched_rail_names() {
        let err = RailRouterBuilder::new(RouterConfig::default())
            .register(
                ProviderDescriptor::new("chain-rail", 1),
                Arc::new(MockRail::new("custody-rail", ["USDC"])),
            )
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, RouterError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn switch_primary_validates_the_provider() {
        let (service, _, _) = service();

        assert!(service.switch_primary_provider("ghost").is_err());
        service.switch_primary_provider("custody-rail").unwrap();
        assert_eq!(
            service.primary_provider().as_deref(),
            Some("custody-rail")
        );

        let result = service
            .execute(
                Operation::Transfer,
                json!({}),
                ExecuteOptions::for_currency("USDC"),
            )
            .await
            .unwrap();
        assert_eq!(result.provider, "custody-rail");
    }

    #[tokio::test]
    async fn provider_comparison_reflects_traffic_and_health() {
        let (service, chain, _) = service();
        chain.fail_next(RailError::Connection("ECONNREFUSED".into()));

        service
            .execute(
                Operation::Transfer,
                json!({}),
                ExecuteOptions::for_currency("USDC"),
            )
            .await
            .unwrap();

        let comparison = service.provider_comparison().await;
        assert_eq!(comparison.len(), 2);

        let chain_row = comparison
            .iter()
            .find(|row| row.name == "chain-rail")
            .unwrap();
        assert_eq!(chain_row.priority, 1);
        assert_eq!(chain_row.metrics.total_failures, 1);
        assert!(!chain_row.availability.as_ref().unwrap().available);

        let custody_row = comparison
            .iter()
            .find(|row| row.name == "custody-rail")
            .unwrap();
        assert_eq!(custody_row.metrics.total_calls, 1);
        assert_eq!(custody_row.metrics.total_failures, 0);
    }

    #[tokio::test]
    async fn start_and_shutdown_are_idempotent() {
        let (service, _, _) = service();
        service.start();
        service.start();
        service.shutdown();
        service.shutdown();
    }
}
