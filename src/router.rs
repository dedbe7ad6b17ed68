// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Router
//!
//! Produces the ordered candidate list of providers for one operation
//! request. The ordering is deterministic:
//!
//! 1. The explicit per-request preference, when available and
//!    currency-capable, goes first.
//! 2. Remaining available, currency-capable providers follow by ascending
//!    priority rank (name as tie-break), with the configured primary and
//!    fallback providers promoted ahead of plain rank.
//! 3. If that yields nothing and the currency is not the universal
//!    fallback currency, one bounded grace-window wait: an unsupported
//!    currency with a declared provider is more often a transient outage
//!    of that provider than a true capability gap.
//! 4. As a last resort, every currently-available provider in priority
//!    order regardless of declared currency support; the execution engine
//!    then fails fast per candidate. This path is configurable
//!    (`RAIL_CURRENCY_MISMATCH_FALLBACK`) and always logged.
//! 5. With nothing available at all, an empty decision; the engine
//!    raises without attempting a single call.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::availability::AvailabilityStore;
use crate::config::RouterConfig;
use crate::models::Currency;
use crate::registry::CapabilityRegistry;

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Ordered provider names to attempt.
    Candidates(Vec<String>),
    /// Providers are up, but none declares the currency and the mismatch
    /// fallback is disabled.
    CapabilityGap,
    /// No provider is available at all.
    Unavailable,
}

/// Runtime provider preference, adjustable without a restart.
#[derive(Debug, Clone)]
struct Preference {
    primary: Option<String>,
    fallback: Option<String>,
}

/// Builds candidate orderings from the registry and the availability store.
pub struct Router {
    registry: Arc<CapabilityRegistry>,
    availability: Arc<AvailabilityStore>,
    config: Arc<RouterConfig>,
    preference: RwLock<Preference>,
}

impl Router {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        availability: Arc<AvailabilityStore>,
        config: Arc<RouterConfig>,
    ) -> Self {
        let preference = Preference {
            primary: config.primary_provider.clone(),
            fallback: config.fallback_provider.clone(),
        };
        Self {
            registry,
            availability,
            config,
            preference: RwLock::new(preference),
        }
    }

    /// Current default primary provider, if configured.
    pub fn primary(&self) -> Option<String> {
        self.preference.read().primary.clone()
    }

    /// Switch the default primary provider at runtime.
    pub fn set_primary(&self, provider: Option<String>) {
        self.preference.write().primary = provider;
    }

    /// Produce the candidate ordering for a request.
    pub async fn route(&self, currency: &Currency, preferred: Option<&str>) -> RouteDecision {
        let candidates = self.eligible(currency, preferred).await;
        if !candidates.is_empty() {
            debug!(
                currency = %currency,
                candidates = ?candidates,
                "Routing resolved candidates"
            );
            return RouteDecision::Candidates(candidates);
        }

        // An unsupported-currency situation with a declared provider is
        // usually a transient outage of that provider, so wait briefly for
        // it instead of falling straight through.
        if currency != self.registry.universal_fallback_currency() {
            if let Some(descriptor) = self.registry.best_declaring(currency) {
                info!(
                    currency = %currency,
                    provider = %descriptor.name,
                    window_ms = self.config.grace_window.as_millis() as u64,
                    "No available candidate; waiting out the grace window"
                );

                let deadline = tokio::time::Instant::now() + self.config.grace_window;
                loop {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let sleep_for = self
                        .config
                        .grace_poll_interval
                        .min(deadline.saturating_duration_since(now));
                    tokio::time::sleep(sleep_for).await;

                    let candidates = self.eligible(currency, preferred).await;
                    if !candidates.is_empty() {
                        info!(currency = %currency, "Provider recovered within the grace window");
                        return RouteDecision::Candidates(candidates);
                    }
                }
            }
        }

        let available = self.available_by_rank(preferred).await;
        if available.is_empty() {
            return RouteDecision::Unavailable;
        }

        if self.config.currency_mismatch_fallback {
            warn!(
                currency = %currency,
                candidates = available.len(),
                "No available provider declares the currency; routing to all available providers"
            );
            return RouteDecision::Candidates(available);
        }

        RouteDecision::CapabilityGap
    }

    /// Available, currency-capable providers in preference-then-rank order.
    async fn eligible(&self, currency: &Currency, preferred: Option<&str>) -> Vec<String> {
        let mut candidates = Vec::new();
        for name in self.registry.names_by_priority() {
            if !self.registry.supports(&name, currency) {
                continue;
            }
            if !self.availability.is_available(&name).await {
                continue;
            }
            candidates.push(name);
        }
        self.apply_preference(&mut candidates, preferred);
        candidates
    }

    /// All available providers in preference-then-rank order, regardless
    /// of currency support.
    async fn available_by_rank(&self, preferred: Option<&str>) -> Vec<String> {
        let mut candidates = Vec::new();
        for name in self.registry.names_by_priority() {
            if self.availability.is_available(&name).await {
                candidates.push(name);
            }
        }
        self.apply_preference(&mut candidates, preferred);
        candidates
    }

    /// Stable re-rank: the effective preference first, the configured
    /// fallback second, then the existing priority order.
    fn apply_preference(&self, candidates: &mut [String], preferred: Option<&str>) {
        let preference = self.preference.read();
        let first = preferred
            .map(str::to_string)
            .or_else(|| preference.primary.clone());
        let second = preference.fallback.clone();
        drop(preference);

        candidates.sort_by_key(|name| {
            if first.as_deref() == Some(name.as_str()) {
                0u8
            } else if second.as_deref() == Some(name.as_str()) {
                1
            } else {
                2
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsCollector;
    use crate::models::ProviderDescriptor;
    use crate::monitor::ProbeRunner;
    use crate::rail::{MockRail, RailSet};
    use std::time::Duration;

    struct Fixture {
        router: Router,
        availability: Arc<AvailabilityStore>,
    }

    /// Two providers: `chain-rail` (priority 1, USDC+EURC) and
    /// `custody-rail` (priority 2, USDC), both initially reachable.
    fn fixture(config: RouterConfig) -> Fixture {
        let config = Arc::new(config);
        let chain = Arc::new(MockRail::new("chain-rail", ["USDC", "EURC"]));
        let custody = Arc::new(MockRail::new("custody-rail", ["USDC"]));

        let mut registry = CapabilityRegistry::new(Currency::from("USDC"));
        registry
            .register(ProviderDescriptor::new("chain-rail", 1).with_currencies(["USDC", "EURC"]))
            .unwrap();
        registry
            .register(ProviderDescriptor::new("custody-rail", 2).with_currencies(["USDC"]))
            .unwrap();
        let registry = Arc::new(registry);

        let mut rails = RailSet::new();
        rails.insert(chain);
        rails.insert(custody);
        let rails = Arc::new(rails);

        let metrics = Arc::new(MetricsCollector::new(config.metrics_window));
        let probe = Arc::new(ProbeRunner::new(
            rails,
            registry.clone(),
            metrics,
            config.clone(),
        ));
        let availability = Arc::new(AvailabilityStore::new(probe));
        let router = Router::new(registry, availability.clone(), config);

        Fixture {
            router,
            availability,
        }
    }

    fn candidates(decision: RouteDecision) -> Vec<String> {
        match decision {
            RouteDecision::Candidates(list) => list,
            other => panic!("expected candidates, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn priority_order_with_no_preference() {
        let fx = fixture(RouterConfig::default());
        let list = candidates(fx.router.route(&Currency::from("USDC"), None).await);
        assert_eq!(list, vec!["chain-rail", "custody-rail"]);
    }

    #[tokio::test]
    async fn explicit_preference_overrides_priority() {
        let fx = fixture(RouterConfig::default());
        let list = candidates(
            fx.router
                .route(&Currency::from("USDC"), Some("custody-rail"))
                .await,
        );
        assert_eq!(list, vec!["custody-rail", "chain-rail"]);
    }

    #[tokio::test]
    async fn currency_filter_excludes_non_declaring_providers() {
        let fx = fixture(RouterConfig::default());
        let list = candidates(fx.router.route(&Currency::from("EURC"), None).await);
        assert_eq!(list, vec!["chain-rail"]);
    }

    #[tokio::test]
    async fn unavailable_provider_is_excluded() {
        let fx = fixture(RouterConfig::default());
        fx.availability
            .mark_unavailable("chain-rail", "ECONNREFUSED")
            .await;

        let list = candidates(fx.router.route(&Currency::from("USDC"), None).await);
        assert_eq!(list, vec!["custody-rail"]);
    }

    #[tokio::test]
    async fn runtime_primary_switch_reorders_candidates() {
        let fx = fixture(RouterConfig::default());
        fx.router.set_primary(Some("custody-rail".to_string()));

        let list = candidates(fx.router.route(&Currency::from("USDC"), None).await);
        assert_eq!(list, vec!["custody-rail", "chain-rail"]);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_window_returns_a_recovering_provider() {
        let fx = fixture(RouterConfig::default());
        // EURC is only declared by chain-rail, which is down right now.
        fx.availability
            .mark_unavailable("chain-rail", "ETIMEDOUT")
            .await;

        let availability = fx.availability.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            availability.mark_available("chain-rail").await;
        });

        let list = candidates(fx.router.route(&Currency::from("EURC"), None).await);
        assert_eq!(list, vec!["chain-rail"]);
    }

    #[tokio::test(start_paused = true)]
    async fn universal_currency_skips_the_grace_window() {
        let fx = fixture(RouterConfig::default());
        fx.availability
            .mark_unavailable("chain-rail", "down")
            .await;
        fx.availability
            .mark_unavailable("custody-rail", "down")
            .await;

        let before = tokio::time::Instant::now();
        let decision = fx.router.route(&Currency::from("USDC"), None).await;
        assert_eq!(decision, RouteDecision::Unavailable);
        // No grace wait: the paused clock did not advance.
        assert_eq!(tokio::time::Instant::now(), before);
    }

    #[tokio::test]
    async fn undeclared_currency_falls_back_to_all_available() {
        let fx = fixture(RouterConfig::default());
        let list = candidates(fx.router.route(&Currency::from("GBP"), None).await);
        assert_eq!(list, vec!["chain-rail", "custody-rail"]);
    }

    #[tokio::test]
    async fn capability_gap_when_mismatch_fallback_disabled() {
        let config = RouterConfig {
            currency_mismatch_fallback: false,
            ..RouterConfig::default()
        };
        let fx = fixture(config);

        let decision = fx.router.route(&Currency::from("GBP"), None).await;
        assert_eq!(decision, RouteDecision::CapabilityGap);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_grace_window_still_falls_back() {
        let fx = fixture(RouterConfig::default());
        fx.availability
            .mark_unavailable("chain-rail", "ETIMEDOUT")
            .await;

        // EURC's only declaring provider never recovers; after the window
        // the router falls back to the remaining available provider.
        let list = candidates(fx.router.route(&Currency::from("EURC"), None).await);
        assert_eq!(list, vec!["custody-rail"]);
    }
}
