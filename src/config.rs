// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RAIL_PRIMARY_PROVIDER` | Provider tried first when a request carries no preference | unset |
//! | `RAIL_FALLBACK_PROVIDER` | Provider tried second, before priority order | unset |
//! | `RAIL_AUTO_FAILOVER` | Enables the periodic health monitor (`true`/`false`) | `true` |
//! | `RAIL_HEALTH_CHECK_INTERVAL_MS` | Health probe interval | `60000` |
//! | `RAIL_MAX_CONSECUTIVE_FAILURES` | Critical verdicts before a provider is marked unavailable | `3` |
//! | `RAIL_PROVIDER_TIMEOUT_MS` | Default per-call timeout | `30000` |
//! | `RAIL_PROVIDER_TIMEOUT_MS_<NAME>` | Per-provider timeout override (name uppercased, `-` → `_`) | unset |
//! | `RAIL_GRACE_WINDOW_MS` | Bounded wait when no candidate supports the currency | `5000` |
//! | `RAIL_GRACE_POLL_INTERVAL_MS` | Poll interval within the grace window | `1000` |
//! | `RAIL_DEGRADED_LATENCY_MS` | Latency above which a provider is `degraded` | `2000` |
//! | `RAIL_UNIVERSAL_CURRENCY` | Currency every provider is expected to settle | `USDC` |
//! | `RAIL_CURRENCY_MISMATCH_FALLBACK` | Last-resort routing to any available provider | `true` |
//! | `RAIL_METRICS_WINDOW_MS` | Rolling window for per-provider metrics | `60000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::models::Currency;

pub const PRIMARY_PROVIDER_ENV: &str = "RAIL_PRIMARY_PROVIDER";
pub const FALLBACK_PROVIDER_ENV: &str = "RAIL_FALLBACK_PROVIDER";
pub const AUTO_FAILOVER_ENV: &str = "RAIL_AUTO_FAILOVER";
pub const HEALTH_CHECK_INTERVAL_ENV: &str = "RAIL_HEALTH_CHECK_INTERVAL_MS";
pub const MAX_CONSECUTIVE_FAILURES_ENV: &str = "RAIL_MAX_CONSECUTIVE_FAILURES";
pub const PROVIDER_TIMEOUT_ENV: &str = "RAIL_PROVIDER_TIMEOUT_MS";
pub const PROVIDER_TIMEOUT_PREFIX: &str = "RAIL_PROVIDER_TIMEOUT_MS_";
pub const GRACE_WINDOW_ENV: &str = "RAIL_GRACE_WINDOW_MS";
pub const GRACE_POLL_INTERVAL_ENV: &str = "RAIL_GRACE_POLL_INTERVAL_MS";
pub const DEGRADED_LATENCY_ENV: &str = "RAIL_DEGRADED_LATENCY_MS";
pub const UNIVERSAL_CURRENCY_ENV: &str = "RAIL_UNIVERSAL_CURRENCY";
pub const CURRENCY_MISMATCH_FALLBACK_ENV: &str = "RAIL_CURRENCY_MISMATCH_FALLBACK";
pub const METRICS_WINDOW_ENV: &str = "RAIL_METRICS_WINDOW_MS";

const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(60_000);
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_GRACE_WINDOW: Duration = Duration::from_millis(5_000);
const DEFAULT_GRACE_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
const DEFAULT_DEGRADED_LATENCY_MS: u64 = 2_000;
const DEFAULT_UNIVERSAL_CURRENCY: &str = "USDC";
const DEFAULT_METRICS_WINDOW: Duration = Duration::from_millis(60_000);

/// Router runtime configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Default provider preference when a request carries none.
    pub primary_provider: Option<String>,
    /// Provider ranked second, ahead of plain priority order.
    pub fallback_provider: Option<String>,
    /// Whether the periodic health monitor runs.
    pub auto_failover: bool,
    /// Interval between health probe cycles.
    pub health_check_interval: Duration,
    /// Consecutive critical verdicts before a provider is marked unavailable.
    pub max_consecutive_failures: u32,
    /// Default per-call timeout.
    pub provider_timeout: Duration,
    /// Per-provider timeout overrides, keyed by provider name.
    pub provider_timeout_overrides: HashMap<String, Duration>,
    /// Bounded wait when no available candidate supports the currency.
    pub grace_window: Duration,
    /// Poll interval within the grace window.
    pub grace_poll_interval: Duration,
    /// Latency threshold for the `degraded` verdict.
    pub degraded_latency_ms: u64,
    /// Currency every provider is expected to settle; requests for it skip
    /// the grace-window wait.
    pub universal_fallback_currency: Currency,
    /// Last-resort routing to any available provider regardless of declared
    /// currency support.
    pub currency_mismatch_fallback: bool,
    /// Rolling window for per-provider metrics.
    pub metrics_window: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            primary_provider: None,
            fallback_provider: None,
            auto_failover: true,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            provider_timeout_overrides: HashMap::new(),
            grace_window: DEFAULT_GRACE_WINDOW,
            grace_poll_interval: DEFAULT_GRACE_POLL_INTERVAL,
            degraded_latency_ms: DEFAULT_DEGRADED_LATENCY_MS,
            universal_fallback_currency: Currency::from(DEFAULT_UNIVERSAL_CURRENCY),
            currency_mismatch_fallback: true,
            metrics_window: DEFAULT_METRICS_WINDOW,
        }
    }
}

impl RouterConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            primary_provider: env_optional(PRIMARY_PROVIDER_ENV),
            fallback_provider: env_optional(FALLBACK_PROVIDER_ENV),
            auto_failover: env_bool(AUTO_FAILOVER_ENV, defaults.auto_failover),
            health_check_interval: env_duration_ms(
                HEALTH_CHECK_INTERVAL_ENV,
                defaults.health_check_interval,
            ),
            max_consecutive_failures: env_parse(
                MAX_CONSECUTIVE_FAILURES_ENV,
                defaults.max_consecutive_failures,
            ),
            provider_timeout: env_duration_ms(PROVIDER_TIMEOUT_ENV, defaults.provider_timeout),
            provider_timeout_overrides: provider_timeout_overrides_from_env(),
            grace_window: env_duration_ms(GRACE_WINDOW_ENV, defaults.grace_window),
            grace_poll_interval: env_duration_ms(
                GRACE_POLL_INTERVAL_ENV,
                defaults.grace_poll_interval,
            ),
            degraded_latency_ms: env_parse(DEGRADED_LATENCY_ENV, defaults.degraded_latency_ms),
            universal_fallback_currency: env::var(UNIVERSAL_CURRENCY_ENV)
                .map(Currency::from)
                .unwrap_or(defaults.universal_fallback_currency),
            currency_mismatch_fallback: env_bool(
                CURRENCY_MISMATCH_FALLBACK_ENV,
                defaults.currency_mismatch_fallback,
            ),
            metrics_window: env_duration_ms(METRICS_WINDOW_ENV, defaults.metrics_window),
        }
    }

    /// Per-call timeout for the given provider.
    pub fn provider_timeout(&self, provider: &str) -> Duration {
        self.provider_timeout_overrides
            .get(provider)
            .copied()
            .unwrap_or(self.provider_timeout)
    }
}

/// Scan the environment for `RAIL_PROVIDER_TIMEOUT_MS_<NAME>` overrides.
///
/// The provider name is recovered by lowercasing and mapping `_` back to
/// `-`, matching how provider names are written (`chain-rail`).
fn provider_timeout_overrides_from_env() -> HashMap<String, Duration> {
    env::vars()
        .filter_map(|(key, value)| {
            let suffix = key.strip_prefix(PROVIDER_TIMEOUT_PREFIX)?;
            let millis: u64 = value.parse().ok()?;
            let name = suffix.to_ascii_lowercase().replace('_', "-");
            Some((name, Duration::from_millis(millis)))
        })
        .collect()
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_duration_ms(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RouterConfig::default();
        assert_eq!(config.health_check_interval, Duration::from_secs(60));
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.grace_window, Duration::from_secs(5));
        assert_eq!(config.grace_poll_interval, Duration::from_secs(1));
        assert_eq!(config.universal_fallback_currency, Currency::from("USDC"));
        assert!(config.auto_failover);
        assert!(config.currency_mismatch_fallback);
    }

    #[test]
    fn provider_timeout_override_lookup() {
        let mut config = RouterConfig::default();
        config
            .provider_timeout_overrides
            .insert("chain-rail".to_string(), Duration::from_millis(500));

        assert_eq!(
            config.provider_timeout("chain-rail"),
            Duration::from_millis(500)
        );
        assert_eq!(
            config.provider_timeout("custody-rail"),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn env_overrides_are_applied() {
        // Distinct variable names so parallel tests cannot interfere.
        env::set_var(MAX_CONSECUTIVE_FAILURES_ENV, "5");
        env::set_var(UNIVERSAL_CURRENCY_ENV, "eurc");
        env::set_var("RAIL_PROVIDER_TIMEOUT_MS_CHAIN_RAIL", "750");

        let config = RouterConfig::from_env();
        assert_eq!(config.max_consecutive_failures, 5);
        assert_eq!(config.universal_fallback_currency, Currency::from("EURC"));
        assert_eq!(
            config.provider_timeout("chain-rail"),
            Duration::from_millis(750)
        );

        env::remove_var(MAX_CONSECUTIVE_FAILURES_ENV);
        env::remove_var(UNIVERSAL_CURRENCY_ENV);
        env::remove_var("RAIL_PROVIDER_TIMEOUT_MS_CHAIN_RAIL");
    }
}
