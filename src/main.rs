// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Rail router daemon.
//!
//! Wires the router against two mock rails (the shape of the production
//! pair: a high-throughput chain rail and a regulated custodial rail),
//! starts the health monitor, and logs emitted events until SIGINT.

use std::env;
use std::sync::Arc;

use relational_rail_router::models::{
    FeeClass, ProviderDescriptor, RailFeature, SettlementLatencyClass, ThroughputClass,
};
use relational_rail_router::{MockRail, RailRouterBuilder, RouterConfig, RouterEvent};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    init_tracing();

    let config = RouterConfig::from_env();
    info!(
        interval_ms = config.health_check_interval.as_millis() as u64,
        auto_failover = config.auto_failover,
        "Rail router starting"
    );

    let chain = Arc::new(MockRail::new(
        "chain-rail",
        ["USDC", "USDT", "PYUSD", "EURC"],
    ));
    let custody = Arc::new(MockRail::new("custody-rail", ["USDC", "EURC"]));

    let service = RailRouterBuilder::new(config)
        .register(
            ProviderDescriptor::new("chain-rail", 1)
                .with_currencies(["USDC", "USDT", "PYUSD", "EURC"])
                .with_throughput(ThroughputClass::VeryHigh)
                .with_fee(FeeClass::Low)
                .with_settlement(SettlementLatencyClass::Instant)
                .with_features([
                    RailFeature::BatchTransfer,
                    RailFeature::NativeSwap,
                    RailFeature::InstantFinality,
                    RailFeature::MultiCurrencyMint,
                ]),
            chain,
        )
        .expect("register chain-rail")
        .register(
            ProviderDescriptor::new("custody-rail", 2)
                .with_currencies(["USDC", "EURC"])
                .with_throughput(ThroughputClass::High)
                .with_fee(FeeClass::Medium)
                .with_settlement(SettlementLatencyClass::Seconds)
                .with_features([RailFeature::BatchTransfer]),
            custody,
        )
        .expect("register custody-rail")
        .build();

    service.start();

    // Relay emitted events into the log until shutdown.
    let mut events = service.subscribe();
    let relay = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match &event {
                RouterEvent::OperationSuccess {
                    operation,
                    provider,
                    latency_ms,
                    ..
                } => info!(
                    operation = %operation,
                    provider = %provider,
                    latency_ms = latency_ms,
                    "Operation succeeded"
                ),
                RouterEvent::OperationFailed {
                    operation,
                    attempts,
                    ..
                } => info!(
                    operation = %operation,
                    attempts = attempts.len(),
                    "Operation failed"
                ),
                other => info!(event = ?other, "Router event"),
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for shutdown signal");
    info!("Shutdown signal received");

    service.shutdown();
    relay.abort();
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
