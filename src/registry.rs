// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Capability registry: which provider supports what, and at which rank.
//!
//! Descriptors are registered once at startup and the registry is shared
//! immutably afterwards, so lookups are plain `HashMap` reads with no lock.

use std::collections::HashMap;

use crate::error::RouterError;
use crate::models::{Currency, ProviderDescriptor, RailFeature};

/// Static table of provider capabilities and priorities.
#[derive(Debug)]
pub struct CapabilityRegistry {
    providers: HashMap<String, ProviderDescriptor>,
    universal_fallback_currency: Currency,
}

impl CapabilityRegistry {
    pub fn new(universal_fallback_currency: Currency) -> Self {
        Self {
            providers: HashMap::new(),
            universal_fallback_currency,
        }
    }

    /// Register a provider descriptor.
    ///
    /// Fails with [`RouterError::DuplicateProvider`] if the name is taken;
    /// descriptor names are unique by invariant.
    pub fn register(&mut self, descriptor: ProviderDescriptor) -> Result<(), RouterError> {
        if self.providers.contains_key(&descriptor.name) {
            return Err(RouterError::DuplicateProvider(descriptor.name));
        }
        self.providers.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Whether the named provider declares support for a currency.
    /// Unknown providers are simply unsupported, never an error.
    pub fn supports(&self, provider: &str, currency: &Currency) -> bool {
        self.providers
            .get(provider)
            .map(|descriptor| descriptor.supports_currency(currency))
            .unwrap_or(false)
    }

    /// Whether the named provider declares a feature.
    pub fn has_feature(&self, provider: &str, feature: RailFeature) -> bool {
        self.providers
            .get(provider)
            .map(|descriptor| descriptor.has_feature(feature))
            .unwrap_or(false)
    }

    /// Priority rank of the named provider; unknown providers sort last.
    pub fn priority_of(&self, provider: &str) -> u32 {
        self.providers
            .get(provider)
            .map(|descriptor| descriptor.priority)
            .unwrap_or(u32::MAX)
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderDescriptor> {
        self.providers.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.providers.contains_key(provider)
    }

    /// Registered provider names, ordered by ascending priority with the
    /// name as a deterministic tie-break.
    pub fn names_by_priority(&self) -> Vec<String> {
        let mut names: Vec<&ProviderDescriptor> = self.providers.values().collect();
        names.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        names.into_iter().map(|d| d.name.clone()).collect()
    }

    /// Highest-priority provider declaring the given currency, if any.
    pub fn best_declaring(&self, currency: &Currency) -> Option<&ProviderDescriptor> {
        self.providers
            .values()
            .filter(|descriptor| descriptor.supports_currency(currency))
            .min_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)))
    }

    /// The currency every provider is expected to settle. Requests for it
    /// skip the router's grace-window wait.
    pub fn universal_fallback_currency(&self) -> &Currency {
        &self.universal_fallback_currency
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(descriptors: Vec<ProviderDescriptor>) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new(Currency::from("USDC"));
        for descriptor in descriptors {
            registry.register(descriptor).unwrap();
        }
        registry
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CapabilityRegistry::new(Currency::from("USDC"));
        registry
            .register(ProviderDescriptor::new("chain-rail", 1))
            .unwrap();

        let err = registry
            .register(ProviderDescriptor::new("chain-rail", 2))
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateProvider(name) if name == "chain-rail"));
    }

    #[test]
    fn unknown_provider_lookups_never_error() {
        let registry = registry_with(vec![]);
        assert!(!registry.supports("ghost", &Currency::from("USDC")));
        assert!(!registry.has_feature("ghost", RailFeature::NativeSwap));
        assert_eq!(registry.priority_of("ghost"), u32::MAX);
    }

    #[test]
    fn feature_lookup_reads_the_descriptor() {
        let registry = registry_with(vec![ProviderDescriptor::new("chain-rail", 1)
            .with_features([RailFeature::NativeSwap])]);
        assert!(registry.has_feature("chain-rail", RailFeature::NativeSwap));
        assert!(!registry.has_feature("chain-rail", RailFeature::BatchTransfer));
    }

    #[test]
    fn names_sorted_by_priority_then_name() {
        let registry = registry_with(vec![
            ProviderDescriptor::new("custody-rail", 2),
            ProviderDescriptor::new("chain-rail", 1),
            ProviderDescriptor::new("archive-rail", 2),
        ]);

        assert_eq!(
            registry.names_by_priority(),
            vec!["chain-rail", "archive-rail", "custody-rail"]
        );
    }

    #[test]
    fn best_declaring_prefers_lower_priority() {
        let registry = registry_with(vec![
            ProviderDescriptor::new("chain-rail", 1).with_currencies(["USDC", "EURC"]),
            ProviderDescriptor::new("custody-rail", 2).with_currencies(["EURC"]),
        ]);

        let best = registry.best_declaring(&Currency::from("EURC")).unwrap();
        assert_eq!(best.name, "chain-rail");
        assert!(registry.best_declaring(&Currency::from("GBP")).is_none());
    }
}
