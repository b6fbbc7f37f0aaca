use crate::config::GatewayConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tradegate_connectors_binance::{BinanceConfig, BinanceFactory};
use tradegate_connectors_common::{PaperVenue, PAPER_EXCHANGE_ID};
use tradegate_core::{ExchangeError, ExchangeFactory};

/// Supported venues, keyed by lower-case identifier.
#[derive(Clone, Default)]
pub struct ExchangeRegistry {
    factories: BTreeMap<String, Arc<dyn ExchangeFactory>>,
}

fn normalize(id: &str) -> String {
    id.trim().to_lowercase()
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in venue.
    pub fn with_defaults(config: &GatewayConfig) -> Result<Self, ExchangeError> {
        let timeout = config.gateway.request_timeout();
        let mut registry = Self::new();
        registry.register(
            "binance",
            BinanceFactory::new("binance", BinanceConfig::binance().with_timeout(timeout))?,
        );
        registry.register(
            "binanceus",
            BinanceFactory::new("binanceus", BinanceConfig::binance_us().with_timeout(timeout))?,
        );
        registry.register(PAPER_EXCHANGE_ID, PaperVenue::new(config.paper.clone()));
        Ok(registry)
    }

    /// Add or replace a venue.
    pub fn register(&mut self, id: &str, factory: impl ExchangeFactory + 'static) {
        self.factories.insert(normalize(id), Arc::new(factory));
    }

    pub fn factory(&self, id: &str) -> Option<Arc<dyn ExchangeFactory>> {
        self.factories.get(&normalize(id)).cloned()
    }

    pub fn is_supported(&self, id: &str) -> bool {
        self.factories.contains_key(&normalize(id))
    }

    /// Sorted identifiers.
    pub fn supported(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
