//! Gateways wired to in-process venues for unit tests.

use crate::config::GatewaySettings;
use crate::credentials::StaticCredentialResolver;
use crate::gateway::ExchangeGateway;
use crate::registry::ExchangeRegistry;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tradegate_connectors_common::{PaperConfig, PaperVenue, PAPER_EXCHANGE_ID};
use tradegate_core::*;

pub(crate) fn gateway_with(
    registry: ExchangeRegistry,
    settings: GatewaySettings,
) -> ExchangeGateway {
    ExchangeGateway::new(
        registry,
        Arc::new(StaticCredentialResolver::stub()),
        &settings,
    )
}

pub(crate) fn paper_gateway_with(
    paper: PaperConfig,
    settings: GatewaySettings,
) -> (ExchangeGateway, PaperVenue) {
    let venue = PaperVenue::new(paper);
    let mut registry = ExchangeRegistry::new();
    registry.register(PAPER_EXCHANGE_ID, venue.clone());
    (gateway_with(registry, settings), venue)
}

pub(crate) fn paper_gateway(settings: GatewaySettings) -> (ExchangeGateway, PaperVenue) {
    paper_gateway_with(PaperConfig::default(), settings)
}

/// Paper venue behind a factory that counts how often it builds a client.
pub(crate) fn counting_gateway(settings: GatewaySettings) -> (ExchangeGateway, Arc<AtomicUsize>) {
    let venue = PaperVenue::new(PaperConfig::default());
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let mut registry = ExchangeRegistry::new();
    registry.register(PAPER_EXCHANGE_ID, move |creds: Option<Credentials>| {
        counter.fetch_add(1, Ordering::SeqCst);
        venue.build(creds)
    });
    (gateway_with(registry, settings), builds)
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StubBehavior {
    pub load_error: Option<ExchangeError>,
    pub load_delay: Option<Duration>,
    pub no_markets: bool,
    pub call_error: Option<ExchangeError>,
    pub call_delay: Option<Duration>,
}

pub(crate) fn stub_gateway(behavior: StubBehavior, settings: GatewaySettings) -> ExchangeGateway {
    let mut registry = ExchangeRegistry::new();
    registry.register("stub", move |creds: Option<Credentials>| {
        Ok(Box::new(StubClient {
            behavior: behavior.clone(),
            credentials: creds,
            markets: MarketMap::new(),
        }) as Box<dyn ExchangeClient>)
    });
    gateway_with(registry, settings)
}

/// A venue that misbehaves on demand. Its error messages echo the
/// credentials it was built with, the way careless venues do.
struct StubClient {
    behavior: StubBehavior,
    credentials: Option<Credentials>,
    markets: MarketMap,
}

impl StubClient {
    fn leak(&self, e: ExchangeError) -> ExchangeError {
        match &self.credentials {
            Some(creds) => e.map_message(|m| {
                format!("{} (key={} secret={})", m, creds.api_key(), creds.secret())
            }),
            None => e,
        }
    }

    async fn respond<T>(&self, value: T) -> Result<T, ExchangeError> {
        if let Some(delay) = self.behavior.call_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior.call_error {
            Some(e) => Err(self.leak(e.clone())),
            None => Ok(value),
        }
    }
}

#[async_trait]
impl ExchangeClient for StubClient {
    fn id(&self) -> &str {
        "stub"
    }

    async fn load_markets(&mut self) -> Result<&MarketMap, ExchangeError> {
        if let Some(delay) = self.behavior.load_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(e) = self.behavior.load_error.clone() {
            return Err(self.leak(e));
        }
        if !self.behavior.no_markets {
            let symbol = Symbol::new("BTC", "USDT")
                .map_err(|e| ExchangeError::Exchange(e.to_string()))?;
            self.markets.insert(
                symbol.clone(),
                Market {
                    id: symbol.compact(),
                    symbol,
                    active: true,
                },
            );
        }
        Ok(&self.markets)
    }

    fn markets(&self) -> &MarketMap {
        &self.markets
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let price = Some(Decimal::new(100, 0));
        self.respond(Ticker {
            symbol: symbol.clone(),
            timestamp: Some(1_700_000_000_000),
            datetime: iso8601(1_700_000_000_000),
            last: price,
            bid: price,
            ask: price,
            high: price,
            low: price,
            base_volume: None,
            quote_volume: None,
        })
        .await
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        // Newest first with one extra candle, to exercise reordering.
        let step = timeframe.duration_ms();
        let candles = (0..=i64::from(limit))
            .rev()
            .map(|i| Candle {
                timestamp: i * step,
                open: Decimal::ONE,
                high: Decimal::ONE,
                low: Decimal::ONE,
                close: Decimal::ONE,
                volume: Decimal::ZERO,
            })
            .collect();
        self.respond(candles).await
    }

    async fn create_order(&self, _order: &OrderRequest) -> Result<OrderRecord, ExchangeError> {
        self.respond(()).await?;
        Err(ExchangeError::NotSupported("stub venue does not trade".to_string()))
    }

    async fn cancel_order(
        &self,
        _order_id: &str,
        _symbol: &Symbol,
    ) -> Result<OrderRecord, ExchangeError> {
        self.respond(()).await?;
        Err(ExchangeError::NotSupported("stub venue does not trade".to_string()))
    }

    async fn fetch_order(
        &self,
        _order_id: &str,
        _symbol: &Symbol,
    ) -> Result<OrderRecord, ExchangeError> {
        self.respond(()).await?;
        Err(ExchangeError::NotSupported("stub venue does not trade".to_string()))
    }

    async fn fetch_orders(
        &self,
        _symbol: &Symbol,
        _limit: u32,
    ) -> Result<Vec<OrderRecord>, ExchangeError> {
        self.respond(Vec::new()).await
    }

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        self.respond(Balance::default()).await
    }
}
