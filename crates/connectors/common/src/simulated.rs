use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tradegate_core::*;
use uuid::Uuid;

pub const PAPER_EXCHANGE_ID: &str = "paper";

const MAX_CANDLES: u32 = 1000;

/// Configuration for the simulated paper venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Balances credited to an account the first time its API key is seen.
    pub starting_balances: BTreeMap<String, Decimal>,
    /// Reference price per `BASE/QUOTE` market. Also defines the listed markets.
    pub prices: BTreeMap<String, Decimal>,
    /// Half-spread around the reference price, in basis points.
    pub spread_bps: Decimal,
    /// Artificial latency added to every call.
    pub latency_ms: u64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        let starting_balances = [
            ("USDT", Decimal::new(100_000, 0)),
            ("BTC", Decimal::ONE),
            ("ETH", Decimal::new(10, 0)),
        ];
        let prices = [
            ("BTC/USDT", Decimal::new(60_000, 0)),
            ("ETH/USDT", Decimal::new(3_000, 0)),
            ("ETH/BTC", Decimal::new(5, 2)),
        ];
        Self {
            starting_balances: starting_balances
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            prices: prices.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            spread_bps: Decimal::ONE,
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Holding {
    free: Decimal,
    used: Decimal,
}

#[derive(Debug, Default)]
struct Account {
    holdings: BTreeMap<String, Holding>,
    orders: Vec<OrderRecord>,
}

impl Account {
    fn holding_mut(&mut self, asset: &str) -> &mut Holding {
        self.holdings.entry(asset.to_string()).or_default()
    }

    fn free(&self, asset: &str) -> Decimal {
        self.holdings.get(asset).map(|h| h.free).unwrap_or(Decimal::ZERO)
    }

    /// Move `amount` of `asset` from free to used.
    fn lock(&mut self, asset: &str, amount: Decimal) {
        let holding = self.holding_mut(asset);
        holding.free -= amount;
        holding.used += amount;
    }

    fn unlock(&mut self, asset: &str, amount: Decimal) {
        let holding = self.holding_mut(asset);
        holding.used -= amount;
        holding.free += amount;
    }
}

#[derive(Debug, Default)]
struct VenueState {
    /// Accounts keyed by API key.
    accounts: HashMap<String, Account>,
    market_loads: u64,
}

/// The shared paper venue. Accounts and orders outlive individual clients,
/// so request-scoped clients see each other's effects.
#[derive(Clone)]
pub struct PaperVenue {
    config: Arc<PaperConfig>,
    state: Arc<Mutex<VenueState>>,
}

impl PaperVenue {
    pub fn new(config: PaperConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(VenueState::default())),
        }
    }

    /// Build a client bound to this venue.
    pub fn client(&self, credentials: Option<Credentials>) -> PaperClient {
        PaperClient {
            venue: self.clone(),
            credentials,
            markets: MarketMap::new(),
        }
    }

    /// How many times market metadata has been loaded.
    pub async fn market_loads(&self) -> u64 {
        self.state.lock().await.market_loads
    }
}

impl ExchangeFactory for PaperVenue {
    fn build(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<Box<dyn ExchangeClient>, ExchangeError> {
        Ok(Box::new(self.client(credentials)))
    }
}

/// A client of the paper venue.
pub struct PaperClient {
    venue: PaperVenue,
    credentials: Option<Credentials>,
    markets: MarketMap,
}

impl PaperClient {
    async fn simulate_latency(&self) {
        if self.venue.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.venue.config.latency_ms)).await;
        }
    }

    fn account_key(&self) -> Result<&str, ExchangeError> {
        match &self.credentials {
            Some(creds) if creds.is_complete() => Ok(creds.api_key()),
            _ => Err(ExchangeError::Authentication(
                "paper requires an API key and secret for this call".to_string(),
            )),
        }
    }

    fn reference_price(&self, symbol: &Symbol) -> Result<Decimal, ExchangeError> {
        require_market(&self.markets, symbol)?;
        self.venue
            .config
            .prices
            .iter()
            .find(|(key, _)| key.parse::<Symbol>().ok().as_ref() == Some(symbol))
            .map(|(_, price)| *price)
            .ok_or_else(|| ExchangeError::BadSymbol(format!("no price for {}", symbol)))
    }

    /// Best bid and ask around the reference price.
    fn touch(&self, symbol: &Symbol) -> Result<(Decimal, Decimal), ExchangeError> {
        let reference = self.reference_price(symbol)?;
        let half_spread = reference * self.venue.config.spread_bps / Decimal::new(10_000, 0);
        Ok((
            (reference - half_spread).round_dp(8),
            (reference + half_spread).round_dp(8),
        ))
    }

    async fn with_account<T>(
        &self,
        f: impl FnOnce(&mut Account) -> Result<T, ExchangeError>,
    ) -> Result<T, ExchangeError> {
        let key = self.account_key()?.to_string();
        let mut state = self.venue.state.lock().await;
        let starting = &self.venue.config.starting_balances;
        let account = state.accounts.entry(key).or_insert_with(|| {
            tracing::debug!("Opening paper account");
            let mut account = Account::default();
            for (asset, amount) in starting {
                account.holding_mut(&asset.to_uppercase()).free = *amount;
            }
            account
        });
        f(account)
    }
}

fn new_record(order: &OrderRequest, now: i64) -> OrderRecord {
    OrderRecord {
        id: Uuid::new_v4().to_string(),
        client_order_id: None,
        timestamp: Some(now),
        datetime: iso8601(now),
        symbol: order.symbol.clone(),
        order_type: order.kind.order_type(),
        side: order.side,
        price: order.kind.price(),
        amount: order.amount,
        filled: Decimal::ZERO,
        remaining: order.amount,
        cost: Decimal::ZERO,
        status: OrderStatus::Open,
        info: serde_json::json!({ "venue": PAPER_EXCHANGE_ID }),
    }
}

fn order_value(amount: Decimal, price: Decimal) -> Result<Decimal, ExchangeError> {
    amount
        .checked_mul(price)
        .map(|value| value.round_dp(8))
        .ok_or_else(|| ExchangeError::InvalidOrder("order value overflows".to_string()))
}

/// Funds an open order holds: quote for buys, base for sells.
fn reserved(order: &OrderRecord) -> Result<(String, Decimal), ExchangeError> {
    match order.side {
        Side::Buy => Ok((
            order.symbol.quote().to_string(),
            order_value(order.remaining, order.price.unwrap_or(Decimal::ZERO))?,
        )),
        Side::Sell => Ok((order.symbol.base().to_string(), order.remaining)),
    }
}

fn fill(
    account: &mut Account,
    record: &mut OrderRecord,
    price: Decimal,
) -> Result<(), ExchangeError> {
    let base = record.symbol.base().to_string();
    let quote = record.symbol.quote().to_string();
    let cost = order_value(record.amount, price)?;
    match record.side {
        Side::Buy => {
            if account.free(&quote) < cost {
                return Err(ExchangeError::InsufficientFunds(format!(
                    "{} {} required, {} available",
                    cost,
                    quote,
                    account.free(&quote)
                )));
            }
            account.holding_mut(&quote).free -= cost;
            account.holding_mut(&base).free += record.amount;
        }
        Side::Sell => {
            if account.free(&base) < record.amount {
                return Err(ExchangeError::InsufficientFunds(format!(
                    "{} {} required, {} available",
                    record.amount,
                    base,
                    account.free(&base)
                )));
            }
            account.holding_mut(&base).free -= record.amount;
            account.holding_mut(&quote).free += cost;
        }
    }
    record.filled = record.amount;
    record.remaining = Decimal::ZERO;
    record.cost = cost;
    record.status = OrderStatus::Closed;
    Ok(())
}

fn find_order<'a>(
    account: &'a mut Account,
    order_id: &str,
    symbol: &Symbol,
) -> Result<&'a mut OrderRecord, ExchangeError> {
    account
        .orders
        .iter_mut()
        .find(|o| o.id == order_id && &o.symbol == symbol)
        .ok_or_else(|| ExchangeError::OrderNotFound(format!("order {} on {}", order_id, symbol)))
}

#[async_trait]
impl ExchangeClient for PaperClient {
    fn id(&self) -> &str {
        PAPER_EXCHANGE_ID
    }

    async fn load_markets(&mut self) -> Result<&MarketMap, ExchangeError> {
        self.simulate_latency().await;
        self.venue.state.lock().await.market_loads += 1;

        let mut markets = MarketMap::new();
        for key in self.venue.config.prices.keys() {
            match key.parse::<Symbol>() {
                Ok(symbol) => {
                    markets.insert(
                        symbol.clone(),
                        Market {
                            id: symbol.compact(),
                            symbol,
                            active: true,
                        },
                    );
                }
                Err(e) => tracing::warn!(market = %key, error = %e, "Skipping paper market"),
            }
        }
        self.markets = markets;
        Ok(&self.markets)
    }

    fn markets(&self) -> &MarketMap {
        &self.markets
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        self.simulate_latency().await;
        let reference = self.reference_price(symbol)?;
        let (bid, ask) = self.touch(symbol)?;
        let volume = Decimal::new(1_000, 0);
        let now = Utc::now().timestamp_millis();
        Ok(Ticker {
            symbol: symbol.clone(),
            timestamp: Some(now),
            datetime: iso8601(now),
            last: Some(reference),
            bid: Some(bid),
            ask: Some(ask),
            high: Some((reference * Decimal::new(102, 2)).round_dp(8)),
            low: Some((reference * Decimal::new(98, 2)).round_dp(8)),
            base_volume: Some(volume),
            quote_volume: Some(volume * reference),
        })
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.simulate_latency().await;
        let reference = self.reference_price(symbol)?;
        let step = timeframe.duration_ms();
        let current_bucket = Utc::now().timestamp_millis() / step;
        let count = i64::from(limit.min(MAX_CANDLES));

        // Deterministic drift of at most 0.3% around the reference price.
        let level = |bucket: i64| reference * (Decimal::ONE + Decimal::new(bucket % 7 - 3, 3));

        (0..count)
            .map(|i| {
                let bucket = current_bucket - (count - 1 - i);
                let timestamp = bucket.checked_mul(step).ok_or_else(|| {
                    ExchangeError::NotSupported(format!(
                        "timeframe {} is too wide for candle history",
                        timeframe
                    ))
                })?;
                let open = level(bucket).round_dp(8);
                let close = level(bucket + 1).round_dp(8);
                Ok(Candle {
                    timestamp,
                    open,
                    high: (open.max(close) * Decimal::new(1001, 3)).round_dp(8),
                    low: (open.min(close) * Decimal::new(999, 3)).round_dp(8),
                    close,
                    volume: Decimal::new(10 + bucket % 5, 0),
                })
            })
            .collect()
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderRecord, ExchangeError> {
        self.simulate_latency().await;
        self.account_key()?;
        let (bid, ask) = self.touch(&order.symbol)?;
        if order.amount <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder("amount must be positive".to_string()));
        }

        let now = Utc::now().timestamp_millis();
        self.with_account(|account| {
            let mut record = new_record(order, now);
            match (order.kind, order.side) {
                (OrderKind::Market, Side::Buy) => fill(account, &mut record, ask)?,
                (OrderKind::Market, Side::Sell) => fill(account, &mut record, bid)?,
                (OrderKind::Limit { price }, _) if price <= Decimal::ZERO => {
                    return Err(ExchangeError::InvalidOrder("price must be positive".to_string()));
                }
                (OrderKind::Limit { price }, Side::Buy) if price >= ask => {
                    fill(account, &mut record, ask)?
                }
                (OrderKind::Limit { price }, Side::Sell) if price <= bid => {
                    fill(account, &mut record, bid)?
                }
                (OrderKind::Limit { .. }, _) => {
                    let (asset, amount) = reserved(&record)?;
                    if account.free(&asset) < amount {
                        return Err(ExchangeError::InsufficientFunds(format!(
                            "{} {} required, {} available",
                            amount,
                            asset,
                            account.free(&asset)
                        )));
                    }
                    account.lock(&asset, amount);
                }
            }
            account.orders.push(record.clone());
            tracing::debug!(order_id = %record.id, status = ?record.status, "Paper order accepted");
            Ok(record)
        })
        .await
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        symbol: &Symbol,
    ) -> Result<OrderRecord, ExchangeError> {
        self.simulate_latency().await;
        self.with_account(|account| {
            let order = find_order(account, order_id, symbol)?;
            if !order.status.is_open() {
                return Err(ExchangeError::InvalidOrder(format!(
                    "order {} is already {:?}",
                    order_id, order.status
                )));
            }
            let (asset, amount) = reserved(order)?;
            order.status = OrderStatus::Canceled;
            let snapshot = order.clone();
            account.unlock(&asset, amount);
            Ok(snapshot)
        })
        .await
    }

    async fn fetch_order(
        &self,
        order_id: &str,
        symbol: &Symbol,
    ) -> Result<OrderRecord, ExchangeError> {
        self.simulate_latency().await;
        self.with_account(|account| find_order(account, order_id, symbol).map(|o| o.clone()))
            .await
    }

    async fn fetch_orders(
        &self,
        symbol: &Symbol,
        limit: u32,
    ) -> Result<Vec<OrderRecord>, ExchangeError> {
        self.simulate_latency().await;
        require_market(&self.markets, symbol)?;
        self.with_account(|account| {
            let matching: Vec<OrderRecord> = account
                .orders
                .iter()
                .filter(|o| &o.symbol == symbol)
                .cloned()
                .collect();
            let skip = matching.len().saturating_sub(limit as usize);
            Ok(matching.into_iter().skip(skip).collect())
        })
        .await
    }

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        self.simulate_latency().await;
        self.with_account(|account| {
            let mut balance = Balance {
                timestamp: Some(Utc::now().timestamp_millis()),
                ..Default::default()
            };
            for (asset, holding) in &account.holdings {
                balance.insert(asset, holding.free, holding.used);
            }
            Ok(balance)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_usdt() -> Symbol {
        Symbol::new("BTC", "USDT").unwrap()
    }

    async fn connected(venue: &PaperVenue, key: &str) -> PaperClient {
        let mut client = venue.client(Some(Credentials::new(key, "secret")));
        client.load_markets().await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_load_markets_lists_configured_pairs() {
        let venue = PaperVenue::new(PaperConfig::default());
        let mut client = venue.client(None);
        let markets = client.load_markets().await.unwrap();
        assert_eq!(markets.len(), 3);
        assert_eq!(markets[&btc_usdt()].id, "BTCUSDT");
        assert_eq!(venue.market_loads().await, 1);
    }

    #[tokio::test]
    async fn test_ticker_spread() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let ticker = client.fetch_ticker(&btc_usdt()).await.unwrap();
        assert_eq!(ticker.last, Some(dec!(60000)));
        assert_eq!(ticker.bid, Some(dec!(59994)));
        assert_eq!(ticker.ask, Some(dec!(60006)));
    }

    #[tokio::test]
    async fn test_unknown_symbol() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let err = client
            .fetch_ticker(&Symbol::new("DOGE", "USDT").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::BadSymbol(_)));
    }

    #[tokio::test]
    async fn test_ohlcv_is_ordered_and_bounded() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let tf: Timeframe = "5m".parse().unwrap();
        let candles = client.fetch_ohlcv(&btc_usdt(), tf, 10).await.unwrap();
        assert_eq!(candles.len(), 10);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, tf.duration_ms());
        }
        for candle in &candles {
            assert!(candle.low <= candle.open.min(candle.close));
            assert!(candle.high >= candle.open.max(candle.close));
        }
    }

    #[tokio::test]
    async fn test_market_buy_fills_at_ask() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let order = client
            .create_order(&OrderRequest::market(btc_usdt(), Side::Buy, dec!(0.5)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.cost, dec!(30003));

        let balance = client.fetch_balance().await.unwrap();
        assert_eq!(balance.entry("BTC").total, dec!(1.5));
        assert_eq!(balance.entry("USDT").free, dec!(69997));
    }

    #[tokio::test]
    async fn test_resting_limit_locks_and_cancel_releases() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let order = client
            .create_order(&OrderRequest::limit(btc_usdt(), Side::Buy, dec!(1), dec!(50000)))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        let balance = client.fetch_balance().await.unwrap();
        assert_eq!(balance.entry("USDT").used, dec!(50000));
        assert_eq!(balance.entry("USDT").total, dec!(100000));

        let canceled = client.cancel_order(&order.id, &btc_usdt()).await.unwrap();
        assert_eq!(canceled.status, OrderStatus::Canceled);
        let balance = client.fetch_balance().await.unwrap();
        assert_eq!(balance.entry("USDT").used, dec!(0));

        let again = client.cancel_order(&order.id, &btc_usdt()).await.unwrap_err();
        assert!(matches!(again, ExchangeError::InvalidOrder(_)));
    }

    #[tokio::test]
    async fn test_cancel_unknown_order() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let err = client.cancel_order("nope", &btc_usdt()).await.unwrap_err();
        assert!(matches!(err, ExchangeError::OrderNotFound(_)));
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let err = client
            .create_order(&OrderRequest::market(btc_usdt(), Side::Sell, dec!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InsufficientFunds(_)));
    }

    #[tokio::test]
    async fn test_oversized_orders_are_rejected_without_touching_funds() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let before = client.fetch_balance().await.unwrap();

        let market = client
            .create_order(&OrderRequest::market(btc_usdt(), Side::Buy, Decimal::MAX))
            .await
            .unwrap_err();
        assert!(matches!(market, ExchangeError::InvalidOrder(_)));

        let resting = client
            .create_order(&OrderRequest::limit(btc_usdt(), Side::Buy, Decimal::MAX, dec!(2)))
            .await
            .unwrap_err();
        assert!(matches!(resting, ExchangeError::InvalidOrder(_)));

        let after = client.fetch_balance().await.unwrap();
        assert_eq!(before.total, after.total);
    }

    #[tokio::test]
    async fn test_ohlcv_rejects_timeframes_wider_than_history() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let tf: Timeframe = "3000000000M".parse().unwrap();
        let err = client.fetch_ohlcv(&btc_usdt(), tf, 10).await.unwrap_err();
        assert!(matches!(err, ExchangeError::NotSupported(_)));
    }

    #[tokio::test]
    async fn test_trading_requires_credentials() {
        let venue = PaperVenue::new(PaperConfig::default());
        let mut client = venue.client(None);
        client.load_markets().await.unwrap();
        let err = client.fetch_balance().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_accounts_are_shared_across_clients_and_isolated_by_key() {
        let venue = PaperVenue::new(PaperConfig::default());
        let first = connected(&venue, "alice").await;
        let order = first
            .create_order(&OrderRequest::limit(btc_usdt(), Side::Sell, dec!(0.1), dec!(70000)))
            .await
            .unwrap();

        let second = connected(&venue, "alice").await;
        let fetched = second.fetch_order(&order.id, &btc_usdt()).await.unwrap();
        assert_eq!(fetched.id, order.id);

        let other = connected(&venue, "bob").await;
        assert!(other.fetch_orders(&btc_usdt(), 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_orders_keeps_most_recent() {
        let venue = PaperVenue::new(PaperConfig::default());
        let client = connected(&venue, "k").await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            let order = client
                .create_order(&OrderRequest::market(btc_usdt(), Side::Buy, dec!(0.01)))
                .await
                .unwrap();
            ids.push(order.id);
        }
        let orders = client.fetch_orders(&btc_usdt(), 2).await.unwrap();
        let fetched: Vec<_> = orders.into_iter().map(|o| o.id).collect();
        assert_eq!(fetched, ids[1..].to_vec());
    }
}
