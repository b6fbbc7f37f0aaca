use crate::protocol::{self, AccountInfo, ExchangeInfo, Ticker24h};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tradegate_core::*;

const MAX_LIMIT: u32 = 1000;

/// Connection settings for a Binance-family venue.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    /// Window in which a signed request stays valid.
    pub recv_window_ms: u64,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
}

impl BinanceConfig {
    pub fn binance() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            recv_window_ms: 5_000,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn binance_us() -> Self {
        Self {
            base_url: "https://api.binance.us".to_string(),
            ..Self::binance()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Builds [`BinanceClient`]s sharing one HTTP connection pool.
pub struct BinanceFactory {
    id: String,
    config: Arc<BinanceConfig>,
    http: reqwest::Client,
}

impl BinanceFactory {
    pub fn new(id: &str, config: BinanceConfig) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Network(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            id: id.to_string(),
            config: Arc::new(config),
            http,
        })
    }
}

impl ExchangeFactory for BinanceFactory {
    fn build(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<Box<dyn ExchangeClient>, ExchangeError> {
        Ok(Box::new(BinanceClient {
            id: self.id.clone(),
            config: self.config.clone(),
            http: self.http.clone(),
            credentials,
            markets: MarketMap::new(),
        }))
    }
}

/// HMAC-SHA256 of `payload`, hex encoded, as Binance expects for `signature`.
pub fn sign(secret: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| ExchangeError::Authentication("unusable API secret".to_string()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Form-encoded query, exactly as it is signed and sent.
fn query_string(params: &[(&str, String)]) -> Result<String, ExchangeError> {
    serde_urlencoded::to_string(params)
        .map_err(|e| ExchangeError::Exchange(format!("cannot encode request: {}", e)))
}

fn transport_error(e: reqwest::Error) -> ExchangeError {
    // Signed URLs carry the signature; never surface them.
    let e = e.without_url();
    if e.is_timeout() {
        ExchangeError::Network(format!("request timed out: {}", e))
    } else {
        ExchangeError::Network(e.to_string())
    }
}

/// A Binance REST client.
pub struct BinanceClient {
    id: String,
    config: Arc<BinanceConfig>,
    http: reqwest::Client,
    credentials: Option<Credentials>,
    markets: MarketMap,
}

impl BinanceClient {
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ExchangeError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(protocol::api_error(status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| {
                ExchangeError::Exchange(format!("unexpected response from {}: {}", self.id, e))
            })
    }

    async fn public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.config.base_url, path);
        self.send(self.http.get(url).query(params)).await
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
    ) -> Result<T, ExchangeError> {
        let creds = match &self.credentials {
            Some(creds) if creds.is_complete() => creds,
            _ => {
                return Err(ExchangeError::Authentication(format!(
                    "{} requires an API key and secret for this call",
                    self.id
                )))
            }
        };
        params.push(("recvWindow", self.config.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = query_string(&params)?;
        let signature = sign(creds.secret(), &query)?;
        let url = format!(
            "{}{}?{}&signature={}",
            self.config.base_url, path, query, signature
        );
        let request = self
            .http
            .request(method, url)
            .header("X-MBX-APIKEY", creds.api_key());
        self.send(request).await
    }

    fn market_id(&self, symbol: &Symbol) -> Result<String, ExchangeError> {
        Ok(require_market(&self.markets, symbol)?.id.clone())
    }

    /// Numeric ids are venue order ids; anything else is a client order id.
    fn order_ref(order_id: &str) -> (&'static str, String) {
        if !order_id.is_empty() && order_id.chars().all(|c| c.is_ascii_digit()) {
            ("orderId", order_id.to_string())
        } else {
            ("origClientOrderId", order_id.to_string())
        }
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn load_markets(&mut self) -> Result<&MarketMap, ExchangeError> {
        let info: ExchangeInfo = self.public("/api/v3/exchangeInfo", &[]).await?;
        self.markets = protocol::markets_from(info);
        tracing::debug!(exchange = %self.id, markets = self.markets.len(), "Loaded markets");
        Ok(&self.markets)
    }

    fn markets(&self) -> &MarketMap {
        &self.markets
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let params = [("symbol", self.market_id(symbol)?)];
        let raw: Ticker24h = self.public("/api/v3/ticker/24hr", &params).await?;
        Ok(protocol::ticker_from(symbol, raw))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = [
            ("symbol", self.market_id(symbol)?),
            ("interval", protocol::interval(timeframe)?),
            ("limit", limit.min(MAX_LIMIT).to_string()),
        ];
        let rows: Vec<Vec<Value>> = self.public("/api/v3/klines", &params).await?;
        rows.iter().map(|row| protocol::candle_from(row)).collect()
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderRecord, ExchangeError> {
        let mut params = vec![
            ("symbol", self.market_id(&order.symbol)?),
            ("side", order.side.as_str().to_uppercase()),
            ("quantity", order.amount.normalize().to_string()),
        ];
        match order.kind {
            OrderKind::Market => params.push(("type", "MARKET".to_string())),
            OrderKind::Limit { price } => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("price", price.normalize().to_string()));
            }
        }
        let raw: Value = self.signed(Method::POST, "/api/v3/order", params).await?;
        protocol::order_from(&order.symbol, raw)
    }

    async fn cancel_order(
        &self,
        order_id: &str,
        symbol: &Symbol,
    ) -> Result<OrderRecord, ExchangeError> {
        let params = vec![("symbol", self.market_id(symbol)?), Self::order_ref(order_id)];
        let raw: Value = self.signed(Method::DELETE, "/api/v3/order", params).await?;
        protocol::order_from(symbol, raw)
    }

    async fn fetch_order(
        &self,
        order_id: &str,
        symbol: &Symbol,
    ) -> Result<OrderRecord, ExchangeError> {
        let params = vec![("symbol", self.market_id(symbol)?), Self::order_ref(order_id)];
        let raw: Value = self.signed(Method::GET, "/api/v3/order", params).await?;
        protocol::order_from(symbol, raw)
    }

    async fn fetch_orders(
        &self,
        symbol: &Symbol,
        limit: u32,
    ) -> Result<Vec<OrderRecord>, ExchangeError> {
        let params = vec![
            ("symbol", self.market_id(symbol)?),
            ("limit", limit.min(MAX_LIMIT).to_string()),
        ];
        let rows: Vec<Value> = self.signed(Method::GET, "/api/v3/allOrders", params).await?;
        rows.into_iter()
            .map(|raw| protocol::order_from(symbol, raw))
            .collect()
    }

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError> {
        let raw: AccountInfo = self.signed(Method::GET, "/api/v3/account", Vec::new()).await?;
        Ok(protocol::balance_from(raw))
    }
}
