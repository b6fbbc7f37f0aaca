use crate::credentials::Credentials;
use crate::models::*;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Exchange Client Trait
// ---------------------------------------------------------------------------

/// Errors reported by a venue connector.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("bad symbol: {0}")]
    BadSymbol(String),
    #[error("invalid order: {0}")]
    InvalidOrder(String),
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("order not found: {0}")]
    OrderNotFound(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("exchange error: {0}")]
    Exchange(String),
}

impl ExchangeError {
    /// Errors after which a connected client should not be reused.
    pub fn invalidates_client(&self) -> bool {
        matches!(self, ExchangeError::Network(_) | ExchangeError::Authentication(_))
    }

    /// Rewrite the message, keeping the category.
    pub fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            ExchangeError::Network(m) => ExchangeError::Network(f(m)),
            ExchangeError::Authentication(m) => ExchangeError::Authentication(f(m)),
            ExchangeError::BadSymbol(m) => ExchangeError::BadSymbol(f(m)),
            ExchangeError::InvalidOrder(m) => ExchangeError::InvalidOrder(f(m)),
            ExchangeError::InsufficientFunds(m) => ExchangeError::InsufficientFunds(f(m)),
            ExchangeError::OrderNotFound(m) => ExchangeError::OrderNotFound(f(m)),
            ExchangeError::NotSupported(m) => ExchangeError::NotSupported(f(m)),
            ExchangeError::RateLimited(m) => ExchangeError::RateLimited(f(m)),
            ExchangeError::Exchange(m) => ExchangeError::Exchange(f(m)),
        }
    }
}

/// A client bound to one venue, optionally authenticated.
///
/// Implementations wrap the venue's wire protocol; callers only ever see
/// unified symbols and models.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Registry identifier of the venue (e.g. `binance`).
    fn id(&self) -> &str;

    /// Fetch and cache market metadata. Must succeed before any other call.
    async fn load_markets(&mut self) -> Result<&MarketMap, ExchangeError>;

    /// Market metadata loaded so far.
    fn markets(&self) -> &MarketMap;

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError>;

    /// Most recent `limit` candles, oldest first.
    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderRecord, ExchangeError>;

    async fn cancel_order(&self, order_id: &str, symbol: &Symbol)
        -> Result<OrderRecord, ExchangeError>;

    async fn fetch_order(&self, order_id: &str, symbol: &Symbol)
        -> Result<OrderRecord, ExchangeError>;

    /// Most recent `limit` orders for `symbol`, oldest first.
    async fn fetch_orders(&self, symbol: &Symbol, limit: u32)
        -> Result<Vec<OrderRecord>, ExchangeError>;

    async fn fetch_balance(&self) -> Result<Balance, ExchangeError>;
}

/// Builds unconnected clients for one venue.
pub trait ExchangeFactory: Send + Sync {
    fn build(&self, credentials: Option<Credentials>)
        -> Result<Box<dyn ExchangeClient>, ExchangeError>;
}

impl<F> ExchangeFactory for F
where
    F: Fn(Option<Credentials>) -> Result<Box<dyn ExchangeClient>, ExchangeError> + Send + Sync,
{
    fn build(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<Box<dyn ExchangeClient>, ExchangeError> {
        self(credentials)
    }
}

/// Look up the venue market for a unified symbol.
pub fn require_market<'a>(
    markets: &'a MarketMap,
    symbol: &Symbol,
) -> Result<&'a Market, ExchangeError> {
    markets
        .get(symbol)
        .ok_or_else(|| ExchangeError::BadSymbol(format!("market {} not listed", symbol)))
}

// ---------------------------------------------------------------------------
// Credential Resolver Trait
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("user '{0}' does not exist or has no API key configured")]
    NotFound(String),
}

/// Maps an opaque user identifier to that user's venue credentials.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, user_id: &str) -> Result<Credentials, CredentialError>;
}
