use chrono::{DateTime, SecondsFormat};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Errors produced when parsing user-supplied identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid symbol '{0}', expected BASE/QUOTE")]
    InvalidSymbol(String),
    #[error("invalid side '{0}', expected buy or sell")]
    InvalidSide(String),
    #[error("invalid timeframe '{0}'")]
    InvalidTimeframe(String),
}

// ---------------------------------------------------------------------------
// Symbol
// ---------------------------------------------------------------------------

/// A trading pair in unified `BASE/QUOTE` form, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    pub fn new(base: &str, quote: &str) -> Result<Self, ParseError> {
        let base = base.trim();
        let quote = quote.trim();
        if base.is_empty() || quote.is_empty() || base.contains('/') || quote.contains('/') {
            return Err(ParseError::InvalidSymbol(format!("{}/{}", base, quote)));
        }
        Ok(Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// Separator-free form used by most venue APIs (e.g. `BTCUSDT`).
    pub fn compact(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((base, quote)) => Symbol::new(base, quote),
            None => Err(ParseError::InvalidSymbol(s.to_string())),
        }
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Market metadata for one listed pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    /// Venue-native identifier (e.g. `BTCUSDT`).
    pub id: String,
    pub symbol: Symbol,
    pub active: bool,
}

pub type MarketMap = HashMap<Symbol, Market>;

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err(ParseError::InvalidSide(s.to_string())),
        }
    }
}

/// The type of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

/// Pricing of a new order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    Limit { price: Decimal },
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Market => OrderType::Market,
            OrderKind::Limit { .. } => OrderType::Limit,
        }
    }

    pub fn price(&self) -> Option<Decimal> {
        match self {
            OrderKind::Market => None,
            OrderKind::Limit { price } => Some(*price),
        }
    }
}

/// A new order to be sent to a venue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub amount: Decimal,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: Side, amount: Decimal) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Market,
            amount,
        }
    }

    pub fn limit(symbol: Symbol, side: Side, amount: Decimal, price: Decimal) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Limit { price },
            amount,
        }
    }
}

/// Lifecycle state of an order as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
    Expired,
    Rejected,
}

impl OrderStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, OrderStatus::Open)
    }
}

/// An order as reported back by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: String,
    pub client_order_id: Option<String>,
    pub timestamp: Option<i64>,
    pub datetime: Option<String>,
    pub symbol: Symbol,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub side: Side,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub cost: Decimal,
    pub status: OrderStatus,
    /// Raw venue payload, passed through untouched.
    #[serde(default)]
    pub info: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Market Data
// ---------------------------------------------------------------------------

/// Timeframe unit. `Month` is approximated as 30 days for bucket maths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    fn suffix(&self) -> char {
        match self {
            TimeUnit::Second => 's',
            TimeUnit::Minute => 'm',
            TimeUnit::Hour => 'h',
            TimeUnit::Day => 'd',
            TimeUnit::Week => 'w',
            TimeUnit::Month => 'M',
        }
    }

    fn millis(&self) -> i64 {
        match self {
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
            TimeUnit::Week => 7 * 86_400_000,
            TimeUnit::Month => 30 * 86_400_000,
        }
    }
}

/// Candle granularity such as `1m`, `4h` or `1M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    count: u32,
    unit: TimeUnit,
}

impl Timeframe {
    pub fn new(count: u32, unit: TimeUnit) -> Result<Self, ParseError> {
        let fits = i64::from(count).checked_mul(unit.millis()).is_some();
        if count == 0 || !fits {
            return Err(ParseError::InvalidTimeframe(format!("{}{}", count, unit.suffix())));
        }
        Ok(Self { count, unit })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Bucket width in milliseconds. Always representable, `new` checks it.
    pub fn duration_ms(&self) -> i64 {
        i64::from(self.count).saturating_mul(self.unit.millis())
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self {
            count: 1,
            unit: TimeUnit::Minute,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || ParseError::InvalidTimeframe(s.to_string());
        let unit_char = trimmed.chars().last().ok_or_else(invalid)?;
        let unit = match unit_char {
            's' => TimeUnit::Second,
            'm' => TimeUnit::Minute,
            'h' => TimeUnit::Hour,
            'd' => TimeUnit::Day,
            'w' => TimeUnit::Week,
            'M' => TimeUnit::Month,
            _ => return Err(invalid()),
        };
        let count: u32 = trimmed[..trimmed.len() - 1]
            .parse()
            .map_err(|_| invalid())?;
        Timeframe::new(count, unit).map_err(|_| invalid())
    }
}

impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A ticker snapshot as reported by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub symbol: Symbol,
    pub timestamp: Option<i64>,
    pub datetime: Option<String>,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub base_volume: Option<Decimal>,
    pub quote_volume: Option<Decimal>,
}

/// The subset of a [`Ticker`] returned by the price endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSummary {
    pub exchange: String,
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    pub last: Option<Decimal>,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    /// Base-asset volume.
    pub volume: Option<Decimal>,
}

impl TickerSummary {
    pub fn from_ticker(exchange: &str, ticker: Ticker) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: ticker.symbol,
            timestamp: ticker.timestamp,
            datetime: ticker.datetime,
            last: ticker.last,
            bid: ticker.bid,
            ask: ticker.ask,
            high: ticker.high,
            low: ticker.low,
            volume: ticker.base_volume,
        }
    }

    /// Drop the time fields (legacy response shape).
    pub fn without_time(mut self) -> Self {
        self.timestamp = None;
        self.datetime = None;
        self
    }
}

/// A single OHLCV candle; `timestamp` is the bucket open in epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Free / used / total amounts of one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceEntry {
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
}

/// Account balances keyed by asset code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub free: BTreeMap<String, Decimal>,
    pub used: BTreeMap<String, Decimal>,
    pub total: BTreeMap<String, Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Balance {
    /// Record an asset; `total` is derived as `free + used`.
    pub fn insert(&mut self, asset: &str, free: Decimal, used: Decimal) {
        let asset = asset.to_uppercase();
        self.free.insert(asset.clone(), free);
        self.used.insert(asset.clone(), used);
        self.total.insert(asset, free + used);
    }

    /// Amounts for `asset`, zero when the venue did not report it.
    pub fn entry(&self, asset: &str) -> BalanceEntry {
        let get = |map: &BTreeMap<String, Decimal>| {
            map.get(asset).copied().unwrap_or(Decimal::ZERO)
        };
        BalanceEntry {
            free: get(&self.free),
            used: get(&self.used),
            total: get(&self.total),
        }
    }

    /// Exactly one entry per requested asset.
    pub fn filtered(&self, assets: &[&str]) -> BTreeMap<String, BalanceEntry> {
        assets
            .iter()
            .map(|asset| (asset.to_string(), self.entry(asset)))
            .collect()
    }
}

/// ISO-8601 rendering of an epoch-millisecond timestamp.
pub fn iso8601(timestamp_ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_is_upper_cased() {
        let lower = Symbol::new("btc", "usdt").unwrap();
        let upper = Symbol::new("BTC", "USDT").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), "BTC/USDT");
        assert_eq!(lower.compact(), "BTCUSDT");
    }

    #[test]
    fn test_symbol_parse() {
        let symbol: Symbol = "eth/btc".parse().unwrap();
        assert_eq!(symbol.base(), "ETH");
        assert_eq!(symbol.quote(), "BTC");
        assert!("ETHBTC".parse::<Symbol>().is_err());
        assert!("/USDT".parse::<Symbol>().is_err());
        assert!("A/B/C".parse::<Symbol>().is_err());
    }

    #[test]
    fn test_side_is_case_insensitive_and_strict() {
        assert_eq!("BUY".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("bUy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("Sell".parse::<Side>().unwrap(), Side::Sell);
        assert_eq!(
            "hold".parse::<Side>(),
            Err(ParseError::InvalidSide("hold".to_string()))
        );
    }

    #[test]
    fn test_timeframe_parse() {
        let tf: Timeframe = "15m".parse().unwrap();
        assert_eq!(tf.duration_ms(), 15 * 60_000);
        assert_eq!(tf.to_string(), "15m");

        let month: Timeframe = "1M".parse().unwrap();
        assert_eq!(month.unit(), TimeUnit::Month);

        assert_eq!(Timeframe::default().to_string(), "1m");
        assert!("0m".parse::<Timeframe>().is_err());
        assert!("m".parse::<Timeframe>().is_err());
        assert!("5x".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_duration_must_fit() {
        let widest: Timeframe = "3000000000M".parse().unwrap();
        assert_eq!(widest.duration_ms(), 3_000_000_000 * 30 * 86_400_000);
        assert!(matches!(
            "4000000000M".parse::<Timeframe>(),
            Err(ParseError::InvalidTimeframe(_))
        ));
        assert!(Timeframe::new(u32::MAX, TimeUnit::Month).is_err());
        assert!(Timeframe::new(u32::MAX, TimeUnit::Week).is_ok());
    }

    #[test]
    fn test_balance_filtered_defaults_to_zero() {
        let mut balance = Balance::default();
        balance.insert("BTC", dec!(0.5), dec!(0.1));
        balance.insert("SOL", dec!(3), dec!(0));

        let filtered = balance.filtered(&["BTC", "USDT", "ETH"]);
        assert_eq!(filtered.len(), 3);
        assert_eq!(filtered["BTC"].total, dec!(0.6));
        assert_eq!(filtered["USDT"], BalanceEntry::default());
        assert!(!filtered.contains_key("SOL"));
    }

    #[test]
    fn test_ticker_summary_projection() {
        let ticker = Ticker {
            symbol: Symbol::new("btc", "usdt").unwrap(),
            timestamp: Some(1_700_000_000_000),
            datetime: iso8601(1_700_000_000_000),
            last: Some(dec!(100)),
            bid: Some(dec!(99)),
            ask: Some(dec!(101)),
            high: Some(dec!(110)),
            low: Some(dec!(90)),
            base_volume: Some(dec!(12)),
            quote_volume: Some(dec!(1200)),
        };
        let summary = TickerSummary::from_ticker("paper", ticker);
        assert_eq!(summary.volume, Some(dec!(12)));
        assert_eq!(summary.datetime.as_deref(), Some("2023-11-14T22:13:20.000Z"));

        let legacy = serde_json::to_value(summary.without_time()).unwrap();
        assert!(legacy.get("timestamp").is_none());
        assert_eq!(legacy["symbol"], "BTC/USDT");
    }
}
