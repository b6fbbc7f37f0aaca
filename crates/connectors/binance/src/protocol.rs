use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tradegate_core::*;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker24h {
    pub last_price: Decimal,
    pub bid_price: Decimal,
    pub ask_price: Decimal,
    pub high_price: Decimal,
    pub low_price: Decimal,
    pub volume: Decimal,
    pub quote_volume: Decimal,
    pub close_time: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: i64,
    pub client_order_id: String,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub cummulative_quote_qty: Decimal,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub transact_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub balances: Vec<AssetBalance>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AssetBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

pub fn markets_from(info: ExchangeInfo) -> MarketMap {
    info.symbols
        .into_iter()
        .filter_map(|s| {
            let symbol = Symbol::new(&s.base_asset, &s.quote_asset).ok()?;
            Some((
                symbol.clone(),
                Market {
                    id: s.symbol,
                    symbol,
                    active: s.status == "TRADING",
                },
            ))
        })
        .collect()
}

pub fn ticker_from(symbol: &Symbol, raw: Ticker24h) -> Ticker {
    Ticker {
        symbol: symbol.clone(),
        timestamp: Some(raw.close_time),
        datetime: iso8601(raw.close_time),
        last: Some(raw.last_price),
        bid: Some(raw.bid_price),
        ask: Some(raw.ask_price),
        high: Some(raw.high_price),
        low: Some(raw.low_price),
        base_volume: Some(raw.volume),
        quote_volume: Some(raw.quote_volume),
    }
}

/// Klines arrive as positional arrays: `[open_time, "o", "h", "l", "c", "v", ...]`.
pub fn candle_from(row: &[Value]) -> Result<Candle, ExchangeError> {
    let malformed = || ExchangeError::Exchange(format!("malformed kline: {:?}", row));
    let decimal = |idx: usize| -> Result<Decimal, ExchangeError> {
        row.get(idx)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(malformed)
    };
    Ok(Candle {
        timestamp: row.first().and_then(Value::as_i64).ok_or_else(malformed)?,
        open: decimal(1)?,
        high: decimal(2)?,
        low: decimal(3)?,
        close: decimal(4)?,
        volume: decimal(5)?,
    })
}

fn status_from(raw: &str) -> OrderStatus {
    match raw {
        "NEW" | "PARTIALLY_FILLED" | "PENDING_NEW" => OrderStatus::Open,
        "FILLED" => OrderStatus::Closed,
        "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
        "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
        _ => OrderStatus::Rejected,
    }
}

/// Convert an order payload, keeping the raw JSON in `info`.
pub fn order_from(symbol: &Symbol, raw: Value) -> Result<OrderRecord, ExchangeError> {
    let parsed: OrderResponse = serde_json::from_value(raw.clone())
        .map_err(|e| ExchangeError::Exchange(format!("unexpected order payload: {}", e)))?;
    let side: Side = parsed
        .side
        .parse()
        .map_err(|e: ParseError| ExchangeError::Exchange(e.to_string()))?;
    let order_type = if parsed.order_type == "MARKET" {
        OrderType::Market
    } else {
        OrderType::Limit
    };
    let timestamp = parsed.transact_time.or(parsed.time);
    Ok(OrderRecord {
        id: parsed.order_id.to_string(),
        client_order_id: Some(parsed.client_order_id),
        timestamp,
        datetime: timestamp.and_then(iso8601),
        symbol: symbol.clone(),
        order_type,
        side,
        price: (!parsed.price.is_zero()).then_some(parsed.price),
        amount: parsed.orig_qty,
        filled: parsed.executed_qty,
        remaining: parsed.orig_qty - parsed.executed_qty,
        cost: parsed.cummulative_quote_qty.max(Decimal::ZERO),
        status: status_from(&parsed.status),
        info: raw,
    })
}

pub fn balance_from(raw: AccountInfo) -> Balance {
    let mut balance = Balance {
        timestamp: raw.update_time,
        ..Default::default()
    };
    for asset in raw.balances {
        balance.insert(&asset.asset, asset.free, asset.locked);
    }
    balance
}

/// Binance kline interval for a timeframe.
pub fn interval(timeframe: Timeframe) -> Result<String, ExchangeError> {
    const SUPPORTED: &[&str] = &[
        "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d",
        "1w", "1M",
    ];
    let rendered = timeframe.to_string();
    if SUPPORTED.contains(&rendered.as_str()) {
        Ok(rendered)
    } else {
        Err(ExchangeError::NotSupported(format!(
            "timeframe {} is not offered by binance",
            rendered
        )))
    }
}

/// Map a non-success HTTP response to an error category.
pub fn api_error(status: u16, body: &str) -> ExchangeError {
    let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) else {
        let message = format!("HTTP {}", status);
        return match status {
            401 | 403 => ExchangeError::Authentication(message),
            418 | 429 => ExchangeError::RateLimited(message),
            500..=599 => ExchangeError::Network(message),
            _ => ExchangeError::Exchange(message),
        };
    };

    let message = format!("{} {}", err.code, err.msg);
    let lowered = err.msg.to_lowercase();
    match err.code {
        -1121 => ExchangeError::BadSymbol(message),
        -2013 => ExchangeError::OrderNotFound(message),
        -2011 if lowered.contains("unknown order") => ExchangeError::OrderNotFound(message),
        -2010 if lowered.contains("insufficient balance") => {
            ExchangeError::InsufficientFunds(message)
        }
        -2010 | -2011 | -1013 | -1111 | -1100 | -1102 | -1106 => {
            ExchangeError::InvalidOrder(message)
        }
        -1022 | -2014 | -2015 => ExchangeError::Authentication(message),
        -1003 | -1015 => ExchangeError::RateLimited(message),
        -1001 | -1007 => ExchangeError::Network(message),
        _ => ExchangeError::Exchange(message),
    }
}
