use crate::error::{ApiError, Result};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tradegate_core::{
    Balance, BalanceEntry, Candle, Credentials, OrderRecord, Side, Symbol, TickerSummary, Timeframe,
};
use tradegate_gateway::CredentialSource;

type SharedState = State<Arc<AppState>>;

/// Root, health and discovery endpoints.
pub fn service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .route("/exchanges", get(list_exchanges))
}

/// Public market data, mounted under `/market`.
pub fn market_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/price", get(price))
        .route("/ohlcv", get(ohlcv))
}

/// Authenticated trading, mounted under `/trade`. Balances are filtered.
pub fn trade_routes() -> Router<Arc<AppState>> {
    order_routes().route(
        "/balance",
        get(filtered_balance_query).post(filtered_balance_body),
    )
}

/// The unprefixed surface kept for existing clients: `/price` without time
/// fields and the raw venue balance.
pub fn legacy_routes() -> Router<Arc<AppState>> {
    order_routes()
        .route("/price", get(legacy_price))
        .route("/ohlcv", get(ohlcv))
        .route("/balance", get(raw_balance_query).post(raw_balance_body))
}

fn order_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/order/limit", post(limit_order))
        .route("/order/market", post(market_order))
        .route("/order/cancel", post(cancel_order))
        .route("/order", get(fetch_order))
        .route("/orders", get(fetch_orders))
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

async fn welcome() -> impl IntoResponse {
    Json(serde_json::json!({
        "msg": "Welcome to the unified trading gateway",
    }))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_exchanges(State(state): SharedState) -> impl IntoResponse {
    Json(serde_json::json!({
        "exchanges": state.gateway.registry().supported(),
    }))
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PriceQuery {
    pub exchange: String,
    pub base: String,
    pub quote: String,
}

fn default_timeframe() -> String {
    Timeframe::default().to_string()
}

fn default_candle_limit() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct OhlcvQuery {
    pub exchange: String,
    pub base: String,
    pub quote: String,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_candle_limit")]
    pub limit: u32,
}

async fn fetch_price(state: &AppState, query: PriceQuery) -> Result<TickerSummary> {
    Ok(state
        .gateway
        .get_price(&query.exchange, &query.base, &query.quote)
        .await?)
}

async fn price(
    State(state): SharedState,
    query: std::result::Result<Query<PriceQuery>, QueryRejection>,
) -> Result<Json<TickerSummary>> {
    let Query(query) = query?;
    Ok(Json(fetch_price(&state, query).await?))
}

async fn legacy_price(
    State(state): SharedState,
    query: std::result::Result<Query<PriceQuery>, QueryRejection>,
) -> Result<Json<TickerSummary>> {
    let Query(query) = query?;
    Ok(Json(fetch_price(&state, query).await?.without_time()))
}

async fn ohlcv(
    State(state): SharedState,
    query: std::result::Result<Query<OhlcvQuery>, QueryRejection>,
) -> Result<Json<Vec<Candle>>> {
    let Query(query) = query?;
    let timeframe: Timeframe = query.timeframe.parse()?;
    let candles = state
        .gateway
        .get_ohlcv(&query.exchange, &query.base, &query.quote, timeframe, query.limit)
        .await?;
    Ok(Json(candles))
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

// Trading requests carry either `api_key` + `api_secret` or a `user_id`.
// None of these types derive Debug so secrets cannot end up in logs.

fn credential_source(
    api_key: Option<String>,
    api_secret: Option<String>,
    user_id: Option<String>,
) -> Result<CredentialSource> {
    match (api_key, api_secret, user_id) {
        (None, None, Some(user_id)) => Ok(CredentialSource::User(user_id)),
        (None, None, None) => Err(ApiError::Rejected(
            "either api_key and api_secret or user_id is required".to_string(),
        )),
        (api_key, api_secret, _) => Ok(CredentialSource::Direct(Credentials::new(
            api_key.unwrap_or_default(),
            api_secret.unwrap_or_default(),
        ))),
    }
}

#[derive(Deserialize)]
pub struct OrderBody {
    pub exchange: String,
    pub symbol: String,
    pub side: String,
    pub amount: Decimal,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelBody {
    pub exchange: String,
    pub symbol: String,
    pub order_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct OrderQuery {
    pub exchange: String,
    pub symbol: String,
    pub order_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_order_limit() -> u32 {
    20
}

#[derive(Deserialize)]
pub struct OrdersQuery {
    pub exchange: String,
    pub base: String,
    pub quote: String,
    #[serde(default = "default_order_limit")]
    pub limit: u32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct BalanceParams {
    pub exchange: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

async fn limit_order(
    State(state): SharedState,
    body: std::result::Result<Json<OrderBody>, JsonRejection>,
) -> Result<Json<OrderRecord>> {
    let Json(req) = body?;
    let symbol: Symbol = req.symbol.parse()?;
    let side: Side = req.side.parse()?;
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    let order = state
        .gateway
        .place_limit_order(&req.exchange, source, symbol, side, req.amount, req.price)
        .await?;
    Ok(Json(order))
}

async fn market_order(
    State(state): SharedState,
    body: std::result::Result<Json<OrderBody>, JsonRejection>,
) -> Result<Json<OrderRecord>> {
    let Json(req) = body?;
    let symbol: Symbol = req.symbol.parse()?;
    let side: Side = req.side.parse()?;
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    let order = state
        .gateway
        .place_market_order(&req.exchange, source, symbol, side, req.amount)
        .await?;
    Ok(Json(order))
}

async fn cancel_order(
    State(state): SharedState,
    body: std::result::Result<Json<CancelBody>, JsonRejection>,
) -> Result<Json<OrderRecord>> {
    let Json(req) = body?;
    let symbol: Symbol = req.symbol.parse()?;
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    let order = state
        .gateway
        .cancel_order(&req.exchange, source, symbol, &req.order_id)
        .await?;
    Ok(Json(order))
}

async fn fetch_order(
    State(state): SharedState,
    query: std::result::Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<OrderRecord>> {
    let Query(req) = query?;
    let symbol: Symbol = req.symbol.parse()?;
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    let order = state
        .gateway
        .fetch_order(&req.exchange, source, symbol, &req.order_id)
        .await?;
    Ok(Json(order))
}

async fn fetch_orders(
    State(state): SharedState,
    query: std::result::Result<Query<OrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderRecord>>> {
    let Query(req) = query?;
    let symbol = Symbol::new(&req.base, &req.quote)?;
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    let orders = state
        .gateway
        .fetch_orders(&req.exchange, source, symbol, req.limit)
        .await?;
    Ok(Json(orders))
}

async fn filtered_balance(
    state: &AppState,
    req: BalanceParams,
) -> Result<Json<BTreeMap<String, BalanceEntry>>> {
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    Ok(Json(
        state
            .gateway
            .get_balance_filtered(&req.exchange, source)
            .await?,
    ))
}

async fn raw_balance(state: &AppState, req: BalanceParams) -> Result<Json<Balance>> {
    let source = credential_source(req.api_key, req.api_secret, req.user_id)?;
    Ok(Json(state.gateway.get_balance(&req.exchange, source).await?))
}

async fn filtered_balance_query(
    State(state): SharedState,
    query: std::result::Result<Query<BalanceParams>, QueryRejection>,
) -> Result<Json<BTreeMap<String, BalanceEntry>>> {
    let Query(req) = query?;
    filtered_balance(&state, req).await
}

async fn filtered_balance_body(
    State(state): SharedState,
    body: std::result::Result<Json<BalanceParams>, JsonRejection>,
) -> Result<Json<BTreeMap<String, BalanceEntry>>> {
    let Json(req) = body?;
    filtered_balance(&state, req).await
}

async fn raw_balance_query(
    State(state): SharedState,
    query: std::result::Result<Query<BalanceParams>, QueryRejection>,
) -> Result<Json<Balance>> {
    let Query(req) = query?;
    raw_balance(&state, req).await
}

async fn raw_balance_body(
    State(state): SharedState,
    body: std::result::Result<Json<BalanceParams>, JsonRejection>,
) -> Result<Json<Balance>> {
    let Json(req) = body?;
    raw_balance(&state, req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_source_selection() {
        assert!(matches!(
            credential_source(None, None, Some("testuser".to_string())),
            Ok(CredentialSource::User(ref user)) if user == "testuser"
        ));
        assert!(matches!(
            credential_source(Some("k".to_string()), Some("s".to_string()), Some("u".to_string())),
            Ok(CredentialSource::Direct(ref creds)) if creds.api_key() == "k"
        ));
        assert!(matches!(
            credential_source(Some("k".to_string()), None, None),
            Ok(CredentialSource::Direct(ref creds)) if !creds.is_complete()
        ));
        assert!(matches!(
            credential_source(None, None, None),
            Err(ApiError::Rejected(_))
        ));
    }

    #[test]
    fn test_query_defaults() {
        let query: OhlcvQuery =
            serde_json::from_value(serde_json::json!({
                "exchange": "paper",
                "base": "btc",
                "quote": "usdt",
            }))
            .unwrap();
        assert_eq!(query.timeframe, "1m");
        assert_eq!(query.limit, 10);

        let query: OrdersQuery =
            serde_json::from_value(serde_json::json!({
                "exchange": "paper",
                "base": "btc",
                "quote": "usdt",
            }))
            .unwrap();
        assert_eq!(query.limit, 20);
    }
}
