use crate::error::GatewayError;
use crate::gateway::{Action, CredentialSource, ExchangeGateway};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tradegate_core::{Balance, BalanceEntry, OrderRecord, OrderRequest, Side, Symbol};

/// Assets reported by the filtered balance view.
pub const BALANCE_ASSETS: [&str; 3] = ["BTC", "USDT", "ETH"];

/// Largest order history a single request may ask for.
pub const MAX_ORDERS: u32 = 1000;

fn positive(field: &str, value: Decimal) -> Result<Decimal, GatewayError> {
    if value > Decimal::ZERO {
        Ok(value)
    } else {
        Err(GatewayError::invalid(format!("{} must be positive", field)))
    }
}

fn require_order_id(id: &str) -> Result<&str, GatewayError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(GatewayError::invalid("order_id must not be empty"));
    }
    Ok(id)
}

// Inputs are validated before credentials are resolved, and credentials
// are resolved before any client is built.
impl ExchangeGateway {
    pub async fn place_limit_order(
        &self,
        exchange: &str,
        source: CredentialSource,
        symbol: Symbol,
        side: Side,
        amount: Decimal,
        price: Option<Decimal>,
    ) -> Result<OrderRecord, GatewayError> {
        let price = price.ok_or_else(|| GatewayError::invalid("limit orders require a price"))?;
        let request = OrderRequest::limit(
            symbol,
            side,
            positive("amount", amount)?,
            positive("price", price)?,
        );
        self.submit(exchange, source, request, Action::PlaceLimitOrder)
            .await
    }

    pub async fn place_market_order(
        &self,
        exchange: &str,
        source: CredentialSource,
        symbol: Symbol,
        side: Side,
        amount: Decimal,
    ) -> Result<OrderRecord, GatewayError> {
        let request = OrderRequest::market(symbol, side, positive("amount", amount)?);
        self.submit(exchange, source, request, Action::PlaceMarketOrder)
            .await
    }

    async fn submit(
        &self,
        exchange: &str,
        source: CredentialSource,
        request: OrderRequest,
        action: Action,
    ) -> Result<OrderRecord, GatewayError> {
        let (client, creds) = self.authenticated(exchange, source).await?;
        let order = self
            .call(&client, Some(&creds), action, client.create_order(&request))
            .await?;
        tracing::info!(
            exchange = %client.id(),
            symbol = %order.symbol,
            side = %order.side,
            order_id = %order.id,
            status = ?order.status,
            "Order placed"
        );
        Ok(order)
    }

    pub async fn cancel_order(
        &self,
        exchange: &str,
        source: CredentialSource,
        symbol: Symbol,
        order_id: &str,
    ) -> Result<OrderRecord, GatewayError> {
        let order_id = require_order_id(order_id)?;
        let (client, creds) = self.authenticated(exchange, source).await?;
        let order = self
            .call(
                &client,
                Some(&creds),
                Action::CancelOrder,
                client.cancel_order(order_id, &symbol),
            )
            .await?;
        tracing::info!(
            exchange = %client.id(),
            symbol = %symbol,
            order_id = %order_id,
            "Order canceled"
        );
        Ok(order)
    }

    pub async fn fetch_order(
        &self,
        exchange: &str,
        source: CredentialSource,
        symbol: Symbol,
        order_id: &str,
    ) -> Result<OrderRecord, GatewayError> {
        let order_id = require_order_id(order_id)?;
        let (client, creds) = self.authenticated(exchange, source).await?;
        self.call(
            &client,
            Some(&creds),
            Action::FetchOrder,
            client.fetch_order(order_id, &symbol),
        )
        .await
    }

    /// Most recent orders on `symbol`, oldest first.
    pub async fn fetch_orders(
        &self,
        exchange: &str,
        source: CredentialSource,
        symbol: Symbol,
        limit: u32,
    ) -> Result<Vec<OrderRecord>, GatewayError> {
        if limit == 0 || limit > MAX_ORDERS {
            return Err(GatewayError::invalid(format!(
                "limit must be between 1 and {}",
                MAX_ORDERS
            )));
        }
        let (client, creds) = self.authenticated(exchange, source).await?;
        self.call(
            &client,
            Some(&creds),
            Action::FetchOrders,
            client.fetch_orders(&symbol, limit),
        )
        .await
    }

    /// Full account balance as the venue reports it.
    pub async fn get_balance(
        &self,
        exchange: &str,
        source: CredentialSource,
    ) -> Result<Balance, GatewayError> {
        let (client, creds) = self.authenticated(exchange, source).await?;
        self.call(&client, Some(&creds), Action::FetchBalance, client.fetch_balance())
            .await
    }

    /// Balance restricted to [`BALANCE_ASSETS`]; missing assets read as zero.
    pub async fn get_balance_filtered(
        &self,
        exchange: &str,
        source: CredentialSource,
    ) -> Result<BTreeMap<String, BalanceEntry>, GatewayError> {
        Ok(self
            .get_balance(exchange, source)
            .await?
            .filtered(&BALANCE_ASSETS))
    }
}
