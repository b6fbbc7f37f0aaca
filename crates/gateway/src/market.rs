use crate::error::GatewayError;
use crate::gateway::{Action, ExchangeGateway};
use tradegate_core::{Candle, Symbol, TickerSummary, Timeframe};

/// Largest candle window a single request may ask for.
pub const MAX_CANDLES: u32 = 1000;

impl ExchangeGateway {
    /// Current price snapshot for `base/quote`. Public data, no credentials.
    pub async fn get_price(
        &self,
        exchange: &str,
        base: &str,
        quote: &str,
    ) -> Result<TickerSummary, GatewayError> {
        let symbol = Symbol::new(base, quote)?;
        let client = self.create_client(exchange, None).await?;
        let ticker = self
            .call(&client, None, Action::FetchPrice, client.fetch_ticker(&symbol))
            .await?;
        Ok(TickerSummary::from_ticker(client.id(), ticker))
    }

    /// Up to `limit` candles, oldest first.
    pub async fn get_ohlcv(
        &self,
        exchange: &str,
        base: &str,
        quote: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, GatewayError> {
        if limit == 0 || limit > MAX_CANDLES {
            return Err(GatewayError::invalid(format!(
                "limit must be between 1 and {}",
                MAX_CANDLES
            )));
        }
        let symbol = Symbol::new(base, quote)?;
        let client = self.create_client(exchange, None).await?;
        let mut candles = self
            .call(
                &client,
                None,
                Action::FetchCandles,
                client.fetch_ohlcv(&symbol, timeframe, limit),
            )
            .await?;

        candles.sort_by_key(|c| c.timestamp);
        let excess = candles.len().saturating_sub(limit as usize);
        candles.drain(..excess);
        Ok(candles)
    }
}
