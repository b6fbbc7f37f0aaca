//! Binance spot connector.
//!
//! Talks to the public REST API (`/api/v3`). The same wire protocol serves
//! binance.com and binance.us, so both venues share this implementation and
//! differ only in base URL.

pub mod client;
pub mod protocol;

pub use client::{BinanceClient, BinanceConfig, BinanceFactory};
