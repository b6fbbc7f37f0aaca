//! The gateway between HTTP handlers and venue connectors.
//!
//! Every operation follows the same path: resolve credentials (trading
//! only), obtain a client with loaded market metadata, make one delegated
//! call under the configured timeout, and map failures to [`GatewayError`].

pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod market;
pub mod registry;
pub mod trading;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, CredentialEntry, GatewayConfig, GatewaySettings, ServerConfig};
pub use credentials::StaticCredentialResolver;
pub use error::GatewayError;
pub use gateway::{CredentialSource, ExchangeGateway, SharedClient};
pub use registry::ExchangeRegistry;
pub use trading::BALANCE_ASSETS;
