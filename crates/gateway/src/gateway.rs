use crate::config::{GatewayConfig, GatewaySettings};
use crate::credentials::StaticCredentialResolver;
use crate::error::GatewayError;
use crate::registry::ExchangeRegistry;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tradegate_core::*;

pub type SharedClient = Arc<dyn ExchangeClient>;

/// Where the credentials for a trading call come from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    /// Key and secret supplied with the request.
    Direct(Credentials),
    /// Opaque user id looked up through the credential resolver.
    User(String),
}

/// The single venue call an operation delegates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action {
    FetchPrice,
    FetchCandles,
    PlaceLimitOrder,
    PlaceMarketOrder,
    CancelOrder,
    FetchOrder,
    FetchOrders,
    FetchBalance,
}

impl Action {
    fn describe(&self) -> &'static str {
        match self {
            Action::FetchPrice => "fetch price",
            Action::FetchCandles => "fetch candles",
            Action::PlaceLimitOrder => "place limit order",
            Action::PlaceMarketOrder => "place market order",
            Action::CancelOrder => "cancel order",
            Action::FetchOrder => "fetch order",
            Action::FetchOrders => "fetch orders",
            Action::FetchBalance => "fetch balance",
        }
    }

    fn into_error(self, exchange: String, source: ExchangeError) -> GatewayError {
        let action = self.describe();
        match self {
            Action::PlaceLimitOrder | Action::PlaceMarketOrder => GatewayError::Order {
                exchange,
                action,
                source,
            },
            Action::CancelOrder => GatewayError::Cancel {
                exchange,
                action,
                source,
            },
            _ => GatewayError::Fetch {
                exchange,
                action,
                source,
            },
        }
    }
}

/// (exchange id, credential fingerprint)
type CacheKey = (String, Option<String>);

fn cache_key(exchange: &str, credentials: Option<&Credentials>) -> CacheKey {
    (exchange.to_string(), credentials.map(Credentials::fingerprint))
}

struct CachedClient {
    client: SharedClient,
    created: Instant,
}

struct ClientCache {
    ttl: Duration,
    capacity: usize,
    entries: RwLock<HashMap<CacheKey, CachedClient>>,
}

impl ClientCache {
    async fn get(&self, key: &CacheKey) -> Option<SharedClient> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|cached| cached.created.elapsed() < self.ttl)
            .map(|cached| cached.client.clone())
    }

    /// Store a client, dropping expired entries and, at capacity, the oldest one.
    async fn insert(&self, key: CacheKey, client: SharedClient) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, cached| cached.created.elapsed() < ttl);
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.created)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CachedClient {
                client,
                created: Instant::now(),
            },
        );
    }

    async fn remove(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }
}

/// Builds connected exchange clients and runs delegated calls.
///
/// By default every call gets a fresh client, paying one market-metadata
/// round-trip each time. With `cache_clients` enabled, connected clients
/// are reused per (exchange, credentials) until their TTL lapses, they are
/// invalidated explicitly, or a call on them fails at the connection level.
pub struct ExchangeGateway {
    registry: ExchangeRegistry,
    resolver: Arc<dyn CredentialResolver>,
    timeout: Duration,
    cache: Option<ClientCache>,
}

impl ExchangeGateway {
    pub fn new(
        registry: ExchangeRegistry,
        resolver: Arc<dyn CredentialResolver>,
        settings: &GatewaySettings,
    ) -> Self {
        let cache = settings.cache_clients.then(|| ClientCache {
            ttl: settings.cache_ttl(),
            capacity: settings.cache_max_clients.max(1),
            entries: RwLock::new(HashMap::new()),
        });
        Self {
            registry,
            resolver,
            timeout: settings.request_timeout(),
            cache,
        }
    }

    /// Gateway over the built-in venues and the configured credential store.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ExchangeError> {
        let registry = ExchangeRegistry::with_defaults(config)?;
        let resolver = StaticCredentialResolver::from_config(config);
        Ok(Self::new(registry, resolver, &config.gateway))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ExchangeRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn caching_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// Produce a client bound to `exchange_id` with its markets loaded.
    pub async fn create_client(
        &self,
        exchange_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<SharedClient, GatewayError> {
        let exchange = exchange_id.trim().to_lowercase();
        let factory = self
            .registry
            .factory(&exchange)
            .ok_or_else(|| GatewayError::UnsupportedExchange {
                exchange: exchange_id.trim().to_string(),
            })?;

        let key = cache_key(&exchange, credentials.as_ref());
        if let Some(cache) = &self.cache {
            if let Some(client) = cache.get(&key).await {
                tracing::debug!(exchange = %exchange, "Reusing cached exchange client");
                return Ok(client);
            }
        }

        let scrub = |message: String| match &credentials {
            Some(creds) => creds.scrub(&message),
            None => message,
        };
        let init_failure = |reason: String| GatewayError::InitializationFailure {
            exchange: exchange.clone(),
            reason,
        };

        let mut client = factory
            .build(credentials.clone())
            .map_err(|e| init_failure(scrub(e.to_string())))?;

        let market_count = match tokio::time::timeout(self.timeout, client.load_markets()).await {
            Ok(Ok(markets)) => markets.len(),
            Ok(Err(e)) => return Err(init_failure(scrub(e.to_string()))),
            Err(_) => {
                return Err(init_failure(format!(
                    "market metadata did not load within {}ms",
                    self.timeout.as_millis()
                )))
            }
        };
        if market_count == 0 {
            return Err(init_failure("venue reported no markets".to_string()));
        }

        tracing::info!(
            exchange = %exchange,
            markets = market_count,
            authenticated = credentials.is_some(),
            "Exchange client ready"
        );

        let client: SharedClient = Arc::from(client);
        if let Some(cache) = &self.cache {
            cache.insert(key, client.clone()).await;
        }
        Ok(client)
    }

    /// Drop every cached client of one venue.
    pub async fn invalidate(&self, exchange_id: &str) {
        if let Some(cache) = &self.cache {
            let exchange = exchange_id.trim().to_lowercase();
            cache
                .entries
                .write()
                .await
                .retain(|(cached_exchange, _), _| cached_exchange != &exchange);
        }
    }

    pub async fn clear(&self) {
        if let Some(cache) = &self.cache {
            cache.entries.write().await.clear();
        }
    }

    pub async fn cached_clients(&self) -> usize {
        match &self.cache {
            Some(cache) => cache.entries.read().await.len(),
            None => 0,
        }
    }

    /// Turn a credential source into a usable key pair.
    pub async fn resolve(&self, source: CredentialSource) -> Result<Credentials, GatewayError> {
        match source {
            CredentialSource::Direct(creds) if creds.is_complete() => Ok(creds),
            CredentialSource::Direct(_) => Err(GatewayError::invalid(
                "api_key and api_secret must both be provided",
            )),
            CredentialSource::User(user_id) => Ok(self.resolver.resolve(&user_id).await?),
        }
    }

    pub(crate) async fn authenticated(
        &self,
        exchange: &str,
        source: CredentialSource,
    ) -> Result<(SharedClient, Credentials), GatewayError> {
        let credentials = self.resolve(source).await?;
        let client = self.create_client(exchange, Some(credentials.clone())).await?;
        Ok((client, credentials))
    }

    /// Run one delegated call under the gateway timeout.
    pub(crate) async fn call<T, F>(
        &self,
        client: &SharedClient,
        credentials: Option<&Credentials>,
        action: Action,
        request: F,
    ) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, ExchangeError>>,
    {
        let exchange = client.id().to_string();
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if e.invalidates_client() {
                    self.evict(&exchange, credentials).await;
                }
                let e = match credentials {
                    Some(creds) => e.map_message(|m| creds.scrub(&m)),
                    None => e,
                };
                Err(action.into_error(exchange, e))
            }
            Err(_) => {
                self.evict(&exchange, credentials).await;
                Err(GatewayError::Timeout {
                    exchange,
                    action: action.describe(),
                    timeout_ms: self.timeout.as_millis(),
                })
            }
        }
    }

    async fn evict(&self, exchange: &str, credentials: Option<&Credentials>) {
        if let Some(cache) = &self.cache {
            cache.remove(&cache_key(exchange, credentials)).await;
        }
    }
}
