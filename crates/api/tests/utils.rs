use std::sync::Arc;
use tradegate_connectors_common::{PaperConfig, PaperVenue, PAPER_EXCHANGE_ID};
use tradegate_gateway::{
    ExchangeGateway, ExchangeRegistry, GatewaySettings, StaticCredentialResolver,
};

/// Handle to a running test server backed by the paper venue.
#[allow(dead_code)]
pub struct TestServer {
    pub base_url: String,
    pub venue: PaperVenue,
    client: reqwest::Client,
    _shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

#[allow(dead_code)]
impl TestServer {
    /// Start the full router on a random available port.
    ///
    /// The server shuts down when the handle is dropped.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(GatewaySettings::default()).await
    }

    pub async fn start_with(settings: GatewaySettings) -> anyhow::Result<Self> {
        let venue = PaperVenue::new(PaperConfig::default());
        let mut registry = ExchangeRegistry::new();
        registry.register(PAPER_EXCHANGE_ID, venue.clone());
        let gateway = ExchangeGateway::new(
            registry,
            Arc::new(StaticCredentialResolver::stub()),
            &settings,
        );
        let app = tradegate_api::build_router(gateway);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed to start");
        });

        Ok(Self {
            base_url: format!("http://{}", addr),
            venue,
            client: reqwest::Client::new(),
            _shutdown_tx: shutdown_tx,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }
}
