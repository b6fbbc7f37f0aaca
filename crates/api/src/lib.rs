pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tradegate_gateway::ExchangeGateway;

/// Build the Axum application router.
///
/// Market data lives under `/market`, trading under `/trade`, and the same
/// handlers are also served unprefixed for older clients.
pub fn build_router(gateway: ExchangeGateway) -> Router {
    let app_state = Arc::new(state::AppState::new(gateway));

    Router::new()
        .merge(routes::service_routes())
        .nest("/market", routes::market_routes())
        .nest("/trade", routes::trade_routes())
        .merge(routes::legacy_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the API server.
pub async fn start_server(gateway: ExchangeGateway, bind_addr: &str) -> anyhow::Result<()> {
    let app = build_router(gateway);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("API server listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
