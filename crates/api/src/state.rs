use tradegate_gateway::ExchangeGateway;

/// Shared application state accessible by all route handlers.
pub struct AppState {
    pub gateway: ExchangeGateway,
}

impl AppState {
    pub fn new(gateway: ExchangeGateway) -> Self {
        Self { gateway }
    }
}
