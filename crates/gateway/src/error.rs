use tradegate_core::{CredentialError, ExchangeError, ParseError};

/// Failures surfaced to gateway callers.
///
/// Messages never contain credentials: upstream text is scrubbed before it
/// is wrapped here.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unsupported exchange: {exchange}")]
    UnsupportedExchange { exchange: String },

    #[error("{exchange} initialization failed: {reason}")]
    InitializationFailure { exchange: String, reason: String },

    #[error("{0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{exchange} failed to {action}: {source}")]
    Fetch {
        exchange: String,
        action: &'static str,
        source: ExchangeError,
    },

    #[error("{exchange} failed to {action}: {source}")]
    Order {
        exchange: String,
        action: &'static str,
        source: ExchangeError,
    },

    #[error("{exchange} failed to {action}: {source}")]
    Cancel {
        exchange: String,
        action: &'static str,
        source: ExchangeError,
    },

    #[error("{exchange} timed out after {timeout_ms}ms trying to {action}")]
    Timeout {
        exchange: String,
        action: &'static str,
        timeout_ms: u128,
    },
}

impl GatewayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::UnsupportedExchange { .. } => "UNSUPPORTED_EXCHANGE",
            GatewayError::InitializationFailure { .. } => "INITIALIZATION_FAILURE",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::InvalidRequest(_) => "INVALID_REQUEST",
            GatewayError::Fetch { .. } => "FETCH_ERROR",
            GatewayError::Order { .. } => "ORDER_ERROR",
            GatewayError::Cancel { .. } => "CANCEL_ERROR",
            GatewayError::Timeout { .. } => "TIMEOUT",
        }
    }

    /// The venue error behind this failure, if any.
    pub fn upstream(&self) -> Option<&ExchangeError> {
        match self {
            GatewayError::Fetch { source, .. }
            | GatewayError::Order { source, .. }
            | GatewayError::Cancel { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GatewayError::InvalidRequest(message.into())
    }
}

impl From<ParseError> for GatewayError {
    fn from(e: ParseError) -> Self {
        GatewayError::InvalidRequest(e.to_string())
    }
}

impl From<CredentialError> for GatewayError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::NotFound(_) => GatewayError::NotFound(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = GatewayError::Fetch {
            exchange: "binance".to_string(),
            action: "fetch price",
            source: ExchangeError::BadSymbol("market FOO/BAR not listed".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "binance failed to fetch price: bad symbol: market FOO/BAR not listed"
        );
        assert_eq!(err.code(), "FETCH_ERROR");
        assert!(err.upstream().is_some());

        let err: GatewayError = CredentialError::NotFound("ghost".to_string()).into();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(err.to_string().contains("ghost"));
    }
}
