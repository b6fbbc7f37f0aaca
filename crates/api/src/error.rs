use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tradegate_core::ParseError;
use tradegate_gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The request could not be decoded into the expected parameters.
    #[error("invalid request: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: String,
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Gateway(e) => e.code(),
            ApiError::Rejected(_) => "INVALID_REQUEST",
        }
    }

    /// Unknown users are 404, everything else the caller can fix is 400.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Gateway(GatewayError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(e: ParseError) -> Self {
        ApiError::Gateway(e.into())
    }
}

/// Request fields whose values must never reach a response or a log line.
const CREDENTIAL_FIELDS: [&str; 2] = ["api_key", "api_secret"];

// Deserializer errors quote the offending value, so a rejection that
// points at a credential field is replaced wholesale.
fn redact_rejection(text: String) -> String {
    if CREDENTIAL_FIELDS.iter().any(|field| text.contains(field)) {
        "api_key and api_secret must be strings".to_string()
    } else {
        text
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected(redact_rejection(rejection.body_text()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(redact_rejection(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        tracing::warn!(status = status.as_u16(), code, error = %self, "Request failed");

        let body = Json(ErrorResponse {
            detail: self.to_string(),
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}
