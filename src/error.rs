//! Error types for the relay.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("{message}")]
    ServerMisconfigured { message: String },

    /// Non-success status from upstream. Status and body are relayed verbatim.
    #[error("Upstream returned status {status}")]
    Upstream { status: u16, body: Bytes },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("{message}")]
    Processing { message: String },

    /// Failure after the event stream has started; can only be logged.
    #[error("Stream error: {message}")]
    Stream { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RelayError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest {
            message: msg.into(),
        }
    }

    pub fn misconfigured(msg: impl Into<String>) -> Self {
        Self::ServerMisconfigured {
            message: msg.into(),
        }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
        }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self::Processing {
            message: msg.into(),
        }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `{ "error": ... }` body sent to the caller.
    fn client_message(&self) -> String {
        match self {
            Self::PayloadTooLarge { .. } => "Request body is too large.".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::Upstream { body, .. } => Response::builder()
                .status(status)
                .body(Body::from(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
            other => {
                let body = ErrorBody {
                    error: other.client_message(),
                };
                (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
