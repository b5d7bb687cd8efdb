use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::logging::{RequestLogger, SharedLogger};
use crate::relay::{self, ByteStream, DisconnectGuard};
use crate::translate::inbound_types::InboundChatRequest;
use crate::translate::request::build_upstream_request;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub config: RelayConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    /// Upstream credential, resolved once at startup.
    pub api_key: Option<String>,
}

impl AppState {
    pub fn new(
        config: RelayConfig,
        client: reqwest::Client,
        logger: SharedLogger,
        api_key: Option<String>,
    ) -> Self {
        Self {
            config,
            client,
            logger,
            api_key,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `POST /chat`: validate, reshape, and relay one chat turn.
///
/// If the caller goes away, axum drops this future and with it the pending
/// upstream request.
pub async fn handle_chat(State(state): State<Arc<AppState>>, body: Body) -> Response {
    let logger = state.logger.for_request();
    let mut guard = DisconnectGuard::new(logger.clone(), "while sending request");

    let response = match relay_chat(&state, body, &logger, &mut guard).await {
        Ok(stream) => event_stream_response(stream),
        Err(e) => e.into_response(),
    };

    guard.disarm();
    response
}

async fn relay_chat(
    state: &AppState,
    body: Body,
    logger: &RequestLogger,
    guard: &mut DisconnectGuard,
) -> Result<ByteStream> {
    let raw = read_body(body, state.config.body_limit_bytes)
        .await
        .map_err(|e| {
            logger.error("server", format!("Failed to read request body: {}", e));
            e
        })?;

    if raw.is_empty() {
        logger.warn("server", "Request body is empty");
        return Err(RelayError::bad_request("Request body is empty."));
    }

    let value: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| {
        logger.error("server", format!("Failed to parse body JSON: {}", e));
        RelayError::bad_request("Invalid JSON format.")
    })?;

    let Some(api_key) = state.api_key.as_deref() else {
        logger.error(
            "server",
            format!(
                "{} not set, refusing to call upstream",
                state.config.upstream.api_key_env
            ),
        );
        return Err(RelayError::misconfigured(
            "API key is not configured on the server.",
        ));
    };

    let req = InboundChatRequest::from_value(value);
    if !req.has_required_fields() {
        logger.warn("server", "Missing character or userMessage");
        return Err(RelayError::bad_request(
            "Character data and a message are required.",
        ));
    }

    let upstream_req =
        build_upstream_request(&req, &state.config.upstream.default_model).map_err(|e| {
            logger.error("server", format!("Error processing the request: {}", e));
            e
        })?;

    logger.info(
        "server",
        format!(
            "Request: model={} messages={} bytes={}",
            upstream_req.model,
            upstream_req.messages.len(),
            raw.len()
        ),
    );

    guard.enter("before upstream responded");
    relay::dispatch_streaming(
        &upstream_req,
        &state.config.upstream,
        &state.client,
        api_key,
        logger,
    )
    .await
}

/// Buffer the whole request body, up to `limit` bytes.
async fn read_body(body: Body, limit: usize) -> Result<Bytes> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner
            .downcast_ref::<http_body_util::LengthLimitError>()
            .is_some()
        {
            RelayError::PayloadTooLarge { limit }
        } else {
            RelayError::transport(inner.to_string())
        }
    })
}

fn event_stream_response(stream: ByteStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
