use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};
use crate::logging::{LogLevel, RequestLogger};
use crate::translate::openai_types::UpstreamChatRequest;

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::time::Duration;

/// Upstream body relayed to the caller unchanged.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send>>;

/// Shared client for upstream calls.
///
/// No total timeout: a streamed completion may legitimately run for minutes.
pub fn build_client(config: &UpstreamConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
}

/// Send a streaming chat request upstream.
///
/// On success the response body is returned as a byte stream. A non-success
/// status is returned as [`RelayError::Upstream`] carrying the raw error body.
pub async fn dispatch_streaming(
    req: &UpstreamChatRequest,
    config: &UpstreamConfig,
    client: &reqwest::Client,
    api_key: &str,
    logger: &RequestLogger,
) -> Result<ByteStream> {
    logger.info(
        "relay",
        format!("POST {} model={} (streaming)", config.url, req.model),
    );

    let response = client
        .post(&config.url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("HTTP-Referer", &config.referer)
        .header("X-Title", &config.title)
        .json(req)
        .send()
        .await
        .map_err(|e| {
            logger.error("relay", format!("Upstream request failed: {}", e));
            RelayError::transport(e.to_string())
        })?;

    let status = response.status();

    if !status.is_success() {
        let body = response.bytes().await.map_err(|e| {
            logger.error("relay", format!("Failed to read upstream error body: {}", e));
            RelayError::transport(e.to_string())
        })?;
        logger.log_with_context(
            LogLevel::Error,
            "relay",
            format!("Upstream error status={}", status.as_u16()),
            serde_json::json!({ "body": truncate(&String::from_utf8_lossy(&body), 500) }),
        );
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    logger.debug("relay", format!("Upstream accepted status={}", status.as_u16()));

    Ok(Box::pin(passthrough_stream(
        response.bytes_stream(),
        logger.clone(),
    )))
}

/// Forward upstream chunks as they arrive.
///
/// A read error after the first byte ends the stream quietly; the caller
/// already has a 200 and the fault can only be logged. A faulted stream is
/// never reported as completed.
fn passthrough_stream(
    byte_stream: impl Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send + 'static,
    logger: RequestLogger,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let mut guard = DisconnectGuard::new(logger.clone(), "during streaming");
        let mut total = 0usize;

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    total += chunk.len();
                    yield Ok::<Bytes, std::io::Error>(chunk);
                }
                Err(e) => {
                    guard.disarm();
                    logger.log_with_context(
                        LogLevel::Error,
                        "stream",
                        RelayError::stream(e.to_string()).to_string(),
                        serde_json::json!({ "bytes_relayed": total }),
                    );
                    return;
                }
            }
        }

        guard.disarm();
        logger.info("stream", format!("Stream completed bytes={}", total));
    }
}

/// Logs a client disconnect if dropped while still armed.
///
/// Dropping the handler future (or the response body stream) is what aborts
/// the upstream request; this only records that it happened.
pub struct DisconnectGuard {
    logger: RequestLogger,
    stage: &'static str,
    armed: bool,
}

impl DisconnectGuard {
    pub fn new(logger: RequestLogger, stage: &'static str) -> Self {
        Self {
            logger,
            stage,
            armed: true,
        }
    }

    pub fn enter(&mut self, stage: &'static str) {
        self.stage = stage;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if self.armed {
            self.logger.warn(
                "relay",
                format!(
                    "Client disconnected {}, aborting upstream request",
                    self.stage
                ),
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
