use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

use crate::models::ChatRequest;
use crate::retry::AttemptError;

/// Attribution headers OpenRouter uses to identify the calling application
pub const DEFAULT_REFERER: &str = "https://10xcards.app";
pub const DEFAULT_TITLE: &str = "10xCards";

/// Failure below the HTTP layer. Always transient.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),
}

/// One POST of a chat-completion payload.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRequest<'a> {
    pub url: &'a Url,
    pub api_key: &'a str,
    pub payload: &'a ChatRequest,
    pub timeout: Duration,
}

/// Raw status and body of a provider reply.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    /// Success bodies pass through; other statuses become [`AttemptError::Status`]
    /// carrying the provider's message.
    pub fn into_body(self) -> Result<String, AttemptError> {
        if self.status.is_success() {
            return Ok(self.body);
        }
        let message = provider_error_message(&self.body);
        warn!(status = %self.status, message = %message, "API error response");
        Err(AttemptError::Status {
            status: self.status,
            message,
        })
    }
}

/// Pull a human-readable message out of a provider error body.
pub fn provider_error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .or_else(|| value.get("error").filter(|e| e.is_string()))
                .or_else(|| value.get("message"))
        })
        .and_then(Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown error".to_string())
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one attempt, bounded by `request.timeout`.
    async fn post(&self, request: OutboundRequest<'_>) -> Result<HttpReply, TransportFailure>;
}

/// [`Transport`] backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    client: Client,
    referer: String,
    title: String,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("flashcard-ai-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                Client::new()
            });
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            referer: DEFAULT_REFERER.to_string(),
            title: DEFAULT_TITLE.to_string(),
        }
    }

    pub fn with_attribution(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: OutboundRequest<'_>) -> Result<HttpReply, TransportFailure> {
        let exchange = async {
            let resp = self
                .client
                .post(request.url.clone())
                .bearer_auth(request.api_key)
                .header(CONTENT_TYPE, "application/json")
                .header("HTTP-Referer", &self.referer)
                .header("X-Title", &self.title)
                .json(request.payload)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>(HttpReply { status, body })
        };

        match tokio::time::timeout(request.timeout, exchange).await {
            Ok(Ok(reply)) => {
                debug!(status = %reply.status, body_len = reply.body.len(), "response received");
                Ok(reply)
            }
            Ok(Err(e)) if e.is_timeout() => Err(TransportFailure::Timeout(request.timeout)),
            Ok(Err(e)) => Err(TransportFailure::Connection(e.to_string())),
            Err(_) => Err(TransportFailure::Timeout(request.timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_provider_messages() {
        assert_eq!(
            provider_error_message(r#"{"error": {"message": "No such model", "code": 404}}"#),
            "No such model"
        );
        assert_eq!(provider_error_message(r#"{"error": "quota"}"#), "quota");
        assert_eq!(provider_error_message(r#"{"message": "bad input"}"#), "bad input");
        assert_eq!(provider_error_message("<html>oops</html>"), "unknown error");
        assert_eq!(provider_error_message(r#"{"error": {"message": ""}}"#), "unknown error");
    }

    #[test]
    fn success_replies_pass_through() {
        let reply = HttpReply {
            status: StatusCode::OK,
            body: "{}".into(),
        };
        assert_eq!(reply.into_body().unwrap(), "{}");

        let reply = HttpReply {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error": {"message": "context too long"}}"#.into(),
        };
        match reply.into_body().unwrap_err() {
            AttemptError::Status { status, message } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(message, "context too long");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
