use crate::config::{ClientConfig, ResolvedConfig};
use crate::error::ModelResult;
use crate::models::{ChatRequest, ChatResponse};
use crate::request::PromptRequest;
use crate::response::{decode_response, extract_content};
use crate::retry::{classify, with_retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::transport::{OutboundRequest, ReqwestTransport, Transport};
use crate::types::RequestId;
use metrics::{counter, decrement_gauge, histogram, increment_gauge};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Chat-completion client for OpenRouter-compatible endpoints.
///
/// Holds only validated configuration and shared handles; every call takes
/// its own [`PromptRequest`], so one client can be shared across tasks.
#[derive(Clone)]
pub struct OpenRouterClient {
    config: ResolvedConfig,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
}

impl OpenRouterClient {
    /// Validate `config` (with environment fallback) and build a client.
    pub fn new(config: &ClientConfig) -> ModelResult<Self> {
        Ok(Self::from_resolved(config.resolve()?))
    }

    pub fn from_resolved(config: ResolvedConfig) -> Self {
        Self {
            retry: RetryPolicy::new(config.max_retries()),
            config,
            transport: Arc::new(ReqwestTransport::new()),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replace the backoff schedule. The attempt count stays the configured one.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryPolicy {
            max_attempts: self.config.max_retries(),
            ..policy
        };
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Send `request` and return the text of the first choice.
    pub async fn send(&self, request: &PromptRequest) -> ModelResult<String> {
        let response = self.chat(request).await?;
        extract_content(&response)
    }

    /// Send `request` and return the decoded response.
    pub async fn chat(&self, request: &PromptRequest) -> ModelResult<ChatResponse> {
        let payload = request.build_payload(&self.config)?;
        let span = info_span!(
            "openrouter_request",
            request_id = %RequestId::new(),
            model = %payload.model
        );
        self.execute(&payload).instrument(span).await
    }

    async fn execute(&self, payload: &ChatRequest) -> ModelResult<ChatResponse> {
        let model = payload.model.clone();
        increment_gauge!("llm_inflight_requests", 1.0);
        let start = Instant::now();

        let result = self.execute_with_retry(payload).await;

        histogram!("llm_request_latency_seconds", start.elapsed().as_secs_f64(), "model" => model.clone());
        decrement_gauge!("llm_inflight_requests", 1.0);
        match &result {
            Ok(response) => {
                counter!("llm_requests_total", 1, "result" => "success");
                if let Some(usage) = &response.usage {
                    counter!("llm_prompt_tokens_total", usage.prompt_tokens as u64, "model" => model.clone());
                    counter!("llm_completion_tokens_total", usage.completion_tokens as u64, "model" => model.clone());
                }
                info!(
                    tokens_used = response.usage.as_ref().map(|u| u.total_tokens),
                    "API response received"
                );
            }
            Err(e) => {
                counter!("llm_requests_total", 1, "result" => "error", "code" => e.code().as_str());
            }
        }
        result
    }

    async fn execute_with_retry(&self, payload: &ChatRequest) -> ModelResult<ChatResponse> {
        let max_attempts = self.retry.max_attempts;
        let body = with_retry(&self.retry, self.sleeper.as_ref(), classify, |attempt| async move {
            info!(
                attempt,
                max_attempts,
                messages = payload.messages.len(),
                "API request attempt"
            );
            let reply = self
                .transport
                .post(OutboundRequest {
                    url: self.config.api_url(),
                    api_key: self.config.api_key(),
                    payload,
                    timeout: self.config.timeout(),
                })
                .await?;
            reply.into_body()
        })
        .await?;

        decode_response(&body)
    }
}

impl std::fmt::Debug for OpenRouterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterClient")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
