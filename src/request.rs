//! Per-call request descriptor and payload builder.
//!
//! A [`PromptRequest`] is immutable once built and owned by the caller, so a
//! single client can serve concurrent calls without sharing conversation state.

use tracing::error;

use crate::config::{ModelParameters, ResolvedConfig};
use crate::error::{ModelError, ModelResult};
use crate::models::{ChatMessage, ChatRequest, MessageRole, ResponseFormat};

/// Everything needed to build one chat-completion payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    system: Option<String>,
    user: String,
    response_format: Option<ResponseFormat>,
    model: Option<String>,
    parameters: ModelParameters,
}

impl PromptRequest {
    /// Start a request with the user message. Blank messages are rejected.
    pub fn user(message: impl Into<String>) -> ModelResult<Self> {
        let user = non_blank(message.into(), "user message")?;
        Ok(Self {
            system: None,
            user,
            response_format: None,
            model: None,
            parameters: ModelParameters::default(),
        })
    }

    pub fn with_system(mut self, message: impl Into<String>) -> ModelResult<Self> {
        self.system = Some(non_blank(message.into(), "system message")?);
        Ok(self)
    }

    /// Override the configured default model for this call only.
    pub fn with_model(mut self, model: impl Into<String>) -> ModelResult<Self> {
        self.model = Some(non_blank(model.into(), "model name")?);
        Ok(self)
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Per-call parameter overrides, merged over the configured defaults.
    pub fn with_parameters(mut self, parameters: ModelParameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn system_message(&self) -> Option<&str> {
        self.system.as_deref()
    }

    pub fn user_message(&self) -> &str {
        &self.user
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Build and self-validate the payload for this call.
    pub fn build_payload(&self, config: &ResolvedConfig) -> ModelResult<ChatRequest> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.push(ChatMessage::user(self.user.clone()));

        let model = self
            .model
            .clone()
            .unwrap_or_else(|| config.default_model().to_string());
        let parameters = config.default_model_parameters().merged_with(&self.parameters);

        let payload = ChatRequest::new(model, messages)
            .with_parameters(&parameters)
            .with_response_format(self.response_format.clone());

        validate_payload(&payload).map_err(|e| {
            error!(
                model = %payload.model,
                messages = payload.messages.len(),
                error = %e,
                "request payload failed validation"
            );
            e
        })?;
        Ok(payload)
    }
}

fn non_blank(value: String, what: &str) -> ModelResult<String> {
    if value.trim().is_empty() {
        return Err(ModelError::validation(format!("{} must not be empty", what)));
    }
    Ok(value)
}

/// Shape checks applied to every payload before it is sent.
pub fn validate_payload(payload: &ChatRequest) -> ModelResult<()> {
    if payload.model.trim().is_empty() {
        return Err(ModelError::validation("request model must not be empty"));
    }
    if payload.messages.is_empty() {
        return Err(ModelError::validation("request must contain at least one message"));
    }
    for (index, message) in payload.messages.iter().enumerate() {
        if message.content.trim().is_empty() {
            return Err(ModelError::validation(format!(
                "message {} ({:?}) has empty content",
                index, message.role
            )));
        }
    }
    if let Some(position) = payload
        .messages
        .iter()
        .position(|m| m.role == MessageRole::System)
    {
        if position != 0 {
            return Err(ModelError::validation("system message must come first"));
        }
    }

    payload
        .parameters()
        .check_ranges()
        .map_err(|msg| ModelError::validation(format!("invalid model parameters: {}", msg)))?;

    if let Some(format) = &payload.response_format {
        if format.format_type != "json_schema" {
            return Err(ModelError::validation(format!(
                "unsupported response_format type `{}`",
                format.format_type
            )));
        }
        if format.json_schema.name.trim().is_empty() {
            return Err(ModelError::validation("response_format schema name must not be empty"));
        }
        if !format.json_schema.schema.is_object() {
            return Err(ModelError::validation("response_format schema must be a JSON object"));
        }
    }
    Ok(())
}
