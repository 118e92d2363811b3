use reqwest::StatusCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Main error type for the OpenRouter client.
///
/// The set of variants is closed: every failed call surfaces exactly one of
/// these, so callers never need to look at raw HTTP status codes.
#[derive(Error, Debug)]
pub enum ModelError {
    /// Invalid or missing client configuration, raised at construction
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credential rejected by the provider (HTTP 401)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Rate limit still hit after all attempts were used
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout, connection failure or server error after all attempts were used
    #[error("network error: {0}")]
    Network(String),

    /// Malformed request, malformed response or unusable model output
    #[error("validation error: {0}")]
    Validation(String),

    /// Any other non-success status returned by the provider
    #[error("API error {status}: {message}")]
    Api { status: StatusCode, message: String },
}

/// Machine-readable code attached to every [`ModelError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ConfigError,
    AuthError,
    RateLimit,
    NetworkError,
    ValidationError,
    ApiError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigError => "CONFIG_ERROR",
            ErrorCode::AuthError => "AUTH_ERROR",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::ApiError => "API_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment variable error
#[derive(Debug)]
pub struct EnvVarError {
    /// Name of the environment variable that is missing
    pub var: String,
    /// Optional instructions to help the user get a valid value
    pub instructions: Option<String>,
}

impl fmt::Display for EnvVarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing environment variable: `{}`", self.var)?;
        if let Some(instructions) = &self.instructions {
            write!(f, ". {}", instructions)?;
        }
        Ok(())
    }
}

impl std::error::Error for EnvVarError {}

impl From<EnvVarError> for ModelError {
    fn from(err: EnvVarError) -> Self {
        ModelError::Configuration(err.to_string())
    }
}

impl ModelError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::Configuration(_) => ErrorCode::ConfigError,
            ModelError::Authentication(_) => ErrorCode::AuthError,
            ModelError::RateLimit(_) => ErrorCode::RateLimit,
            ModelError::Network(_) => ErrorCode::NetworkError,
            ModelError::Validation(_) => ErrorCode::ValidationError,
            ModelError::Api { .. } => ErrorCode::ApiError,
        }
    }

    /// Whether the user may reasonably try the same call again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, ModelError::RateLimit(_) | ModelError::Network(_))
    }

    /// Check if the error is a client-side problem (bad config, bad input, bad key)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ModelError::Configuration(_) | ModelError::Authentication(_) | ModelError::Validation(_)
        )
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            ModelError::Authentication(_) => Some(StatusCode::UNAUTHORIZED),
            ModelError::RateLimit(_) => Some(StatusCode::TOO_MANY_REQUESTS),
            ModelError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        ModelError::Validation(message.into())
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        ModelError::Configuration(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_rate_limit_and_network_are_retryable() {
        assert!(ModelError::RateLimit("slow down".into()).is_retryable());
        assert!(ModelError::Network("reset".into()).is_retryable());
        assert!(!ModelError::Authentication("bad key".into()).is_retryable());
        assert!(!ModelError::Validation("empty".into()).is_retryable());
        assert!(!ModelError::Configuration("no key".into()).is_retryable());
        let api = ModelError::Api {
            status: StatusCode::BAD_REQUEST,
            message: "bad".into(),
        };
        assert!(!api.is_retryable());
    }

    #[test]
    fn codes_and_status() {
        let api = ModelError::Api {
            status: StatusCode::NOT_FOUND,
            message: "no such model".into(),
        };
        assert_eq!(api.code().as_str(), "API_ERROR");
        assert_eq!(api.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(api.to_string(), "API error 404 Not Found: no such model");
        assert_eq!(ModelError::Network("x".into()).status_code(), None);
        assert_eq!(
            serde_json::to_string(&ErrorCode::RateLimit).unwrap(),
            "\"RATE_LIMIT\""
        );
    }

    #[test]
    fn env_var_error_becomes_configuration_error() {
        let err: ModelError = EnvVarError {
            var: "OPENROUTER_API_KEY".into(),
            instructions: Some("Set it in your .env file".into()),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::ConfigError);
        assert_eq!(
            err.to_string(),
            "configuration error: Missing environment variable: `OPENROUTER_API_KEY`. Set it in your .env file"
        );
    }
}
