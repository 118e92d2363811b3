use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use crate::error::{EnvVarError, ModelError, ModelResult};

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const API_URL_ENV: &str = "OPENROUTER_API_URL";
pub const MODEL_ENV: &str = "OPENROUTER_MODEL";

pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Sampling parameters sent with every chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelParameters {
    /// Values used when neither the config nor the call sets a parameter.
    pub fn defaults() -> Self {
        Self {
            temperature: Some(0.7),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
            max_tokens: Some(2000),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Shallow merge: every parameter set in `overrides` wins.
    pub fn merged_with(&self, overrides: &ModelParameters) -> ModelParameters {
        ModelParameters {
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            frequency_penalty: overrides.frequency_penalty.or(self.frequency_penalty),
            presence_penalty: overrides.presence_penalty.or(self.presence_penalty),
            max_tokens: overrides.max_tokens.or(self.max_tokens),
        }
    }

    /// Returns a description of the first out-of-range parameter.
    pub fn check_ranges(&self) -> Result<(), String> {
        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        if self.max_tokens == Some(0) {
            return Err("max_tokens must be a positive integer".to_string());
        }
        Ok(())
    }
}

fn check_range(name: &str, value: Option<f32>, min: f32, max: f32) -> Result<(), String> {
    match value {
        Some(v) if !(min..=max).contains(&v) => {
            Err(format!("{} must be between {} and {}, got {}", name, min, max, v))
        }
        _ => Ok(()),
    }
}

/// Partial client configuration as supplied by the caller or a config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub default_model_parameters: Option<ModelParameters>,
}

impl ClientConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_default_model_parameters(mut self, parameters: ModelParameters) -> Self {
        self.default_model_parameters = Some(parameters);
        self
    }

    /// Validate against the process environment.
    pub fn resolve(&self) -> ModelResult<ResolvedConfig> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Validate, filling absent fields from `lookup` and then from defaults.
    ///
    /// Fails on the first invalid field; no network I/O happens here.
    pub fn resolve_with<F>(&self, lookup: F) -> ModelResult<ResolvedConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

        let api_key = non_blank(self.api_key.clone())
            .or_else(|| non_blank(lookup(API_KEY_ENV)))
            .ok_or_else(|| {
                error!(field = "api_key", "client configuration rejected");
                ModelError::from(EnvVarError {
                    var: API_KEY_ENV.to_string(),
                    instructions: Some(
                        "Pass an API key explicitly or set OPENROUTER_API_KEY in the environment"
                            .to_string(),
                    ),
                })
            })?;

        let raw_url = self
            .api_url
            .clone()
            .or_else(|| non_blank(lookup(API_URL_ENV)))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = parse_api_url(&raw_url)?;

        let timeout_ms = self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(ModelError::configuration("timeout_ms must be a positive integer"));
        }

        let max_retries = self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            return Err(ModelError::configuration("max_retries must be a positive integer"));
        }

        let default_model = match &self.default_model {
            Some(model) if model.trim().is_empty() => {
                return Err(ModelError::configuration("default_model must not be empty"));
            }
            Some(model) => model.clone(),
            None => non_blank(lookup(MODEL_ENV)).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        if let Some(overrides) = &self.default_model_parameters {
            overrides
                .check_ranges()
                .map_err(|msg| ModelError::configuration(format!("default_model_parameters: {}", msg)))?;
        }
        let default_model_parameters = ModelParameters::defaults()
            .merged_with(self.default_model_parameters.as_ref().unwrap_or(&ModelParameters::default()));

        debug!(
            api_url = %api_url,
            timeout_ms,
            max_retries,
            model = %default_model,
            "client configuration resolved"
        );

        Ok(ResolvedConfig {
            api_key,
            api_url,
            timeout: Duration::from_millis(timeout_ms),
            max_retries,
            default_model,
            default_model_parameters,
        })
    }
}

fn parse_api_url(raw: &str) -> ModelResult<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ModelError::configuration(format!("api_url `{}` is not a valid URL: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ModelError::configuration(format!(
            "api_url must use http or https, got `{}`",
            other
        ))),
    }
}

/// Fully populated and validated configuration. Only obtainable through
/// [`ClientConfig::resolve`], so holding one means the invariants hold.
#[derive(Clone)]
pub struct ResolvedConfig {
    api_key: String,
    api_url: Url,
    timeout: Duration,
    max_retries: u32,
    default_model: String,
    default_model_parameters: ModelParameters,
}

impl ResolvedConfig {
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Total number of attempts per call, including the first one
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn default_model_parameters(&self) -> &ModelParameters {
        &self.default_model_parameters
    }
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url.as_str())
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("default_model", &self.default_model)
            .field("default_model_parameters", &self.default_model_parameters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn missing_key_everywhere_is_a_configuration_error() {
        let err = ClientConfig::default().resolve_with(no_env).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigError);
        assert!(err.to_string().contains(API_KEY_ENV));

        let blank = ClientConfig::default()
            .with_api_key("   ")
            .resolve_with(|_| Some(String::new()))
            .unwrap_err();
        assert_eq!(blank.code(), ErrorCode::ConfigError);
    }

    #[test]
    fn explicit_key_wins_over_environment() {
        let config = ClientConfig::default()
            .with_api_key("explicit")
            .resolve_with(|_| Some("from-env".to_string()))
            .unwrap();
        assert_eq!(config.api_key(), "explicit");

        let config = ClientConfig::default()
            .resolve_with(|name| (name == API_KEY_ENV).then(|| "from-env".to_string()))
            .unwrap();
        assert_eq!(config.api_key(), "from-env");
    }

    #[test]
    fn defaults_are_applied() {
        let config = ClientConfig::default().with_api_key("k").resolve_with(no_env).unwrap();
        assert_eq!(config.api_url().as_str(), DEFAULT_API_URL);
        assert_eq!(config.timeout(), Duration::from_millis(30_000));
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.default_model(), DEFAULT_MODEL);
        assert_eq!(config.default_model_parameters(), &ModelParameters::defaults());
    }

    #[test]
    fn environment_overrides_url_and_model_only_when_absent() {
        let env = |name: &str| match name {
            API_URL_ENV => Some("http://localhost:9000/v1/chat/completions".to_string()),
            MODEL_ENV => Some("anthropic/claude-3.5-haiku".to_string()),
            _ => None,
        };
        let config = ClientConfig::default().with_api_key("k").resolve_with(env).unwrap();
        assert_eq!(config.api_url().as_str(), "http://localhost:9000/v1/chat/completions");
        assert_eq!(config.default_model(), "anthropic/claude-3.5-haiku");

        let config = ClientConfig::default()
            .with_api_key("k")
            .with_default_model("openai/gpt-4o")
            .resolve_with(env)
            .unwrap();
        assert_eq!(config.default_model(), "openai/gpt-4o");
    }

    #[test]
    fn rejects_bad_url_timeout_and_retries() {
        let base = ClientConfig::default().with_api_key("k");
        for config in [
            base.clone().with_api_url("not a url"),
            base.clone().with_api_url("ftp://example.com/chat"),
            base.clone().with_timeout_ms(0),
            base.clone().with_max_retries(0),
            base.clone().with_default_model(" "),
        ] {
            let err = config.resolve_with(no_env).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ConfigError, "{}", err);
        }
    }

    #[test]
    fn out_of_range_default_parameters_fail_construction() {
        let cases = [
            ModelParameters::default().with_temperature(2.5),
            ModelParameters::default().with_temperature(-0.1),
            ModelParameters::default().with_top_p(1.5),
            ModelParameters {
                frequency_penalty: Some(-3.0),
                ..Default::default()
            },
            ModelParameters {
                presence_penalty: Some(2.1),
                ..Default::default()
            },
            ModelParameters::default().with_max_tokens(0),
            ModelParameters::default().with_temperature(f32::NAN),
        ];
        for parameters in cases {
            let err = ClientConfig::default()
                .with_api_key("k")
                .with_default_model_parameters(parameters.clone())
                .resolve_with(no_env)
                .unwrap_err();
            assert_eq!(err.code(), ErrorCode::ConfigError, "{:?}", parameters);
        }
    }

    #[test]
    fn parameters_merge_shallowly() {
        let merged = ModelParameters::defaults()
            .merged_with(&ModelParameters::default().with_temperature(0.2).with_max_tokens(50));
        assert_eq!(merged.temperature, Some(0.2));
        assert_eq!(merged.max_tokens, Some(50));
        assert_eq!(merged.top_p, Some(1.0));
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = ClientConfig::default().with_api_key("sk-secret").resolve_with(no_env).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn loads_from_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api_key": "k", "max_retries": 5, "default_model_parameters": {"temperature": 0.1}}"#,
        )
        .unwrap();
        let resolved = config.resolve_with(no_env).unwrap();
        assert_eq!(resolved.max_retries(), 5);
        assert_eq!(resolved.default_model_parameters().temperature, Some(0.1));
        assert_eq!(resolved.default_model_parameters().max_tokens, Some(2000));
    }
}
