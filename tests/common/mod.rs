#![allow(dead_code)]

use async_trait::async_trait;
use flashcard_ai_client::{ClientConfig, OpenRouterClient, Sleeper};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const API_PATH: &str = "/api/v1/chat/completions";
pub const TEST_MODEL: &str = "openai/gpt-4o-mini";

/// Fake clock: records every requested delay and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("lock").push(duration);
    }
}

pub fn test_config(base_uri: &str) -> ClientConfig {
    ClientConfig::default()
        .with_api_key("test-api-key")
        .with_api_url(format!("{}{}", base_uri, API_PATH))
        .with_default_model(TEST_MODEL)
}

pub fn test_client(config: ClientConfig) -> (OpenRouterClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = OpenRouterClient::new(&config)
        .expect("valid config")
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

pub fn completion(content: &str) -> Value {
    json!({
        "id": "gen-123",
        "model": TEST_MODEL,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21}
    })
}

pub fn error_body(message: &str) -> Value {
    json!({"error": {"message": message, "code": 400}})
}
