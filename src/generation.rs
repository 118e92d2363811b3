//! Generation orchestration: input checks, timing, and hand-off of metadata
//! and error-audit records to a [`GenerationStore`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::ModelError;
use crate::flashcards::{FlashcardGenerator, FlashcardProposal};

pub const MIN_SOURCE_TEXT_CHARS: usize = 1000;
pub const MAX_SOURCE_TEXT_CHARS: usize = 10_000;

pub const GENERATION_FAILED: &str = "GENERATION_FAILED";

/// Identifier assigned by the store to a saved generation.
pub type GenerationId = i64;

#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StoreError(pub String);

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("invalid source text: {0}")]
    InvalidSourceText(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl GenerationError {
    pub fn code(&self) -> &'static str {
        match self {
            GenerationError::InvalidSourceText(_) => "INVALID_SOURCE_TEXT",
            GenerationError::Model(e) => e.code().as_str(),
            GenerationError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

/// Metadata of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub user_id: String,
    pub model: String,
    pub source_text_length: usize,
    pub source_text_hash: String,
    pub generated_count: usize,
    pub generation_duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Audit entry for a failed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationErrorRecord {
    pub user_id: String,
    pub error_code: String,
    pub error_message: String,
    pub model: String,
    pub source_text_length: usize,
    pub source_text_hash: String,
    pub created_at: DateTime<Utc>,
}

/// What the caller gets back after a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub generation_id: GenerationId,
    pub flashcards_proposals: Vec<FlashcardProposal>,
    pub generated_count: usize,
}

/// Persistence seam for generation metadata.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn save_generation(&self, record: &GenerationRecord) -> Result<GenerationId, StoreError>;

    async fn log_generation_error(&self, record: &GenerationErrorRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryGenerationStore {
    next_id: AtomicI64,
    generations: Mutex<Vec<(GenerationId, GenerationRecord)>>,
    errors: Mutex<Vec<GenerationErrorRecord>>,
}

impl InMemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn generations(&self) -> Vec<(GenerationId, GenerationRecord)> {
        self.generations.lock().await.clone()
    }

    pub async fn errors(&self) -> Vec<GenerationErrorRecord> {
        self.errors.lock().await.clone()
    }
}

#[async_trait]
impl GenerationStore for InMemoryGenerationStore {
    async fn save_generation(&self, record: &GenerationRecord) -> Result<GenerationId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.generations.lock().await.push((id, record.clone()));
        Ok(id)
    }

    async fn log_generation_error(&self, record: &GenerationErrorRecord) -> Result<(), StoreError> {
        self.errors.lock().await.push(record.clone());
        Ok(())
    }
}

/// Hex SHA-256 of the source text, used to spot repeated submissions.
pub fn source_text_hash(source_text: &str) -> String {
    format!("{:x}", Sha256::digest(source_text.as_bytes()))
}

pub fn validate_source_text(source_text: &str) -> Result<(), GenerationError> {
    let length = source_text.chars().count();
    if length < MIN_SOURCE_TEXT_CHARS {
        return Err(GenerationError::InvalidSourceText(format!(
            "source text must be at least {} characters, got {}",
            MIN_SOURCE_TEXT_CHARS, length
        )));
    }
    if length > MAX_SOURCE_TEXT_CHARS {
        return Err(GenerationError::InvalidSourceText(format!(
            "source text must not exceed {} characters, got {}",
            MAX_SOURCE_TEXT_CHARS, length
        )));
    }
    Ok(())
}

pub struct GenerationService {
    generator: FlashcardGenerator,
    store: Arc<dyn GenerationStore>,
}

impl GenerationService {
    pub fn new(generator: FlashcardGenerator, store: Arc<dyn GenerationStore>) -> Self {
        Self { generator, store }
    }

    /// Generate proposals for `user_id` and record the generation.
    ///
    /// Failures after input validation are written to the error audit log; a
    /// failing audit write is logged and the original error is returned.
    pub async fn generate(
        &self,
        user_id: &str,
        source_text: &str,
    ) -> Result<GenerationOutcome, GenerationError> {
        validate_source_text(source_text)?;

        let model = self.generator.client().config().default_model().to_string();
        let source_text_hash = source_text_hash(source_text);
        let source_text_length = source_text.chars().count();
        info!(
            user_id,
            source_text_length,
            source_text_hash = %source_text_hash,
            "generation started"
        );

        match self
            .run(user_id, source_text, &model, &source_text_hash, source_text_length)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                error!(user_id, code = err.code(), error = %err, "generation failed");
                let record = GenerationErrorRecord {
                    user_id: user_id.to_string(),
                    error_code: GENERATION_FAILED.to_string(),
                    error_message: err.to_string(),
                    model,
                    source_text_length,
                    source_text_hash,
                    created_at: Utc::now(),
                };
                if let Err(log_err) = self.store.log_generation_error(&record).await {
                    warn!(error = %log_err, "failed to record generation error");
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        user_id: &str,
        source_text: &str,
        model: &str,
        source_text_hash: &str,
        source_text_length: usize,
    ) -> Result<GenerationOutcome, GenerationError> {
        let start = Instant::now();
        let proposals = self.generator.generate_from_text(source_text, None).await?;
        let generation_duration_ms = start.elapsed().as_millis() as u64;

        let record = GenerationRecord {
            user_id: user_id.to_string(),
            model: model.to_string(),
            source_text_length,
            source_text_hash: source_text_hash.to_string(),
            generated_count: proposals.len(),
            generation_duration_ms,
            created_at: Utc::now(),
        };
        let generation_id = self.store.save_generation(&record).await?;
        info!(generation_id, generated_count = proposals.len(), "generation saved");

        Ok(GenerationOutcome {
            generation_id,
            generated_count: proposals.len(),
            flashcards_proposals: proposals,
        })
    }
}
