//! OpenRouter chat-completion client that turns study material into flashcard proposals.
//!
//! The client validates its configuration up front, builds a fresh payload for
//! every call, retries transient failures with exponential backoff and checks
//! the provider's reply before the flashcard parser sees it.

pub mod client;
pub mod config;
pub mod error;
pub mod flashcards;
pub mod generation;
pub mod models;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use client::OpenRouterClient;
pub use config::{ClientConfig, ModelParameters, ResolvedConfig};
pub use error::{ErrorCode, ModelError, ModelResult};
pub use flashcards::{generate_flashcards_from_text, FlashcardGenerator, FlashcardProposal, ProposalSource};
pub use generation::{GenerationOutcome, GenerationService, GenerationStore, InMemoryGenerationStore};
pub use models::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
pub use request::PromptRequest;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use transport::{ReqwestTransport, Transport};
pub use types::{RequestId, TokenUsage};

/// Initialize the logging system
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
