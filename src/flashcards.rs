//! Flashcard generation on top of [`OpenRouterClient`].
//!
//! Models do not always honour the requested schema, so the reply is matched
//! against a fixed list of shapes, first match wins:
//!
//! 1. a bare array of cards,
//! 2. an object with a `flashcards` array,
//! 3. a single `{front, back}` object,
//! 4. an object with any array-valued field.
//!
//! When the reply is not JSON or matches none of these, the first embedded
//! `{ ... "flashcards" ... }` block, then the first `[ ... ]` block, is tried.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::OpenRouterClient;
use crate::config::ClientConfig;
use crate::error::{ModelError, ModelResult};
use crate::models::ResponseFormat;
use crate::request::PromptRequest;
use crate::utils::{preview, truncate_chars};

pub const FRONT_MAX_CHARS: usize = 200;
pub const BACK_MAX_CHARS: usize = 500;

pub const FLASHCARD_SYSTEM_PROMPT: &str = "You are an expert at writing study flashcards. Analyse the text you are given and produce a set of flashcards for learning it.

Rules:
1. Every flashcard holds one specific question (front) and a concise answer (back)
2. Questions must be clear and unambiguous
3. Answers must be concise but complete
4. Focus on the most important concepts, facts, dates and relationships
5. Avoid questions that are too general or trivial
6. Front: at most 200 characters
7. Back: at most 500 characters

Produce between 3 and 10 flashcards depending on the amount of material.";

/// Where a flashcard came from. Generated proposals are always `AiFull`;
/// `AiEdited` and `Manual` let stored or user-edited cards round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProposalSource {
    AiFull,
    AiEdited,
    Manual,
}

/// An unsaved flashcard produced by the model, pending user review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashcardProposal {
    pub front: String,
    pub back: String,
    pub source: ProposalSource,
}

/// Structured-output hint asking for `{"flashcards": [{front, back}]}`.
pub fn flashcard_response_format() -> ResponseFormat {
    ResponseFormat::json_schema(
        "flashcards_response",
        json!({
            "type": "object",
            "properties": {
                "flashcards": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "front": {
                                "type": "string",
                                "description": "Question or concept on the front of the card (max 200 characters)"
                            },
                            "back": {
                                "type": "string",
                                "description": "Answer or explanation on the back of the card (max 500 characters)"
                            }
                        },
                        "required": ["front", "back"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["flashcards"],
            "additionalProperties": false
        }),
    )
}

type Shape = fn(&Value) -> Option<Vec<Value>>;

const SHAPES: &[Shape] = &[bare_array, wrapped_flashcards, single_card, first_array_field];

fn bare_array(value: &Value) -> Option<Vec<Value>> {
    value.as_array().cloned()
}

fn wrapped_flashcards(value: &Value) -> Option<Vec<Value>> {
    value.get("flashcards")?.as_array().cloned()
}

fn single_card(value: &Value) -> Option<Vec<Value>> {
    let object = value.as_object()?;
    let present = |key: &str| object.get(key).map_or(false, is_truthy);
    (present("front") && present("back")).then(|| vec![value.clone()])
}

/// First array-valued field in document order.
fn first_array_field(value: &Value) -> Option<Vec<Value>> {
    value
        .as_object()?
        .values()
        .find_map(|field| field.as_array().cloned())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn match_shape(value: &Value) -> Option<Vec<Value>> {
    SHAPES.iter().find_map(|shape| shape(value))
}

static EMBEDDED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\{.*"flashcards".*\}"#).expect("valid regex"));
static EMBEDDED_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

fn parse_direct(content: &str) -> Option<Vec<Value>> {
    let value: Value = serde_json::from_str(content).ok()?;
    match_shape(&value)
}

fn parse_embedded_object(content: &str) -> Option<Vec<Value>> {
    let block = EMBEDDED_OBJECT.find(content)?;
    let value: Value = serde_json::from_str(block.as_str()).ok()?;
    wrapped_flashcards(&value)
}

fn parse_embedded_array(content: &str) -> Option<Vec<Value>> {
    let block = EMBEDDED_ARRAY.find(content)?;
    let value: Value = serde_json::from_str(block.as_str()).ok()?;
    bare_array(&value)
}

/// Locate the list of raw card entries in a model reply.
pub fn extract_entries(content: &str) -> ModelResult<Vec<Value>> {
    if let Some(entries) = parse_direct(content) {
        return Ok(entries);
    }
    warn!(
        content_preview = preview(content, 200),
        "direct JSON parse failed, trying embedded extraction"
    );
    parse_embedded_object(content)
        .or_else(|| parse_embedded_array(content))
        .ok_or_else(|| {
            warn!(content_preview = preview(content, 500), "no flashcard JSON found in model output");
            ModelError::validation("could not parse the model output, please try again")
        })
}

/// Turn one raw entry into a proposal, or drop it.
pub fn proposal_from_entry(entry: &Value) -> Option<FlashcardProposal> {
    let field = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
    };
    Some(FlashcardProposal {
        front: truncate_chars(field("front")?, FRONT_MAX_CHARS),
        back: truncate_chars(field("back")?, BACK_MAX_CHARS),
        source: ProposalSource::AiFull,
    })
}

/// Parse a model reply into proposals. Never returns an empty list.
pub fn parse_proposals(content: &str) -> ModelResult<Vec<FlashcardProposal>> {
    let entries = extract_entries(content)?;
    let proposals: Vec<FlashcardProposal> = entries.iter().filter_map(proposal_from_entry).collect();
    if proposals.is_empty() {
        return Err(ModelError::validation(
            "the model produced no valid flashcards, try a different text",
        ));
    }
    if proposals.len() < entries.len() {
        warn!(
            dropped = entries.len() - proposals.len(),
            kept = proposals.len(),
            "discarded malformed flashcard entries"
        );
    }
    Ok(proposals)
}

/// Produces flashcard proposals from source text.
#[derive(Debug, Clone)]
pub struct FlashcardGenerator {
    client: OpenRouterClient,
}

impl FlashcardGenerator {
    pub fn new(client: OpenRouterClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &OpenRouterClient {
        &self.client
    }

    /// The request sent for `source_text`: system prompt, schema and optional model override.
    pub fn prompt_for(source_text: &str, model: Option<&str>) -> ModelResult<PromptRequest> {
        if source_text.trim().is_empty() {
            return Err(ModelError::validation("source text must not be empty"));
        }
        let request = PromptRequest::user(format!(
            "Analyse the following text and generate study flashcards:\n\n{}",
            source_text
        ))?
        .with_system(FLASHCARD_SYSTEM_PROMPT)?
        .with_response_format(flashcard_response_format());
        match model {
            Some(model) => request.with_model(model),
            None => Ok(request),
        }
    }

    pub async fn generate_from_text(
        &self,
        source_text: &str,
        model: Option<&str>,
    ) -> ModelResult<Vec<FlashcardProposal>> {
        let request = Self::prompt_for(source_text, model)?;
        let content = self.client.send(&request).await?;
        let proposals = parse_proposals(&content)?;
        info!(
            count = proposals.len(),
            model = request.model().unwrap_or(self.client.config().default_model()),
            "flashcards generated"
        );
        Ok(proposals)
    }
}

/// Generate proposals with a client configured from the environment.
pub async fn generate_flashcards_from_text(
    source_text: &str,
    model: Option<&str>,
) -> ModelResult<Vec<FlashcardProposal>> {
    let config = match model {
        Some(model) => ClientConfig::default().with_default_model(model),
        None => ClientConfig::default(),
    };
    let generator = FlashcardGenerator::new(OpenRouterClient::new(&config)?);
    generator.generate_from_text(source_text, None).await
}
