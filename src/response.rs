use tracing::{debug, error};

use crate::error::{ModelError, ModelResult};
use crate::models::ChatResponse;

/// Decode a 2xx body into a [`ChatResponse`].
pub fn decode_response(body: &str) -> ModelResult<ChatResponse> {
    serde_json::from_str(body).map_err(|e| {
        error!(error = %e, "response body is not a chat completion");
        ModelError::validation(format!("malformed response body: {}", e))
    })
}

/// Check the minimal response shape and return the first choice's content.
///
/// A success response without usable content is a contract violation, so the
/// resulting error is never retried.
pub fn extract_content(response: &ChatResponse) -> ModelResult<String> {
    let choice = response
        .choices
        .first()
        .ok_or_else(|| ModelError::validation("response contains no choices"))?;
    let message = choice
        .message
        .as_ref()
        .ok_or_else(|| ModelError::validation("first choice has no message"))?;
    let content = match &message.content {
        Some(value) => value
            .as_str()
            .ok_or_else(|| ModelError::validation("message content is not a string"))?,
        None => return Err(ModelError::validation("message content is missing")),
    };
    if content.is_empty() {
        return Err(ModelError::validation("empty response from the model"));
    }
    debug!(
        finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
        content_len = content.len(),
        "response content extracted"
    );
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use pretty_assertions::assert_eq;

    fn shape_error(body: &str) -> ErrorCode {
        decode_response(body)
            .and_then(|r| extract_content(&r))
            .unwrap_err()
            .code()
    }

    #[test]
    fn extracts_first_choice() {
        let response = decode_response(
            r#"{"choices":[{"message":{"role":"assistant","content":"first"}},{"message":{"role":"assistant","content":"second"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(&response).unwrap(), "first");
    }

    #[test]
    fn malformed_shapes_are_validation_errors() {
        for body in [
            "not json",
            r#"{"choices": "nope"}"#,
            r#"{}"#,
            r#"{"choices": []}"#,
            r#"{"choices": [{}]}"#,
            r#"{"choices": [{"message": {"role": "assistant"}}]}"#,
            r#"{"choices": [{"message": {"role": "assistant", "content": ["a"]}}]}"#,
            r#"{"choices": [{"message": {"role": "assistant", "content": ""}}]}"#,
        ] {
            assert_eq!(shape_error(body), ErrorCode::ValidationError, "{}", body);
        }
    }
}
