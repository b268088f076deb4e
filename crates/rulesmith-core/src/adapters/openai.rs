//! OpenAI Chat Completions Adapter
//!
//! Builds a non-streaming structured-output request and extracts the rule
//! candidate from the completion:
//! ```text
//! {"id":"chatcmpl-xxx","object":"chat.completion","model":"gpt-4o","choices":[{"index":0,"message":{"role":"assistant","content":"{\"visual_detection\": ...}"},"finish_reason":"stop"}]}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpstreamError;
use crate::prompt::{ContentPart, PromptPayload};
use crate::schema;
use crate::types::RuleCandidate;

/// Default sampling temperature for rule generation
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Default frequency penalty for rule generation
pub const DEFAULT_FREQUENCY_PENALTY: f32 = 0.1;

/// OpenAI-compatible chat completions adapter
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    model: String,
    temperature: f32,
    frequency_penalty: f32,
}

impl OpenAiAdapter {
    /// Create a new adapter with default sampling settings
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            frequency_penalty: DEFAULT_FREQUENCY_PENALTY,
        }
    }

    /// Create with custom sampling settings
    pub fn with_settings(model: impl Into<String>, temperature: f32, frequency_penalty: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
            frequency_penalty,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body for `POST {base_url}/chat/completions`
    pub fn build_request(&self, payload: &PromptPayload) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: payload.parts().to_vec(),
            }],
            temperature: self.temperature,
            frequency_penalty: self.frequency_penalty,
            response_format: schema::response_format(),
        }
    }

    /// Extract the rule candidate from a completion body
    pub fn parse_response(&self, body: &str) -> Result<RuleCandidate, UpstreamError> {
        let response: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
            UpstreamError::MalformedOutput(format!("Failed to parse completion: {}", e))
        })?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| UpstreamError::MalformedOutput("completion has no choices".to_string()))?;

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
            return Err(UpstreamError::Refused(refusal));
        }

        let content = choice
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                UpstreamError::MalformedOutput(format!(
                    "completion has no content (finish_reason: {})",
                    choice.finish_reason.as_deref().unwrap_or("unknown")
                ))
            })?;

        parse_candidate(&content)
    }
}

/// Parse the assistant content into a candidate, tolerating a code fence or
/// prose around the JSON object.
pub fn parse_candidate(content: &str) -> Result<RuleCandidate, UpstreamError> {
    let json = extract_json_object(content)
        .ok_or_else(|| UpstreamError::MalformedOutput("no JSON object in model output".to_string()))?;

    serde_json::from_str(json)
        .map_err(|e| UpstreamError::MalformedOutput(format!("Failed to parse rule: {}", e)))
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&raw[start..=end])
}

// =============================================================================
// OpenAI Request/Response Structures
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub frequency_penalty: f32,
    pub response_format: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AssistantMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
