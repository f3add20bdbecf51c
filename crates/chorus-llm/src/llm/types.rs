use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::provider::Provider;

/// Message role in conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: text.to_string(),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: text.to_string(),
        }
    }

    pub fn system(text: &str) -> Self {
        Self {
            role: Role::System,
            content: text.to_string(),
        }
    }
}

/// Why the model stopped generating, normalized across dialects
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    /// Output token budget reached (OpenAI `length`, Anthropic `max_tokens`, Gemini `MAX_TOKENS`)
    Length,
    ToolUse,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn as_str(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ToolUse => "tool_use",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Other(raw) => raw,
        }
    }
}

/// Token usage as reported by the provider.
///
/// Counts the provider did not report stay `None`; `total_tokens` is only
/// present when both sides are known and their sum fits in a `u32`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Usage {
    pub fn new(input_tokens: Option<u32>, output_tokens: Option<u32>) -> Self {
        let total_tokens = match (input_tokens, output_tokens) {
            (Some(i), Some(o)) => i.checked_add(o),
            _ => None,
        };
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// `None` when the provider reported no counts at all
    pub fn reported(input_tokens: Option<u32>, output_tokens: Option<u32>) -> Option<Self> {
        if input_tokens.is_none() && output_tokens.is_none() {
            None
        } else {
            Some(Self::new(input_tokens, output_tokens))
        }
    }
}

/// Sampling overrides; every field is optional so presets can fill the gaps
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

/// One streaming completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Falls back to the credential source's default provider
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub preset: Option<String>,
    pub config: Option<GenerationParams>,
}

impl CompletionRequest {
    pub fn new(provider: Provider, system_prompt: &str, messages: Vec<ChatMessage>) -> Self {
        Self {
            provider: Some(provider),
            system_prompt: system_prompt.to_string(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_preset(mut self, preset: &str) -> Self {
        self.preset = Some(preset.to_string());
        self
    }

    pub fn with_config(mut self, config: GenerationParams) -> Self {
        self.config = Some(config);
        self
    }
}

/// Connection details for the non-streaming path
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub is_configured: bool,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Hyperparameters {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            temperature: super::provider::DEFAULT_TEMPERATURE,
            max_tokens: super::provider::DEFAULT_MAX_TOKENS,
        }
    }
}

/// Per-agent settings for a single-shot call
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub provider: Provider,
    pub provider_config: ProviderConfig,
    pub model: Option<String>,
    pub hyperparameters: Hyperparameters,
}

/// Aggregated result of one attempt, streaming or not
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult {
    pub content: String,
    pub provider: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub latency_ms: u64,
}

/// Canonical streaming chunk, provider independent
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    TextDelta {
        content: String,
    },
    /// Terminal success; `content` is every preceding delta concatenated in order
    Done {
        content: String,
        provider: String,
        model: String,
        latency_ms: u64,
        usage: Option<Usage>,
        finish_reason: Option<FinishReason>,
    },
    /// Terminal failure (transport error or in-band provider error)
    Error {
        message: String,
    },
}

/// Per-token callback for streaming completions
pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_total_requires_both_sides() {
        let full = Usage::new(Some(25), Some(8));
        assert_eq!(full.total_tokens, Some(33));

        let partial = Usage::new(Some(25), None);
        assert_eq!(partial.total_tokens, None);
        assert_eq!(partial.input_tokens, Some(25));
    }

    #[test]
    fn test_usage_total_overflow_left_unset() {
        let usage = Usage::new(Some(u32::MAX), Some(1));
        assert_eq!(usage.total_tokens, None);
        assert_eq!(usage.output_tokens, Some(1));
    }

    #[test]
    fn test_usage_reported_none_when_absent() {
        assert!(Usage::reported(None, None).is_none());
        assert_eq!(Usage::reported(None, Some(3)).unwrap().output_tokens, Some(3));
    }

    #[test]
    fn test_usage_serializes_without_missing_fields() {
        let json = serde_json::to_value(Usage::new(Some(1), None)).unwrap();
        assert_eq!(json, serde_json::json!({"inputTokens": 1}));
    }
}
