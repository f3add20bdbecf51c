use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::CompletionError;
use super::types::GenerationParams;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub const DEFAULT_LOCAL_URL: &str = "http://localhost:1234";
pub const LOCAL_MODEL: &str = "local-model";
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Supported completion providers (keep ids stable, they appear in config files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    OpenRouter,
    Local,
    Anthropic,
    Gemini,
}

/// SSE dialect spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    OpenAICompatible,
    Anthropic,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 5] = [
        Provider::OpenAI,
        Provider::OpenRouter,
        Provider::Local,
        Provider::Anthropic,
        Provider::Gemini,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Local => "local",
            Provider::Anthropic => "anthropic",
            Provider::Gemini => "gemini",
        }
    }

    pub fn format(&self) -> WireFormat {
        match self {
            Provider::OpenAI | Provider::OpenRouter | Provider::Local => {
                WireFormat::OpenAICompatible
            }
            Provider::Anthropic => WireFormat::Anthropic,
            Provider::Gemini => WireFormat::Gemini,
        }
    }

    /// Local servers accept unauthenticated requests
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Local)
    }

    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAI => Some("OPENAI_API_KEY"),
            Provider::OpenRouter => Some("OPENROUTER_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::Local => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAI => "gpt-4o",
            Provider::OpenRouter => "openai/gpt-4o",
            Provider::Local => LOCAL_MODEL,
            Provider::Anthropic => "claude-sonnet-4-20250514",
            Provider::Gemini => "gemini-2.0-flash",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => OPENAI_BASE_URL,
            Provider::OpenRouter => OPENROUTER_BASE_URL,
            Provider::Local => DEFAULT_LOCAL_URL,
            Provider::Anthropic => ANTHROPIC_BASE_URL,
            Provider::Gemini => GEMINI_BASE_URL,
        }
    }

    /// Name of the max-token field in OpenAI-compatible request bodies
    pub fn max_tokens_field(&self) -> &'static str {
        match self {
            Provider::OpenAI => "max_completion_tokens",
            _ => "max_tokens",
        }
    }

    /// Whether the endpoint honours `stream_options.include_usage`
    pub fn reports_stream_usage(&self) -> bool {
        matches!(self, Provider::OpenAI | Provider::OpenRouter)
    }

    /// Request URL for this provider given an optional configured base.
    pub fn endpoint(&self, base_url: Option<&str>, model: &str, stream: bool) -> String {
        let base = base_url
            .map(|b| b.trim().trim_end_matches('/'))
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.default_base_url());

        match self.format() {
            WireFormat::OpenAICompatible => chat_completions_url(base),
            WireFormat::Anthropic => {
                if base.ends_with("/v1/messages") {
                    base.to_string()
                } else {
                    format!("{}/v1/messages", base)
                }
            }
            WireFormat::Gemini => {
                if stream {
                    format!("{}/models/{}:streamGenerateContent?alt=sse", base, model)
                } else {
                    format!("{}/models/{}:generateContent", base, model)
                }
            }
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = CompletionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| CompletionError::Configuration(format!("unknown provider '{}'", s)))
    }
}

/// Append `/v1/chat/completions` to a base URL exactly once.
pub fn chat_completions_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with(CHAT_COMPLETIONS_PATH) {
        base.to_string()
    } else if base.ends_with("/v1") {
        format!("{}/chat/completions", base)
    } else {
        format!("{}{}", base, CHAT_COMPLETIONS_PATH)
    }
}

/// Sampling parameters after the preset/override merge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ResolvedParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Overrides win field by field, then preset, then provider defaults.
pub fn resolve_params(
    preset: Option<&GenerationParams>,
    overrides: Option<&GenerationParams>,
) -> ResolvedParams {
    let defaults = ResolvedParams::default();
    let pick_temp = overrides
        .and_then(|o| o.temperature)
        .or_else(|| preset.and_then(|p| p.temperature));
    let pick_max = overrides
        .and_then(|o| o.max_tokens)
        .or_else(|| preset.and_then(|p| p.max_tokens));

    ResolvedParams {
        temperature: pick_temp.unwrap_or(defaults.temperature),
        max_tokens: pick_max.unwrap_or(defaults.max_tokens),
    }
}
