use serde::Deserialize;
use serde_json::{json, Value};

use super::error::CompletionError;
use super::provider::ResolvedParams;
use super::streaming::{DecodedCompletion, FrameEvent, SseFrame};
use super::types::{ChatMessage, FinishReason, Role, Usage};

/// Build Gemini generateContent request body
pub fn build_request_body(
    system_prompt: &str,
    messages: &[ChatMessage],
    params: &ResolvedParams,
) -> Value {
    let mut system = system_prompt.to_string();
    let mut contents = Vec::with_capacity(messages.len());

    for msg in messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "model",
            Role::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&msg.content);
                continue;
            }
        };
        contents.push(json!({"role": role, "parts": [{"text": msg.content}]}));
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": {
            "temperature": params.temperature,
            "maxOutputTokens": params.max_tokens,
        },
    });

    // Gemini uses systemInstruction rather than a system-role turn
    if !system.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }

    body
}

/// `MAX_TOKENS` is treated as length truncation, same as the other dialects.
pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        other => FinishReason::Other(other.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
    /// Thought summaries are not part of the visible answer
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct GeminiUsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u32>,
}

impl GeminiResponse {
    fn first_candidate(&self) -> Option<&GeminiCandidate> {
        self.candidates.as_ref().and_then(|c| c.first())
    }

    /// All visible text parts of the first candidate, concatenated
    fn text(&self) -> String {
        self.first_candidate()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.as_ref())
            .map(|parts| {
                parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<FinishReason> {
        self.first_candidate()
            .and_then(|c| c.finish_reason.as_deref())
            .map(map_finish_reason)
    }
}

/// Parse one Gemini SSE frame. Gemini has no end sentinel; the body closing ends the stream.
pub fn parse_frame(frame: &SseFrame) -> Vec<FrameEvent> {
    let resp: GeminiResponse = match serde_json::from_str(frame.data.trim()) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable Gemini SSE frame");
            return vec![];
        }
    };

    let mut events = Vec::new();

    let text = resp.text();
    if !text.is_empty() {
        events.push(FrameEvent::Text(text));
    }
    if let Some(reason) = resp.finish_reason() {
        events.push(FrameEvent::Finish(reason));
    }
    // usageMetadata is cumulative, so later frames overwrite earlier counts
    if let Some(ref usage) = resp.usage_metadata {
        if let Some(n) = usage.prompt_token_count {
            events.push(FrameEvent::InputTokens(n));
        }
        if let Some(n) = usage.candidates_token_count {
            events.push(FrameEvent::OutputTokens(n));
        }
    }

    events
}

/// Parse a generateContent JSON body
pub fn parse_response(body: &str) -> Result<DecodedCompletion, CompletionError> {
    let resp: GeminiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Decode(format!("Gemini response: {}", e)))?;

    let usage = resp
        .usage_metadata
        .as_ref()
        .and_then(|u| Usage::reported(u.prompt_token_count, u.candidates_token_count));

    Ok(DecodedCompletion {
        text: resp.text(),
        usage,
        finish_reason: resp.finish_reason(),
    })
}
