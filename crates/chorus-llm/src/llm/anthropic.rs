use serde::Deserialize;
use serde_json::{json, Value};

use super::error::CompletionError;
use super::provider::ResolvedParams;
use super::streaming::{DecodedCompletion, FrameEvent, SseFrame};
use super::types::{ChatMessage, FinishReason, Role, Usage};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Build Anthropic Messages API request body.
/// System-role messages are folded into the top-level `system` field.
pub fn build_request_body(
    model: &str,
    system_prompt: &str,
    messages: &[ChatMessage],
    params: &ResolvedParams,
    stream: bool,
) -> Value {
    let mut system = system_prompt.to_string();
    let mut api_messages = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&msg.content);
            }
            Role::User | Role::Assistant => api_messages.push(json!({
                "role": msg.role.as_str(),
                "content": [{"type": "text", "text": msg.content}],
            })),
        }
    }

    let mut body = json!({
        "model": model,
        "max_tokens": params.max_tokens,
        "temperature": params.temperature,
        "messages": api_messages,
    });

    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if stream {
        body["stream"] = json!(true);
    }

    body
}

pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolUse,
        "refusal" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

// --- SSE events ---

/// Anthropic SSE event types we care about
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: StartMessage },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: BlockDelta },
    #[serde(rename = "message_delta")]
    MessageDelta {
        delta: MessageDeltaBody,
        usage: Option<DeltaUsage>,
    },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: ErrorBody },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    usage: Option<StartUsage>,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    input_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum BlockDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Parse one Anthropic SSE frame.
/// `ping`, block starts/stops and thinking deltas produce nothing.
pub fn parse_frame(frame: &SseFrame) -> Vec<FrameEvent> {
    let event: AnthropicEvent = match serde_json::from_str(frame.data.trim()) {
        Ok(e) => e,
        Err(e) => {
            // A bare `event: message_stop` with an unparseable body still ends the message
            if frame.event.as_deref() == Some("message_stop") {
                return vec![FrameEvent::Terminate];
            }
            tracing::debug!(error = %e, event = ?frame.event, "Skipping unparseable Anthropic SSE frame");
            return vec![];
        }
    };

    match event {
        AnthropicEvent::MessageStart { message } => message
            .usage
            .and_then(|u| u.input_tokens)
            .map(|n| vec![FrameEvent::InputTokens(n)])
            .unwrap_or_default(),
        AnthropicEvent::ContentBlockDelta { delta } => match delta {
            BlockDelta::TextDelta { text } if !text.is_empty() => vec![FrameEvent::Text(text)],
            _ => vec![],
        },
        AnthropicEvent::MessageDelta { delta, usage } => {
            let mut events = Vec::new();
            if let Some(n) = usage.and_then(|u| u.output_tokens) {
                events.push(FrameEvent::OutputTokens(n));
            }
            if let Some(ref reason) = delta.stop_reason {
                events.push(FrameEvent::Finish(map_stop_reason(reason)));
            }
            events
        }
        AnthropicEvent::MessageStop => vec![FrameEvent::Terminate],
        AnthropicEvent::Error { error } => vec![FrameEvent::Failed(
            error
                .message
                .unwrap_or_else(|| "Anthropic stream error".to_string()),
        )],
        AnthropicEvent::Unknown => vec![],
    }
}

// --- Non-streaming response ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
}

/// Parse Anthropic Messages API response; text blocks are concatenated
pub fn parse_response(body: &str) -> Result<DecodedCompletion, CompletionError> {
    let resp: ApiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Decode(format!("Anthropic response: {}", e)))?;

    let text = resp
        .content
        .iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text.as_deref())
        .collect::<String>();

    Ok(DecodedCompletion {
        text,
        usage: resp
            .usage
            .and_then(|u| Usage::reported(u.input_tokens, u.output_tokens)),
        finish_reason: resp.stop_reason.as_deref().map(map_stop_reason),
    })
}
