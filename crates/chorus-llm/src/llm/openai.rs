//! OpenAI-compatible chat completions (OpenAI, OpenRouter, local servers).

use serde::Deserialize;
use serde_json::{json, Value};

use super::error::CompletionError;
use super::provider::{Provider, ResolvedParams};
use super::streaming::{DecodedCompletion, FrameEvent, SseFrame};
use super::types::{ChatMessage, FinishReason, Usage};

/// Build an OpenAI-compatible request body (system prompt goes first)
pub fn build_request_body(
    provider: Provider,
    model: &str,
    system_prompt: &str,
    messages: &[ChatMessage],
    params: &ResolvedParams,
    stream: bool,
) -> Value {
    let mut api_messages = Vec::with_capacity(messages.len() + 1);
    if !system_prompt.is_empty() {
        api_messages.push(json!({"role": "system", "content": system_prompt}));
    }
    for msg in messages {
        api_messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
    }

    let mut body = json!({
        "model": model,
        "messages": api_messages,
        "temperature": params.temperature,
    });
    body[provider.max_tokens_field()] = json!(params.max_tokens);

    if stream {
        body["stream"] = json!(true);
        if provider.reports_stream_usage() {
            body["stream_options"] = json!({"include_usage": true});
        }
    }

    body
}

pub fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolUse,
        "content_filter" => FinishReason::ContentFilter,
        other => FinishReason::Other(other.to_string()),
    }
}

// --- SSE frames ---

#[derive(Debug, Deserialize)]
struct StreamFrame {
    choices: Option<Vec<StreamChoice>>,
    usage: Option<ApiUsage>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}

/// Parse one OpenAI-compatible SSE frame.
/// Unparseable payloads yield nothing; `[DONE]` terminates.
pub fn parse_frame(frame: &SseFrame) -> Vec<FrameEvent> {
    let trimmed = frame.data.trim();
    if trimmed == "[DONE]" {
        return vec![FrameEvent::Terminate];
    }

    let parsed: StreamFrame = match serde_json::from_str(trimmed) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(error = %e, "Skipping unparseable OpenAI SSE frame");
            return vec![];
        }
    };

    if let Some(err) = parsed.error {
        let message = err
            .message
            .unwrap_or_else(|| "provider reported an error mid-stream".to_string());
        return vec![FrameEvent::Failed(message)];
    }

    let mut events = Vec::new();

    if let Some(choice) = parsed.choices.as_ref().and_then(|c| c.first()) {
        if let Some(content) = choice.delta.as_ref().and_then(|d| d.content.as_ref()) {
            if !content.is_empty() {
                events.push(FrameEvent::Text(content.clone()));
            }
        }
        if let Some(ref reason) = choice.finish_reason {
            events.push(FrameEvent::Finish(map_finish_reason(reason)));
        }
    }

    // Usage arrives on a trailing frame whose `choices` is empty
    if let Some(usage) = parsed.usage {
        if let Some(n) = usage.prompt_tokens {
            events.push(FrameEvent::InputTokens(n));
        }
        if let Some(n) = usage.completion_tokens {
            events.push(FrameEvent::OutputTokens(n));
        }
    }

    events
}

// --- Non-streaming response ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ApiMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

/// Parse a chat completion JSON body
pub fn parse_response(body: &str) -> Result<DecodedCompletion, CompletionError> {
    let resp: ApiResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::Decode(format!("OpenAI-compatible response: {}", e)))?;

    let choice = resp.choices.first();
    let text = choice
        .and_then(|c| c.message.as_ref())
        .and_then(|m| m.content.clone())
        .unwrap_or_default();
    let finish_reason = choice
        .and_then(|c| c.finish_reason.as_deref())
        .map(map_finish_reason);
    let usage = resp
        .usage
        .and_then(|u| Usage::reported(u.prompt_tokens, u.completion_tokens));

    Ok(DecodedCompletion {
        text,
        usage,
        finish_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::Role;

    fn frame(data: &str) -> SseFrame {
        SseFrame {
            event: None,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_build_request_body_openai() {
        let messages = vec![ChatMessage::user("Hello")];
        let params = ResolvedParams {
            temperature: 0.5,
            max_tokens: 256,
        };
        let body = build_request_body(Provider::OpenAI, "gpt-4o", "Be helpful", &messages, &params, true);

        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be helpful");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_completion_tokens"], 256);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_build_request_body_local() {
        let messages = vec![ChatMessage {
            role: Role::Assistant,
            content: "Earlier reply".into(),
        }];
        let body = build_request_body(
            Provider::Local,
            "local-model",
            "",
            &messages,
            &ResolvedParams::default(),
            false,
        );

        assert_eq!(body["messages"][0]["role"], "assistant");
        assert_eq!(body["max_tokens"], 4096);
        assert!(body.get("stream").is_none());
        assert!(body.get("stream_options").is_none());
    }

    #[test]
    fn test_text_delta() {
        let events = parse_frame(&frame(
            r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"content":"Hi"}}]}"#,
        ));
        assert_eq!(events, vec![FrameEvent::Text("Hi".into())]);
    }

    #[test]
    fn test_empty_delta_ignored() {
        assert!(parse_frame(&frame(r#"{"choices":[{"index":0,"delta":{}}]}"#)).is_empty());
        assert!(parse_frame(&frame(r#"{"choices":[{"delta":{"content":""}}]}"#)).is_empty());
    }

    #[test]
    fn test_done_signal() {
        assert_eq!(parse_frame(&frame("[DONE]")), vec![FrameEvent::Terminate]);
    }

    #[test]
    fn test_usage_on_trailing_frame() {
        let events = parse_frame(&frame(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":7,"total_tokens":19}}"#,
        ));
        assert_eq!(
            events,
            vec![FrameEvent::InputTokens(12), FrameEvent::OutputTokens(7)]
        );
    }

    #[test]
    fn test_finish_reason_length() {
        let events = parse_frame(&frame(
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"length"}]}"#,
        ));
        assert_eq!(events, vec![FrameEvent::Finish(FinishReason::Length)]);
    }

    #[test]
    fn test_malformed_skipped() {
        assert!(parse_frame(&frame("{\"choices\": [")).is_empty());
    }

    #[test]
    fn test_parse_response_text() {
        let body = r#"{"model":"gpt-4o","choices":[{"message":{"role":"assistant","content":"Hello!"},"finish_reason":"stop"}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.finish_reason, Some(FinishReason::Stop));
        assert_eq!(resp.usage.unwrap().total_tokens, Some(15));
    }

    #[test]
    fn test_parse_response_without_usage() {
        let body = r#"{"choices":[{"message":{"content":null},"finish_reason":"length"}]}"#;
        let resp = parse_response(body).unwrap();
        assert_eq!(resp.text, "");
        assert!(resp.usage.is_none());
        assert_eq!(resp.finish_reason, Some(FinishReason::Length));
    }
}
