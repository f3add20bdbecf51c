use serde_json::Value;
use thiserror::Error;

use super::provider::Provider;

const NO_MODELS_LOADED: &str = "no models loaded";

/// Errors from building, sending or decoding a completion call
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Missing credentials or invalid settings; raised before any network I/O
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{}", describe_http(*provider, *status, message))]
    Http {
        provider: Provider,
        status: u16,
        message: String,
    },

    /// The local server is up but has nothing loaded to serve
    #[error("Local AI error: {status} - {message}")]
    NoModelsLoaded { status: u16, message: String },

    /// Connection failures and timeouts from the HTTP client
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(String),

    /// Terminal error chunk received while draining a stream
    #[error("stream error: {0}")]
    Stream(String),
}

fn describe_http(provider: Provider, status: u16, message: &str) -> String {
    match provider {
        Provider::Local => format!("Local AI error: {} - {}", status, message),
        other => format!("{} API error ({}): {}", other, status, message),
    }
}

impl CompletionError {
    /// Classify a non-2xx response body.
    pub fn from_response(provider: Provider, status: u16, body: &str) -> Self {
        let message = extract_error_message(body);
        if provider == Provider::Local && message.to_lowercase().contains(NO_MODELS_LOADED) {
            return CompletionError::NoModelsLoaded { status, message };
        }
        CompletionError::Http {
            provider,
            status,
            message,
        }
    }

    pub fn is_no_models_loaded(&self) -> bool {
        matches!(self, CompletionError::NoModelsLoaded { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CompletionError::Http { status, .. } | CompletionError::NoModelsLoaded { status, .. } => {
                Some(*status)
            }
            CompletionError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Operator-facing hint for errors with a known fix
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            CompletionError::NoModelsLoaded { .. } => Some(
                "Load a model in your local AI server (e.g. LM Studio) and start its server, then retry.",
            ),
            CompletionError::Configuration(_) => {
                Some("Set the provider's API key in the config file or its environment variable.")
            }
            _ => None,
        }
    }
}

/// Pull a human-readable message out of an error body (JSON if parseable, else raw text)
pub fn extract_error_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };

    let from_error = match json.get("error") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        None => None,
    };

    from_error
        .or_else(|| {
            json.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_nested_message() {
        let body = r#"{"error":{"message":"Invalid API key","type":"auth"}}"#;
        assert_eq!(extract_error_message(body), "Invalid API key");
    }

    #[test]
    fn test_extract_string_error() {
        assert_eq!(extract_error_message(r#"{"error":"No models loaded"}"#), "No models loaded");
    }

    #[test]
    fn test_extract_raw_text() {
        assert_eq!(extract_error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_http_error_embeds_status_and_message() {
        let err = CompletionError::from_response(
            Provider::OpenAI,
            401,
            r#"{"error":{"message":"Incorrect API key"}}"#,
        );
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("Incorrect API key"));
        assert!(!err.is_no_models_loaded());
    }

    #[test]
    fn test_local_error_format() {
        let err = CompletionError::from_response(Provider::Local, 500, "boom");
        assert_eq!(err.to_string(), "Local AI error: 500 - boom");
    }

    #[test]
    fn test_no_models_loaded_is_distinct() {
        let err = CompletionError::from_response(
            Provider::Local,
            400,
            r#"{"error":"No Models Loaded. Please load a model first."}"#,
        );
        assert!(err.is_no_models_loaded());
        assert!(err.remediation().is_some());
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().starts_with("Local AI error: 400 - "));
    }

    #[test]
    fn test_no_models_pattern_only_for_local() {
        let err = CompletionError::from_response(Provider::OpenAI, 400, "no models loaded");
        assert!(!err.is_no_models_loaded());
    }
}
