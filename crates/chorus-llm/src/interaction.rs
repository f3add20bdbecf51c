//! Post-completion interaction logging.
//!
//! Loggers are invoked fire-and-forget on a blocking worker so a slow or
//! failing sink never delays or fails the caller's result.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::llm::{Provider, Usage};

/// One finished completion call
#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub content: String,
    pub usage: Option<Usage>,
    pub latency_ms: u64,
    pub streamed: bool,
}

impl Interaction {
    pub fn new(
        provider: Provider,
        model: &str,
        content: &str,
        usage: Option<Usage>,
        latency_ms: u64,
        streamed: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            provider: provider.id().to_string(),
            model: model.to_string(),
            content: content.to_string(),
            usage,
            latency_ms,
            streamed,
        }
    }
}

/// Observability sink for completed calls
pub trait InteractionLogger: Send + Sync {
    fn record(&self, interaction: Interaction);
}

/// Default sink: one structured `info` event per interaction
#[derive(Debug, Default)]
pub struct TracingInteractionLog;

impl InteractionLogger for TracingInteractionLog {
    fn record(&self, interaction: Interaction) {
        tracing::info!(
            target: "chorus::interaction",
            id = %interaction.id,
            provider = %interaction.provider,
            model = %interaction.model,
            latency_ms = interaction.latency_ms,
            streamed = interaction.streamed,
            chars = interaction.content.len(),
            input_tokens = interaction.usage.and_then(|u| u.input_tokens),
            output_tokens = interaction.usage.and_then(|u| u.output_tokens),
            "Completion recorded"
        );
    }
}

/// Hand an interaction to the logger without waiting on it.
pub(crate) fn dispatch(logger: &Arc<dyn InteractionLogger>, interaction: Interaction) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let logger = Arc::clone(logger);
            drop(handle.spawn_blocking(move || logger.record(interaction)));
        }
        Err(_) => tracing::debug!("No async runtime, interaction log skipped"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Capture(Mutex<Vec<Interaction>>);

    impl InteractionLogger for Capture {
        fn record(&self, interaction: Interaction) {
            self.0.lock().unwrap().push(interaction);
        }
    }

    struct Panicking;

    impl InteractionLogger for Panicking {
        fn record(&self, _interaction: Interaction) {
            panic!("sink exploded");
        }
    }

    #[tokio::test]
    async fn test_dispatch_records() {
        let capture = Arc::new(Capture::default());
        let logger: Arc<dyn InteractionLogger> = capture.clone();
        dispatch(
            &logger,
            Interaction::new(Provider::OpenAI, "gpt-4o", "hi", None, 12, true),
        );

        for _ in 0..50 {
            if !capture.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let recorded = capture.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].provider, "openai");
        assert_eq!(recorded[0].latency_ms, 12);
    }

    #[test]
    fn test_interaction_serializes() {
        let interaction = Interaction::new(Provider::Anthropic, "claude", "hi", None, 7, true);
        let json = serde_json::to_value(&interaction).unwrap();
        assert_eq!(json["id"], interaction.id.to_string());
        assert_eq!(json["provider"], "anthropic");
        assert_eq!(json["streamed"], true);
    }

    #[tokio::test]
    async fn test_panicking_logger_does_not_propagate() {
        let logger: Arc<dyn InteractionLogger> = Arc::new(Panicking);
        dispatch(
            &logger,
            Interaction::new(Provider::Local, "local-model", "", None, 0, false),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
