pub mod config;
pub mod interaction;
pub mod llm;

pub use config::{ClientConfig, CredentialSource, HttpSettings, ProviderSettings, StaticCredentials};
pub use interaction::{Interaction, InteractionLogger, TracingInteractionLog};
pub use llm::{
    AgentConfig, ChatMessage, CompletionClient, CompletionError, CompletionRequest,
    CompletionResult, CompletionStream, FinishReason, GenerationParams, Hyperparameters, Provider,
    ProviderConfig, Retried, RetryGovernor, RetryPolicy, Role, StreamChunk, TokenCallback, Usage,
};

/// Initialize structured JSON logging on stderr (stdout carries completions)
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
