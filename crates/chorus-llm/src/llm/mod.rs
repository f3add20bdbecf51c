pub mod anthropic;
pub mod client;
pub mod error;
pub mod gemini;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod streaming;
pub mod types;

pub use client::{ByteStream, CompletionClient, ProviderStream};
pub use error::CompletionError;
pub use provider::{chat_completions_url, resolve_params, Provider, ResolvedParams, WireFormat};
pub use retry::{AcceptReason, Decision, Retried, RetryGovernor, RetryPolicy, RetryRecord};
pub use streaming::{CompletionStream, SseFrame, SseTokenizer, StreamDecoder};
pub use types::{
    AgentConfig, ChatMessage, CompletionRequest, CompletionResult, FinishReason,
    GenerationParams, Hyperparameters, ProviderConfig, Role, StreamChunk, TokenCallback, Usage,
};
