use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde_json::Value;

use super::error::CompletionError;
use super::provider::{resolve_params, Provider, ResolvedParams, WireFormat, LOCAL_MODEL};
use super::retry::{Retried, RetryGovernor, RetryPolicy};
use super::streaming::{CompletionStream, DecodedCompletion};
use super::types::{
    AgentConfig, ChatMessage, CompletionRequest, CompletionResult, GenerationParams, StreamChunk,
    TokenCallback,
};
use super::{anthropic, gemini, openai};
use crate::config::{builtin_presets, ClientConfig, CredentialSource, HttpSettings};
use crate::interaction::{dispatch, Interaction, InteractionLogger};

/// Raw response body as delivered by reqwest
pub type ByteStream = BoxStream<'static, Result<bytes::Bytes, reqwest::Error>>;

/// Live completion stream over an HTTP response
pub type ProviderStream = CompletionStream<ByteStream>;

/// Everything needed to put one request on the wire
#[derive(Debug, Clone)]
struct PreparedRequest {
    provider: Provider,
    model: String,
    url: String,
    api_key: Option<String>,
    body: Value,
}

/// Completion client for every supported provider.
///
/// Holds only read-only state: the HTTP client, the credential source,
/// the preset table and the retry policy.
pub struct CompletionClient {
    http: Client,
    credentials: Arc<dyn CredentialSource>,
    presets: HashMap<String, GenerationParams>,
    retry: RetryPolicy,
    logger: Option<Arc<dyn InteractionLogger>>,
}

impl CompletionClient {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Result<Self, CompletionError> {
        Self::with_http_settings(credentials, &HttpSettings::default())
    }

    pub fn with_http_settings(
        credentials: Arc<dyn CredentialSource>,
        http: &HttpSettings,
    ) -> Result<Self, CompletionError> {
        let http = ClientBuilder::new()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .build()?;
        Ok(Self {
            http,
            credentials,
            presets: builtin_presets(),
            retry: RetryPolicy::default(),
            logger: None,
        })
    }

    /// Build a client whose credentials, presets, retry and timeouts come from config
    pub fn from_config(config: ClientConfig) -> Result<Self, CompletionError> {
        let http = config.http.clone();
        let presets = config.preset_table();
        let retry = config.retry.clone();
        Ok(Self::with_http_settings(Arc::new(config), &http)?
            .with_presets(presets)
            .with_retry_policy(retry))
    }

    pub fn with_presets(mut self, presets: HashMap<String, GenerationParams>) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn InteractionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Open a streaming completion.
    ///
    /// Configuration problems fail here before any network I/O; non-2xx
    /// responses fail here with status and provider message.
    pub async fn call_stream(
        &self,
        request: &CompletionRequest,
    ) -> Result<ProviderStream, CompletionError> {
        let prepared = self.prepare_stream(request)?;
        let provider = prepared.provider;
        let model = prepared.model.clone();

        tracing::debug!(provider = %provider, model = %model, "Dispatching streaming completion");
        let started = Instant::now();
        let response = self.send(prepared).await?;

        let body: ByteStream = response.bytes_stream().boxed();
        Ok(CompletionStream::new(body, provider, model, started).with_logger(self.logger.clone()))
    }

    /// Stream a completion to the end, feeding deltas to `on_token`, with empty-result retry.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        on_token: Option<TokenCallback>,
    ) -> Result<Retried<CompletionResult>, CompletionError> {
        let governor =
            RetryGovernor::new(self.retry.clone()).with_streaming_callback(on_token.is_some());
        governor
            .run(|| self.stream_to_result(request, on_token.clone()))
            .await
    }

    async fn stream_to_result(
        &self,
        request: &CompletionRequest,
        on_token: Option<TokenCallback>,
    ) -> Result<CompletionResult, CompletionError> {
        let mut stream = self.call_stream(request).await?;
        tracing::debug!(
            provider = %stream.provider(),
            model = stream.model(),
            callback = on_token.is_some(),
            "Draining completion stream"
        );

        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::TextDelta { content } => {
                    if let Some(ref callback) = on_token {
                        callback(&content);
                    }
                }
                StreamChunk::Done {
                    content,
                    provider,
                    model,
                    latency_ms,
                    usage,
                    finish_reason,
                } => {
                    return Ok(CompletionResult {
                        content,
                        provider,
                        model,
                        usage,
                        finish_reason,
                        latency_ms,
                    });
                }
                StreamChunk::Error { message } => return Err(CompletionError::Stream(message)),
            }
        }

        Err(CompletionError::Stream(
            "stream ended without a terminal chunk".to_string(),
        ))
    }

    /// Single-shot JSON request/response for an agent.
    pub async fn call(
        &self,
        agent: &AgentConfig,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionResult, CompletionError> {
        let prepared = prepare_agent_call(agent, system_prompt, messages)?;
        let provider = prepared.provider;
        let model = prepared.model.clone();

        tracing::debug!(provider = %provider, model = %model, "Dispatching completion");
        let started = Instant::now();
        let response = self.send(prepared).await?;
        let text = response.text().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let decoded = parse_response(provider.format(), &text)?;
        tracing::info!(
            provider = %provider,
            model = %model,
            latency_ms,
            output_tokens = decoded.usage.and_then(|u| u.output_tokens),
            "Completion finished"
        );

        if let Some(ref logger) = self.logger {
            dispatch(
                logger,
                Interaction::new(provider, &model, &decoded.text, decoded.usage, latency_ms, false),
            );
        }

        Ok(CompletionResult {
            content: decoded.text,
            provider: provider.id().to_string(),
            model,
            usage: decoded.usage,
            finish_reason: decoded.finish_reason,
            latency_ms,
        })
    }

    /// [`call`](Self::call) under the empty-result retry policy
    pub async fn call_with_retry(
        &self,
        agent: &AgentConfig,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<Retried<CompletionResult>, CompletionError> {
        RetryGovernor::new(self.retry.clone())
            .run(|| self.call(agent, system_prompt, messages))
            .await
    }

    fn prepare_stream(&self, request: &CompletionRequest) -> Result<PreparedRequest, CompletionError> {
        let provider = match request.provider {
            Some(p) => p,
            None => self.credentials.default_provider_id().parse()?,
        };

        let api_key = self.credentials.api_key(provider);
        if api_key.is_none() && provider.requires_api_key() {
            return Err(CompletionError::Configuration(format!(
                "no API key configured for provider '{}'",
                provider
            )));
        }

        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.credentials.default_model(provider));

        let preset = match request.preset.as_deref() {
            Some(name) => Some(self.presets.get(name).ok_or_else(|| {
                CompletionError::Configuration(format!("unknown preset '{}'", name))
            })?),
            None => None,
        };
        let params = resolve_params(preset, request.config.as_ref());

        let base_url = self.credentials.base_url(provider);
        let url = provider.endpoint(base_url.as_deref(), &model, true);
        let body = build_body(
            provider,
            &model,
            &request.system_prompt,
            &request.messages,
            &params,
            true,
        );

        Ok(PreparedRequest {
            provider,
            model,
            url,
            api_key,
            body,
        })
    }

    async fn send(&self, prepared: PreparedRequest) -> Result<reqwest::Response, CompletionError> {
        let provider = prepared.provider;
        let builder = self.http.post(&prepared.url).json(&prepared.body);
        let builder = authorize(builder, provider, prepared.api_key.as_deref());

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let err = CompletionError::from_response(provider, status.as_u16(), &error_body);
            tracing::warn!(provider = %provider, status = status.as_u16(), error = %err, "Provider returned error");
            return Err(err);
        }
        Ok(response)
    }
}

fn prepare_agent_call(
    agent: &AgentConfig,
    system_prompt: &str,
    messages: &[ChatMessage],
) -> Result<PreparedRequest, CompletionError> {
    let provider = agent.provider;
    let config = &agent.provider_config;
    if !config.is_configured {
        return Err(CompletionError::Configuration(format!(
            "provider '{}' is not configured",
            provider
        )));
    }

    let api_key = Some(config.api_key.trim().to_string()).filter(|k| !k.is_empty());
    if api_key.is_none() && provider.requires_api_key() {
        return Err(CompletionError::Configuration(format!(
            "no API key configured for provider '{}'",
            provider
        )));
    }

    let model = match agent.model.as_deref().map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ if provider == Provider::Local => LOCAL_MODEL.to_string(),
        _ => provider.default_model().to_string(),
    };

    let params = ResolvedParams {
        temperature: agent.hyperparameters.temperature,
        max_tokens: agent.hyperparameters.max_tokens,
    };
    let url = provider.endpoint(config.base_url.as_deref(), &model, false);
    let body = build_body(provider, &model, system_prompt, messages, &params, false);

    Ok(PreparedRequest {
        provider,
        model,
        url,
        api_key,
        body,
    })
}

fn build_body(
    provider: Provider,
    model: &str,
    system_prompt: &str,
    messages: &[ChatMessage],
    params: &ResolvedParams,
    stream: bool,
) -> Value {
    match provider.format() {
        WireFormat::OpenAICompatible => {
            openai::build_request_body(provider, model, system_prompt, messages, params, stream)
        }
        WireFormat::Anthropic => {
            anthropic::build_request_body(model, system_prompt, messages, params, stream)
        }
        WireFormat::Gemini => gemini::build_request_body(system_prompt, messages, params),
    }
}

fn authorize(builder: RequestBuilder, provider: Provider, api_key: Option<&str>) -> RequestBuilder {
    let Some(key) = api_key else {
        return builder;
    };
    match provider.format() {
        WireFormat::OpenAICompatible => builder.bearer_auth(key),
        WireFormat::Anthropic => builder
            .header("x-api-key", key)
            .header("anthropic-version", anthropic::ANTHROPIC_VERSION),
        WireFormat::Gemini => builder.header("x-goog-api-key", key),
    }
}

fn parse_response(format: WireFormat, body: &str) -> Result<DecodedCompletion, CompletionError> {
    match format {
        WireFormat::OpenAICompatible => openai::parse_response(body),
        WireFormat::Anthropic => anthropic::parse_response(body),
        WireFormat::Gemini => gemini::parse_response(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;
    use crate::llm::types::{Hyperparameters, ProviderConfig};

    fn client(creds: StaticCredentials) -> CompletionClient {
        CompletionClient::new(Arc::new(creds)).unwrap()
    }

    #[test]
    fn test_missing_key_fails_before_io() {
        let client = client(StaticCredentials::new(Provider::OpenAI));
        let request = CompletionRequest::new(Provider::OpenAI, "sys", vec![ChatMessage::user("hi")]);
        let err = client.prepare_stream(&request).unwrap_err();
        assert!(matches!(err, CompletionError::Configuration(_)));
    }

    #[test]
    fn test_local_needs_no_key() {
        let client = client(
            StaticCredentials::new(Provider::Local).with_base_url(Provider::Local, "http://h:9/v1/chat/completions"),
        );
        let request = CompletionRequest::new(Provider::Local, "", vec![ChatMessage::user("hi")]);
        let prepared = client.prepare_stream(&request).unwrap();
        assert_eq!(prepared.url, "http://h:9/v1/chat/completions");
        assert_eq!(prepared.model, "local-model");
        assert!(prepared.api_key.is_none());
        assert_eq!(prepared.body["max_tokens"], 4096);
    }

    #[test]
    fn test_default_provider_used_when_unset() {
        let client = client(StaticCredentials::new(Provider::Anthropic).with_key(Provider::Anthropic, "k"));
        let request = CompletionRequest {
            system_prompt: "sys".into(),
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        };
        let prepared = client.prepare_stream(&request).unwrap();
        assert_eq!(prepared.provider, Provider::Anthropic);
        assert_eq!(prepared.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(prepared.body["system"], "sys");
    }

    #[test]
    fn test_preset_merge_and_field_naming() {
        let client = client(StaticCredentials::new(Provider::OpenAI).with_key(Provider::OpenAI, "k"));
        let request = CompletionRequest::new(Provider::OpenAI, "", vec![ChatMessage::user("hi")])
            .with_preset("precise")
            .with_config(GenerationParams {
                temperature: None,
                max_tokens: Some(77),
            });
        let prepared = client.prepare_stream(&request).unwrap();
        assert_eq!(prepared.body["max_completion_tokens"], 77);
        let temp = prepared.body["temperature"].as_f64().unwrap();
        assert!((temp - 0.2).abs() < 0.001);
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let client = client(StaticCredentials::new(Provider::OpenAI).with_key(Provider::OpenAI, "k"));
        let request = CompletionRequest::new(Provider::OpenAI, "", vec![]).with_preset("nope");
        assert!(matches!(
            client.prepare_stream(&request),
            Err(CompletionError::Configuration(_))
        ));
    }

    #[test]
    fn test_agent_local_defaults_model() {
        let agent = AgentConfig {
            provider: Provider::Local,
            provider_config: ProviderConfig {
                is_configured: true,
                api_key: String::new(),
                base_url: Some("http://h:1234".into()),
            },
            model: None,
            hyperparameters: Hyperparameters::default(),
        };
        let prepared = prepare_agent_call(&agent, "sys", &[ChatMessage::user("hi")]).unwrap();
        assert_eq!(prepared.model, "local-model");
        assert_eq!(prepared.url, "http://h:1234/v1/chat/completions");
        assert_eq!(prepared.body["model"], "local-model");
        assert!(prepared.body.get("stream").is_none());
    }

    #[test]
    fn test_unconfigured_agent_rejected() {
        let agent = AgentConfig {
            provider: Provider::Gemini,
            provider_config: ProviderConfig::default(),
            model: None,
            hyperparameters: Hyperparameters::default(),
        };
        assert!(matches!(
            prepare_agent_call(&agent, "", &[]),
            Err(CompletionError::Configuration(_))
        ));
    }
}
