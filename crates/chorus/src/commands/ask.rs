use anyhow::{bail, Result};
use chorus_llm::llm::resolve_params;
use chorus_llm::{
    AgentConfig, ChatMessage, ClientConfig, CompletionClient, CredentialSource, Hyperparameters,
    Provider, ProviderConfig,
};
use serde_json::json;
use tracing::info;

use super::{overrides, report, resolve_provider};
use crate::cli::PromptArgs;

/// Build the single-shot agent settings from config plus flags
fn agent_config(args: &PromptArgs, config: &ClientConfig, provider: Provider) -> Result<AgentConfig> {
    let presets = config.preset_table();
    let preset = match args.preset.as_deref() {
        Some(name) => match presets.get(name) {
            Some(p) => Some(*p),
            None => bail!("Unknown preset '{}'", name),
        },
        None => None,
    };
    let params = resolve_params(preset.as_ref(), overrides(args).as_ref());

    let api_key = config.api_key(provider).unwrap_or_default();
    Ok(AgentConfig {
        provider,
        provider_config: ProviderConfig {
            is_configured: !api_key.is_empty() || !provider.requires_api_key(),
            api_key,
            base_url: config.base_url(provider),
        },
        model: args
            .model
            .clone()
            .or_else(|| Some(config.default_model(provider))),
        hyperparameters: Hyperparameters {
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        },
    })
}

/// Run one non-streaming completion under the empty-result retry policy
pub async fn execute(args: PromptArgs, json_output: bool, config: &ClientConfig) -> Result<()> {
    let provider = resolve_provider(&args, config)?;
    let agent = agent_config(&args, config, provider)?;
    let client = CompletionClient::from_config(config.clone()).map_err(report)?;

    let retried = client
        .call_with_retry(&agent, &args.system, &[ChatMessage::user(&args.prompt)])
        .await
        .map_err(report)?;

    info!(
        provider = %retried.value.provider,
        model = %retried.value.model,
        attempts = retried.record.attempts,
        latency_ms = retried.value.latency_ms,
        "Completion finished"
    );

    if json_output {
        let out = json!({
            "result": retried.value,
            "retry": retried.record,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", retried.value.content);
    }
    Ok(())
}
