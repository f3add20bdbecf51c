pub mod ask;
pub mod init;
pub mod stream;

use anyhow::{anyhow, Result};
use chorus_llm::{ClientConfig, CompletionError, CredentialSource, GenerationParams, Provider};

use crate::cli::PromptArgs;

/// Provider named on the command line, else the config default
fn resolve_provider(args: &PromptArgs, config: &ClientConfig) -> Result<Provider> {
    let id = args
        .provider
        .clone()
        .unwrap_or_else(|| config.default_provider_id());
    Ok(id.parse::<Provider>()?)
}

fn overrides(args: &PromptArgs) -> Option<GenerationParams> {
    if args.temperature.is_none() && args.max_tokens.is_none() {
        return None;
    }
    Some(GenerationParams {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
    })
}

/// Attach the remediation hint, if any, to a completion error
fn report(err: CompletionError) -> anyhow::Error {
    match err.remediation() {
        Some(hint) => anyhow!("{}\nhint: {}", err, hint),
        None => anyhow!(err),
    }
}
