use anyhow::Result;
use chorus_llm::{ChatMessage, ClientConfig, CompletionClient, CompletionRequest, TokenCallback};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::info;

use super::{overrides, report, resolve_provider};
use crate::cli::PromptArgs;

/// Stream a completion, printing each delta as it arrives
pub async fn execute(args: PromptArgs, config: &ClientConfig) -> Result<()> {
    let provider = resolve_provider(&args, config)?;
    let client = CompletionClient::from_config(config.clone()).map_err(report)?;

    let mut request =
        CompletionRequest::new(provider, &args.system, vec![ChatMessage::user(&args.prompt)]);
    request.model = args.model.clone();
    request.preset = args.preset.clone();
    request.config = overrides(&args);

    let on_token: TokenCallback = Arc::new(|token: &str| {
        let mut stdout = io::stdout().lock();
        let _ = stdout.write_all(token.as_bytes());
        let _ = stdout.flush();
    });

    let retried = client
        .complete(&request, Some(on_token))
        .await
        .map_err(report)?;
    println!();

    let result = retried.value;
    info!(
        provider = %result.provider,
        model = %result.model,
        latency_ms = result.latency_ms,
        finish_reason = result.finish_reason.as_ref().map(|f| f.as_str()),
        "Stream finished"
    );
    if result.content.is_empty() {
        eprintln!("(empty response)");
    }
    Ok(())
}
