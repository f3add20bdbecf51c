use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chorus")]
#[command(about = "Chorus - streaming completion client for hosted and local LLMs", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

/// Options shared by `stream` and `ask`
#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    /// User message to send
    pub prompt: String,

    /// Provider id (openai, openrouter, local, anthropic, gemini); defaults to config
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name; defaults to the provider's configured model
    #[arg(long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(long, default_value = "")]
    pub system: String,

    /// Named sampling preset (precise, balanced, creative or one from config)
    #[arg(long)]
    pub preset: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "chorus.toml")]
        path: PathBuf,
    },
    /// Stream a completion to stdout as tokens arrive
    Stream {
        #[command(flatten)]
        args: PromptArgs,
    },
    /// Run a single non-streaming completion, retrying empty answers
    Ask {
        #[command(flatten)]
        args: PromptArgs,

        /// Print the full result and retry record as JSON
        #[arg(long)]
        json: bool,
    },
}
