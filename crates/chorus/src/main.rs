mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    chorus_llm::init_logging();

    let cli = Cli::parse();

    // init writes the config, so it must not need one
    if let Commands::Init { path } = &cli.command {
        return commands::init::run_init(path);
    }

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Stream { args } => commands::stream::execute(args, &config).await?,
        Commands::Ask { args, json } => commands::ask::execute(args, json, &config).await?,
    }

    Ok(())
}
