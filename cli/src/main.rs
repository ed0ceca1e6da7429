use anyhow::Result;
use clap::Parser;
use observability::{TracingSink, init_subscriber};

mod commands;
mod output;
mod settings;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = settings::load(&cli.settings)?;
    if let Err(e) = init_subscriber(&loaded.config.observability) {
        output::warn(&format!("Logging disabled: {e}"));
    }
    loaded.replay(&TracingSink);
    let config = loaded.config;
    tracing::debug!(
        enabled = config.enabled,
        endpoint = config.retrieval.endpoint.as_deref().unwrap_or("-"),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Enrich(args) => commands::enrich::run(args, config).await,
        Commands::Inject(args) => commands::inject::run(args, config).await,
        Commands::Health(args) => commands::health::run(args, config).await,
        Commands::Config(args) => commands::show_config::run(args, config)
    }
}
