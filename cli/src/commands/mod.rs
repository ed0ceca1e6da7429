pub mod enrich;
pub mod health;
pub mod inject;
pub mod show_config;

use crate::settings::ConfigArgs;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "context-enrich",
    author,
    version,
    about = "Enrich outbound messages with knowledge-base context",
    long_about = "Runs the context enrichment pipeline against a retrieval service.\n\nConfiguration \
                  is read from defaults, then --config, then EN_*/RT_*/RS_*/OB_* environment \
                  variables, then command-line flags."
)]
pub struct Cli {
    #[command(flatten)]
    pub settings: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Print the context retrieved for a message")]
    Enrich(enrich::EnrichArgs),

    #[command(about = "Print a conversation with the context injected")]
    Inject(inject::InjectArgs),

    #[command(about = "Show pipeline and resilience health")]
    Health(health::HealthArgs),

    #[command(about = "Show the effective configuration (token masked)")]
    Config(show_config::ConfigCommandArgs)
}
