//! Builds the process configuration: defaults, then the config file, then
//! the environment, then command-line flags.

use anyhow::{Context, Result};
use clap::Args;
use config::{EnrichmentConfig, load_from_env, load_from_file, merge_configs};
use enrich_core::EventSink;
use observability::{MemorySink, RecordedEvent};
use std::path::PathBuf;

#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "CONTEXT_ENRICH_CONFIG",
        help = "Configuration file (.toml, .yaml or .yml)"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Retrieval service endpoint URL")]
    pub endpoint: Option<String>,

    #[arg(long, global = true, help = "Documents requested per query (1-50)")]
    pub top_k: Option<u32>,

    #[arg(long, global = true, help = "Token budget for the injected context")]
    pub token_budget: Option<u32>,

    #[arg(long, global = true, help = "Default retrieval timeout in milliseconds")]
    pub timeout_ms: Option<u64>,

    #[arg(long, global = true, help = "Minimum relevance score (0.0-1.0)")]
    pub threshold: Option<f64>,

    #[arg(long, global = true, help = "Cache optimized contexts")]
    pub caching: bool,

    #[arg(long, global = true, help = "Disable enrichment")]
    pub disable: bool,

    #[arg(long, global = true, help = "Log level (trace, debug, info, warn, error)")]
    pub log_level: Option<String>,

    #[arg(long, global = true, help = "Emit JSON log lines")]
    pub json_logs: bool
}

impl ConfigArgs {
    /// Flags as a configuration layer; `None` when no flag was given.
    pub fn overrides(&self) -> Option<EnrichmentConfig> {
        let mut config = EnrichmentConfig::default();
        let mut any = false;

        if let Some(endpoint) = &self.endpoint {
            config.retrieval.endpoint = Some(endpoint.clone());
            any = true;
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
            any = true;
        }
        if let Some(budget) = self.token_budget {
            config.tokens.budget = budget;
            any = true;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout.default_ms = timeout_ms;
            any = true;
        }
        if let Some(threshold) = self.threshold {
            config.relevance.threshold = threshold;
            any = true;
        }
        if self.caching {
            config.features.caching = true;
            any = true;
        }
        if self.disable {
            config.enabled = false;
            any = true;
        }
        if let Some(level) = &self.log_level {
            config.observability.logging_level = level.clone();
            any = true;
        }
        if self.json_logs {
            config.observability.json_logs = true;
            any = true;
        }

        any.then_some(config)
    }
}

/// Merged configuration plus the override events recorded while merging.
///
/// The events are kept until the subscriber exists, since the subscriber's
/// own settings come from this configuration.
pub struct Loaded {
    pub config: EnrichmentConfig,
    pub events: Vec<RecordedEvent>
}

impl Loaded {
    pub fn replay(&self, sink: &dyn EventSink) {
        for event in &self.events {
            let fields: Vec<(&str, String)> = event
                .fields
                .iter()
                .map(|(key, value)| (key.as_str(), value.clone()))
                .collect();
            sink.log(event.level, &event.message, &fields);
        }
    }
}

pub fn load(args: &ConfigArgs) -> Result<Loaded> {
    let file_config = match &args.config {
        Some(path) => load_from_file(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => EnrichmentConfig::default()
    };
    let env_config = load_from_env()
        .map_err(|e| anyhow::anyhow!("Invalid environment configuration: {e}"))?;

    let recorder = MemorySink::new();
    let config = merge_configs(
        EnrichmentConfig::default(),
        file_config,
        "file",
        env_config,
        "env",
        args.overrides(),
        "cli",
        &recorder
    );

    Ok(Loaded {
        config,
        events: recorder.events()
    })
}
