use crate::output;
use anyhow::{Result, bail};
use clap::Args;
use config::{EnrichmentConfig, validate_config};

#[derive(Args)]
pub struct ConfigCommandArgs {
    #[arg(long, help = "Output as JSON")]
    pub json: bool,

    #[arg(long, help = "Exit with an error when the configuration is invalid")]
    pub check: bool
}

pub fn run(args: ConfigCommandArgs, config: EnrichmentConfig) -> Result<()> {
    let validation = validate_config(&config);
    let shown = config.redacted();

    if args.json {
        output::json(&shown)?;
    } else {
        print_summary(&shown);
        println!();
        match &validation {
            Ok(()) => output::success("Configuration is valid"),
            Err(e) => output::warn(&format!("Configuration is invalid: {e}"))
        }
    }

    if args.check {
        if let Err(e) = validation {
            bail!("invalid configuration: {e}");
        }
    }
    Ok(())
}

fn print_summary(config: &EnrichmentConfig) {
    output::header("Enrichment Configuration");
    println!();
    output::field("enabled", &output::on_off(config.enabled).to_string());

    output::subheader("Retrieval:");
    output::field(
        "endpoint",
        config.retrieval.endpoint.as_deref().unwrap_or("(none)")
    );
    output::field(
        "auth_token",
        config.retrieval.auth_token.as_deref().unwrap_or("(none)")
    );
    output::field("top_k", &config.retrieval.top_k.to_string());

    output::subheader("Resilience:");
    output::field(
        "timeout_ms",
        &format!(
            "{} (min {}, max {})",
            config.timeout.default_ms, config.timeout.min_ms, config.timeout.max_ms
        )
    );
    output::field("max_attempts", &config.retry.max_attempts.to_string());
    output::field(
        "backoff_ms",
        &format!(
            "{}..{}",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        )
    );
    output::field(
        "breaker",
        &format!(
            "{} failures / {} ms reset",
            config.circuit_breaker.failure_threshold, config.circuit_breaker.reset_timeout_ms
        )
    );

    output::subheader("Pipeline:");
    output::field("threshold", &config.relevance.threshold.to_string());
    output::field(
        "token_budget",
        &format!("{} ({})", config.tokens.budget, config.tokens.strategy)
    );
    output::field("caching", &output::on_off(config.features.caching).to_string());
    output::field("audit_logging", &output::on_off(config.features.audit_logging).to_string());
    output::field("fallback", &output::on_off(config.features.fallback).to_string());
}
