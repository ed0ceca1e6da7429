use crate::output;
use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};
use config::EnrichmentConfig;
use enrich_core::EnrichOptions;
use enrichment::{EnrichmentInterceptor, ServiceStatus};

#[derive(Args)]
pub struct HealthArgs {
    #[arg(long, help = "Enrich this message first so the report reflects a live call")]
    pub probe: Option<String>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool
}

pub async fn run(args: HealthArgs, config: EnrichmentConfig) -> Result<()> {
    let interceptor = EnrichmentInterceptor::from_config(config)?;

    if let Some(message) = &args.probe {
        let context = interceptor
            .enrich_message(message, &EnrichOptions::new())
            .await;
        if !args.json {
            match context {
                Some(_) => output::success("Probe returned context"),
                None => output::warn("Probe returned no context")
            }
        }
    }

    let health = interceptor.health_check();

    if args.json {
        return output::json(&serde_json::json!({
            "health": health,
            "performance": interceptor.get_performance_summary()
        }));
    }

    output::header("Enrichment Health");
    println!();
    output::field("status", &status_label(health.status).to_string());
    output::field("enabled", &output::on_off(health.enabled).to_string());
    output::field("retrieval_client", &health.retrieval_client);
    output::field("cache_entries", &health.cache.entries.to_string());

    if let Some(resilience) = &health.resilience {
        println!();
        output::subheader("Circuit breakers:");
        if resilience.breakers.is_empty() {
            println!("  {}", "(none yet)".dimmed());
        }
        for breaker in &resilience.breakers {
            output::field(
                &breaker.name,
                &format!(
                    "{} (failures {}, rejected {})",
                    breaker.state, breaker.failure_count, breaker.rejected_requests
                )
            );
        }

        println!();
        output::subheader("Resilience:");
        output::field("operations", &resilience.retry.operations.to_string());
        output::field("retries", &resilience.retry.retries.to_string());
        output::field("timeouts", &resilience.timeouts.timed_out_operations.to_string());
        output::field("fallbacks", &resilience.fallbacks.to_string());
    }

    Ok(())
}

fn status_label(status: ServiceStatus) -> ColoredString {
    match status {
        ServiceStatus::Healthy => "healthy".green(),
        ServiceStatus::Degraded => "degraded".yellow(),
        ServiceStatus::Unhealthy => "unhealthy".red(),
        ServiceStatus::Disabled => "disabled".dimmed()
    }
}
