use crate::output;
use anyhow::Result;
use clap::Args;
use config::EnrichmentConfig;
use enrich_core::EnrichOptions;
use enrichment::EnrichmentInterceptor;

#[derive(Args)]
pub struct EnrichArgs {
    #[arg(help = "Message to enrich")]
    pub message: String,

    #[arg(long, help = "User the message belongs to")]
    pub user: Option<String>,

    #[arg(long, help = "Conversation the message belongs to")]
    pub conversation: Option<String>,

    #[arg(long, help = "Correlation id (generated when omitted)")]
    pub correlation_id: Option<String>,

    #[arg(long, help = "Language hint for retrieval")]
    pub language: Option<String>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool
}

impl EnrichArgs {
    /// Request options; the correlation id is fixed here so it can be
    /// printed alongside the result.
    pub fn options(&self) -> EnrichOptions {
        let mut options = EnrichOptions::new().with_correlation_id(
            self.correlation_id
                .clone()
                .unwrap_or_else(utils::generate_correlation_id)
        );
        if let Some(user) = &self.user {
            options = options.with_user(user.clone());
        }
        if let Some(conversation) = &self.conversation {
            options = options.with_conversation(conversation.clone());
        }
        if let Some(language) = &self.language {
            options = options.with_language(language.clone());
        }
        options
    }
}

pub async fn run(args: EnrichArgs, config: EnrichmentConfig) -> Result<()> {
    let interceptor = EnrichmentInterceptor::from_config(config)?;
    let options = args.options();
    let correlation_id = options.correlation_id.clone().unwrap_or_default();

    let context = interceptor.enrich(&args.message, &options).await?;

    if args.json {
        return output::json(&serde_json::json!({
            "correlation_id": correlation_id,
            "context": context
        }));
    }

    let Some(context) = context else {
        output::warn("No context for this message");
        output::hint("run `context-enrich health --probe <MESSAGE>` to see why");
        return Ok(());
    };

    output::header("Context");
    println!("{}", context.optimized_text);
    println!();
    output::subheader("Details:");
    output::field("correlation_id", &correlation_id);
    output::field("documents", &context.documents_included.to_string());
    output::field("tokens", &context.token_count.to_string());
    output::field("truncated", &context.truncated.to_string());
    output::field(
        "compression",
        &format!("{:.2}", context.compression_ratio)
    );
    if let Some(strategy) = context.strategy {
        output::field("strategy", &strategy.to_string());
    }
    Ok(())
}
