use crate::output;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use config::EnrichmentConfig;
use enrich_core::{EnrichOptions, Message};
use enrichment::{EnrichmentInterceptor, inject_context};

#[derive(Args)]
pub struct InjectArgs {
    #[arg(help = "User message that starts the conversation")]
    pub message: String,

    #[arg(long = "system", help = "System message placed before the user message (repeatable)")]
    pub system: Vec<String>,

    #[arg(long, help = "User the message belongs to")]
    pub user: Option<String>,

    #[arg(long, help = "Output as JSON")]
    pub json: bool
}

impl InjectArgs {
    pub fn conversation(&self) -> Vec<Message> {
        self.system
            .iter()
            .map(Message::system)
            .chain(std::iter::once(Message::user(self.message.as_str())))
            .collect()
    }
}

pub async fn run(args: InjectArgs, config: EnrichmentConfig) -> Result<()> {
    let interceptor = EnrichmentInterceptor::from_config(config)?;
    let mut options = EnrichOptions::new();
    if let Some(user) = &args.user {
        options = options.with_user(user.clone());
    }

    let context = interceptor.enrich_message(&args.message, &options).await;
    let messages = inject_context(&args.conversation(), context.as_deref());

    if args.json {
        return output::json(&messages);
    }

    if context.is_none() {
        output::info("No context retrieved; conversation unchanged");
    }
    for message in &messages {
        println!("{}", format!("[{}]", message.role).bold());
        println!("{}", message.content);
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrich_core::MessageRole;

    #[test]
    fn test_conversation_puts_system_messages_first() {
        let args = InjectArgs {
            message: "Refund timing?".to_string(),
            system: vec!["You are helpful.".to_string(), "Be brief.".to_string()],
            user: None,
            json: true
        };
        let messages = args.conversation();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].is_system() && messages[1].is_system());
        assert_eq!(messages[2].role, MessageRole::User);
        assert_eq!(messages[2].content, "Refund timing?");
    }
}
