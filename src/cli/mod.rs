//! Command-line tools for operating the proxy: the batch embedding
//! processor and configuration inspection.

use clap::{Parser, Subcommand};

use crate::config::{AppConfig, EmbeddingProviderKind};
use crate::proxy::forwarder::Forwarder;
use crate::services::ai::provider_from_config;
use crate::services::embedding_job::{self, BATCH_LIMIT};

#[derive(Parser)]
#[command(name = "voicenotes")]
#[command(about = "VoiceNotes CLI - embedding processor and proxy tooling")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Generate embeddings for completed notes that lack one")]
    Embed {
        #[arg(long, help = "Embedding provider override: openai or gemini")]
        provider: Option<String>,

        #[arg(long, default_value_t = BATCH_LIMIT, help = "Maximum notes to process")]
        limit: usize,

        #[arg(long, help = "Generate embeddings without writing anything back")]
        dry_run: bool,
    },

    #[command(about = "Print the resolved configuration with secrets redacted")]
    Config,
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Embed { provider, limit, dry_run } => {
            embed_command(provider, limit, dry_run, cli.json).await
        }
        Commands::Config => config_command(cli.json),
    }
}

async fn embed_command(
    provider_override: Option<String>,
    limit: usize,
    dry_run: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = AppConfig::from_env()?;

    if let Some(raw) = provider_override {
        config.ai.provider = match raw.to_lowercase().as_str() {
            "openai" => EmbeddingProviderKind::OpenAi,
            "gemini" => EmbeddingProviderKind::Gemini,
            other => anyhow::bail!("unknown provider '{other}' (expected openai or gemini)"),
        };
    }

    let provider = provider_from_config(&config.ai).ok_or_else(|| {
        anyhow::anyhow!("no API key configured for the selected embedding provider")
    })?;
    let forwarder = Forwarder::new(&config.upstream)?;

    let report = embedding_job::run(&forwarder, provider.as_ref(), limit, dry_run).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "fetched": report.fetched,
                "processed": report.processed,
                "failed": report.failed,
                "skipped": report.skipped,
                "dry_run": dry_run,
            })
        );
    } else {
        println!("Fetched:   {}", report.fetched);
        println!("Processed: {}", report.processed);
        println!("Failed:    {}", report.failed);
        println!("Skipped:   {}", report.skipped);
        if dry_run {
            println!("(dry run - nothing was written)");
        }
    }

    if report.failed > 0 {
        anyhow::bail!("{} notes failed to process", report.failed);
    }
    Ok(())
}

fn config_command(json: bool) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?.redacted();

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("Upstream:        {}", config.upstream.base_url);
        println!("Timeout:         {}s", config.upstream.timeout_secs);
        println!("Allowed tables:  {:?}", config.policy.allowed_tables);
        println!("Denied tables:   {:?}", config.policy.denied_tables);
        println!("Blocked ops:     {:?}", config.policy.blocked_operations);
        println!(
            "Rate limit:      {} ({} req / {}s)",
            if config.rate_limit.enabled { "on" } else { "off" },
            config.rate_limit.requests,
            config.rate_limit.window_secs
        );
        println!("AI provider:     {:?}", config.ai.provider);
        println!("Chat model:      {}", config.ai.chat_model);
        println!("AI configured:   {}", config.ai.is_configured());
    }
    Ok(())
}
