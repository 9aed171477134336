use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use relay_core::{GenerateRequest, Orchestrator, RelayConfig};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser)]
#[command(name = "relay")]
#[command(version)]
#[command(about = "Relay: completions with ordered fallback across AI providers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which providers are enabled, in fallback order
    Status,

    /// Send a one-shot prompt through the fallback chain
    Ask {
        /// The prompt to send
        prompt: String,

        /// System prompt sent ahead of the user prompt
        #[arg(long)]
        system: Option<String>,

        #[arg(long)]
        max_tokens: Option<u32>,

        #[arg(long)]
        temperature: Option<f32>,
    },

    /// Ask for a JSON answer and print the extracted value
    Structured {
        /// The prompt to send
        prompt: String,

        /// Schema text embedded verbatim in the instructions
        #[arg(long)]
        schema: Option<String>,
    },

    /// Show current configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for results
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Status => cmd_status(&cfg),
        Commands::Config => cmd_config(&cfg),
        Commands::Ask {
            prompt,
            system,
            max_tokens,
            temperature,
        } => {
            let request = GenerateRequest {
                prompt,
                max_tokens,
                temperature,
                system_prompt: system,
            };
            cmd_ask(&cfg, request).await
        }
        Commands::Structured { prompt, schema } => {
            cmd_structured(&cfg, &prompt, schema.as_deref()).await
        }
    }
}

fn cmd_status(cfg: &RelayConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(cfg)?;
    for (position, descriptor) in orchestrator.registry().list_providers().iter().enumerate() {
        println!(
            "{}. {:<14} {:<10} {:>6}ms  {}",
            position + 1,
            descriptor.display_name,
            if descriptor.enabled { "enabled" } else { "disabled" },
            descriptor.timeout_ms,
            descriptor.id
        );
    }
    if orchestrator.registry().enabled_count() == 0 {
        warn!("No provider has credentials; set OPENAI_API_KEY, GEMINI_API_KEY or PERPLEXITY_API_KEY");
    }
    Ok(())
}

fn cmd_config(cfg: &RelayConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(&config::masked(cfg))?);
    Ok(())
}

async fn cmd_ask(cfg: &RelayConfig, request: GenerateRequest) -> Result<()> {
    let orchestrator = Orchestrator::from_config(cfg)?;
    let cancel = cancel_on_ctrl_c();

    let response = orchestrator
        .generate_text_with_cancel(request, &cancel)
        .await
        .context("Completion failed")?;

    info!(
        "Answered by {} ({}), tokens used: {}",
        response.provider,
        response.model,
        response
            .tokens_used
            .map_or_else(|| "unknown".to_string(), |t| t.to_string())
    );
    println!("{}", response.content);
    Ok(())
}

async fn cmd_structured(cfg: &RelayConfig, prompt: &str, schema: Option<&str>) -> Result<()> {
    let orchestrator = Orchestrator::from_config(cfg)?;
    let cancel = cancel_on_ctrl_c();

    let response = orchestrator
        .generate_structured_with_cancel(prompt, schema, &cancel)
        .await
        .context("Structured generation failed")?;

    info!("Structured answer from {}", response.provider);
    println!("{}", serde_json::to_string_pretty(&response.data)?);
    Ok(())
}

/// Token that fires on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling request");
            token.cancel();
        }
    });
    cancel
}
