use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use athena_core_sdk::{
    config::{self, FailurePolicy, ServerOptions, ServiceConfig},
    llm::{self, CompletionsClient},
    models::{GenerationParams, PromptRequest, DEFAULT_SYSTEM_MESSAGE},
    server, telemetry,
};

/**
 * \brief CLI entry point for the Athena chat relay.
 */
#[derive(Parser, Debug)]
#[command(name = "athena", version, about = "Athena chat relay")]
struct Cli {
    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Append relay events to logs/athena.log
    #[arg(long, global = true, default_value_t = false)]
    telemetry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief Start the HTTP relay.
     */
    Serve {
        #[arg(long, default_value = config::DEFAULT_ADDR, env = "ATHENA_ADDR")]
        addr: String,
        /// Report provider failures as HTTP 502 instead of an in-band apology
        #[arg(long, default_value_t = false, env = "ATHENA_STRICT_ERRORS")]
        strict_errors: bool,
    },

    /**
     * \brief Send one prompt to the provider and print the reply.
     */
    Ask {
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value_t = 1.0)]
        temperature: f32,
        #[arg(long, default_value_t = 1.0)]
        top_p: f32,
        #[arg(long, default_value = DEFAULT_SYSTEM_MESSAGE)]
        system: String,
    },

    /**
     * \brief Query /health on a running relay.
     */
    Health {
        #[arg(long, default_value = "http://127.0.0.1:5000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let telemetry_enabled = cli.telemetry
        || std::env::var(telemetry::TELEMETRY_ENV)
            .map(|v| telemetry::parse_switch(&v))
            .unwrap_or(false);
    telemetry::set_enabled(telemetry_enabled);

    match cli.command {
        Commands::Serve {
            addr,
            strict_errors,
        } => {
            let config = ServiceConfig::from_env().context("load provider config failed")?;
            let mut options = ServerOptions::default()
                .with_addr(&addr)
                .context("parse listen address failed")?;
            if strict_errors {
                options.failure_policy = FailurePolicy::Status;
            }
            tracing::info!("Starting the server...");
            server::run(Arc::new(config), options).await?;
        }
        Commands::Ask {
            prompt,
            temperature,
            top_p,
            system,
        } => {
            let config = ServiceConfig::from_env().context("load provider config failed")?;
            let client = CompletionsClient::new(Arc::new(config))
                .context("build provider client failed")?;
            let params = GenerationParams {
                temperature,
                top_p,
                system_message: system,
            };
            let request =
                PromptRequest::new(prompt, params).context("No prompt provided")?;

            telemetry::log_event(
                "cli.ask",
                &format!(
                    "model={} prompt_len={}",
                    client.config().model,
                    request.prompt.len()
                ),
            );

            let reply = llm::generate(&client, &request)
                .await
                .context("generation failed")?;
            println!("{}", reply.text);
        }
        Commands::Health { url } => {
            let endpoint = format!("{}/health", url.trim_end_matches('/'));
            let resp = reqwest::get(&endpoint)
                .await
                .with_context(|| format!("GET {} failed", endpoint))?;
            let status = resp.status();
            let body: serde_json::Value = resp.json().await.context("decode health payload failed")?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            if !status.is_success() {
                anyhow::bail!("health check returned {}", status);
            }
        }
    }

    Ok(())
}
