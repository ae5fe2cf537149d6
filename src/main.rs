//! Webhook-driven leveraged margin execution service.
//!
//! Receives trading signals over HTTP, translates each into the
//! loan/order/repay sequence that moves a cross-margin account into the
//! requested position, and reports the transaction trail.

mod api;
mod error;
mod models;
mod server;
mod trading;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::BinanceMarginClient;
use crate::server::AppState;
use crate::trading::{
    AppConfig, DiscordReporter, NullReporter, Reporter, TradeEngine, TradingConfig,
};

/// Margin execution service CLI.
#[derive(Parser)]
#[command(name = "marginhook")]
#[command(about = "Execute webhook trading signals on a leveraged margin account", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,
    },

    /// Show the effective trading configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { bind } => {
            let config = AppConfig::from_env()?;

            let client = match &config.exchange_url {
                Some(url) => BinanceMarginClient::with_base_url(
                    &config.api_key,
                    &config.api_secret,
                    url.clone(),
                )?,
                None => BinanceMarginClient::new(&config.api_key, &config.api_secret)?,
            };
            let exchange = Arc::new(client);

            let reporter: Arc<dyn Reporter> = if config.report {
                Arc::new(DiscordReporter::new(
                    config.discord_error_url.clone(),
                    config.discord_transaction_url.clone(),
                )?)
            } else {
                Arc::new(NullReporter)
            };

            let engine = Arc::new(TradeEngine::new(
                exchange,
                reporter.clone(),
                config.trading.clone(),
            ));

            let state = Arc::new(AppState {
                engine,
                reporter,
                passphrase: config.passphrase.clone(),
            });

            info!(
                leverage = %config.trading.leverage,
                report = config.report,
                "starting margin execution service"
            );

            server::serve(bind, state).await?;
        }

        Commands::Config => {
            let (trading, report) = match AppConfig::from_env() {
                Ok(config) => (config.trading, config.report),
                Err(_) => (TradingConfig::default(), false),
            };

            println!("\n=== Trading Configuration ===\n");
            println!("Leverage:              {}x", trading.leverage);
            println!("Long Guard Threshold:  {}", trading.long_guard_threshold);
            println!("Short Guard Threshold: {}", trading.short_guard_threshold);
            println!("Max Retry Steps:       {}", trading.max_retry_steps);
            println!("Reporting:             {}", if report { "enabled" } else { "disabled" });
        }
    }

    Ok(())
}
