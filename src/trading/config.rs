//! Runtime configuration, loaded once at process start.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Position-transition policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Loan multiplier applied to the free quote balance when opening.
    pub leverage: Decimal,

    /// Borrowed-quote amount above which a Buy entry is treated as an
    /// already-open long and refused.
    pub long_guard_threshold: Decimal,

    /// Borrowed-asset amount above which a Sell entry is treated as an
    /// already-open short and refused.
    pub short_guard_threshold: Decimal,

    /// Hard cap on insufficient-balance step-down attempts per order.
    pub max_retry_steps: u32,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            leverage: dec!(3),
            long_guard_threshold: dec!(10),
            short_guard_threshold: dec!(3),
            max_retry_steps: 100,
        }
    }
}

/// Full process configuration: exchange credentials, webhook secret, and
/// reporting targets, sourced from the environment.
#[derive(Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub api_secret: String,
    /// Exchange REST base URL; overridable for testing.
    pub exchange_url: Option<String>,

    /// Shared secret every webhook payload must carry.
    pub passphrase: String,

    /// Master switch for outbound reports.
    pub report: bool,
    pub discord_error_url: String,
    pub discord_transaction_url: String,

    pub trading: TradingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables (a .env file is read
    /// first if present).
    ///
    /// Required: `BINANCE_API_KEY`, `BINANCE_API_SECRET`,
    /// `WEBHOOK_PASSPHRASE`. Reporting requires the two Discord webhook
    /// URLs when `REPORT` is enabled.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("BINANCE_API_KEY").context("BINANCE_API_KEY not set")?;
        let api_secret =
            std::env::var("BINANCE_API_SECRET").context("BINANCE_API_SECRET not set")?;
        let exchange_url = std::env::var("BINANCE_BASE_URL").ok();

        let passphrase =
            std::env::var("WEBHOOK_PASSPHRASE").context("WEBHOOK_PASSPHRASE not set")?;

        let report = std::env::var("REPORT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let (discord_error_url, discord_transaction_url) = if report {
            (
                std::env::var("DISCORD_ERROR_WEBHOOK")
                    .context("DISCORD_ERROR_WEBHOOK not set")?,
                std::env::var("DISCORD_TRANSACTION_WEBHOOK")
                    .context("DISCORD_TRANSACTION_WEBHOOK not set")?,
            )
        } else {
            (String::new(), String::new())
        };

        let mut trading = TradingConfig::default();
        if let Ok(v) = std::env::var("LEVERAGE") {
            trading.leverage = v.parse().context("invalid LEVERAGE")?;
        }
        if let Ok(v) = std::env::var("LONG_GUARD_THRESHOLD") {
            trading.long_guard_threshold = v.parse().context("invalid LONG_GUARD_THRESHOLD")?;
        }
        if let Ok(v) = std::env::var("SHORT_GUARD_THRESHOLD") {
            trading.short_guard_threshold =
                v.parse().context("invalid SHORT_GUARD_THRESHOLD")?;
        }
        if let Ok(v) = std::env::var("MAX_RETRY_STEPS") {
            trading.max_retry_steps = v.parse().context("invalid MAX_RETRY_STEPS")?;
        }

        Ok(Self {
            api_key,
            api_secret,
            exchange_url,
            passphrase,
            report,
            discord_error_url,
            discord_transaction_url,
            trading,
        })
    }
}
