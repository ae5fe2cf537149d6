//! Incoming trading signal: webhook payload validation and normalization.

use serde::{Deserialize, Serialize};

use crate::error::ExecutionError;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Wire representation used by the exchange order endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the signal asks for beyond closing the opposing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// Close the opposing position (if any), then open a new one.
    Open,
    /// Only close the opposing position; no new entry.
    CloseOnly,
}

/// Raw webhook body as sent by the alerting platform.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub passphrase: String,
    pub strategy: StrategyFields,
    pub ticker: String,
    pub base_currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StrategyFields {
    pub order_action: String,
    pub order_comment: String,
}

/// A validated, normalized trade instruction. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct TradingSignal {
    pub side: Side,
    pub action: SignalAction,
    /// Exchange pair symbol, e.g. "BTCUSDT".
    pub pair: String,
    /// Traded asset, e.g. "BTC". Derived by stripping the base-currency
    /// suffix from the pair by length; a base_currency whose length does not
    /// match the actual suffix yields a wrong asset name.
    pub asset: String,
    /// Quote currency, e.g. "USDT".
    pub base: String,
}

impl TradingSignal {
    /// Validate a webhook payload against the configured passphrase and
    /// normalize it into a trade instruction.
    pub fn from_payload(
        payload: &WebhookPayload,
        passphrase: &str,
    ) -> Result<Self, ExecutionError> {
        if payload.passphrase != passphrase {
            return Err(ExecutionError::Authentication);
        }

        let side = match payload.strategy.order_action.to_uppercase().as_str() {
            "BUY" => Side::Buy,
            "SELL" => Side::Sell,
            other => return Err(ExecutionError::InvalidSignal(other.to_string())),
        };

        // An order comment repeating the side keyword means "open"; anything
        // else is a close-only instruction for the opposing position.
        let action = if payload
            .strategy
            .order_comment
            .eq_ignore_ascii_case(&payload.strategy.order_action)
        {
            SignalAction::Open
        } else {
            SignalAction::CloseOnly
        };

        let pair = payload.ticker.trim().to_uppercase();
        let base = payload.base_currency.trim().to_uppercase();

        let asset_len = pair
            .len()
            .checked_sub(base.len())
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ExecutionError::InvalidSignal(format!(
                    "ticker {} shorter than base currency {}",
                    pair, base
                ))
            })?;
        let asset = pair[..asset_len].to_string();

        Ok(Self {
            side,
            action,
            pair,
            asset,
            base,
        })
    }
}
