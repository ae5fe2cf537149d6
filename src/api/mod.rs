//! Exchange client: the `ExchangeApi` interface and its Binance
//! cross-margin implementation.

mod margin_client;
mod types;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{AccountSnapshot, Side};

pub use margin_client::BinanceMarginClient;
pub use types::{
    ApiErrorBody, ExchangeInfo, Fill, MarginAccountResponse, MarginOrder, MarginTransaction,
    MaxBorrowable, PriceIndex, SymbolFilter, SymbolInfo, UserAsset,
};

/// Rejection message the exchange uses for underfunded orders. The step-down
/// retry keys on this exact string; any replacement client must preserve it.
pub const INSUFFICIENT_BALANCE_MSG: &str =
    "Account has insufficient balance for requested action.";

/// Error code for an unknown trading pair.
pub const UNKNOWN_SYMBOL_CODE: i64 = -1121;

/// Failure of an exchange call.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The exchange accepted the request but rejected it with a reason.
    #[error("exchange rejected request: {message} (code {code})")]
    Rejected { code: i64, message: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The response body did not match the expected shape.
    #[error("unexpected exchange response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    /// The order was rejected because the account cannot fund it.
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(self, Self::Rejected { message, .. } if message == INSUFFICIENT_BALANCE_MSG)
    }

    /// The order violated a symbol filter, which means cached rules for the
    /// pair may be stale.
    pub fn is_filter_failure(&self) -> bool {
        matches!(self, Self::Rejected { message, .. } if message.starts_with("Filter failure"))
    }

    /// The requested pair is not listed.
    pub fn is_unknown_symbol(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code == UNKNOWN_SYMBOL_CODE)
    }
}

/// Operations the execution pipeline needs from the exchange.
///
/// Everything the engine does goes through this interface, so tests can
/// script an account without touching the network.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Filter metadata for a pair.
    async fn symbol_info(&self, pair: &str) -> Result<SymbolInfo, ApiError>;

    /// Fresh point-in-time read of the cross-margin account.
    async fn margin_account(&self) -> Result<AccountSnapshot, ApiError>;

    /// Current index price for a pair.
    async fn price_index(&self, pair: &str) -> Result<Decimal, ApiError>;

    /// Maximum amount of `asset` the account may currently borrow.
    async fn max_loan(&self, asset: &str) -> Result<Decimal, ApiError>;

    /// Borrow `amount` of `asset` against the account's collateral.
    async fn create_loan(&self, asset: &str, amount: Decimal) -> Result<(), ApiError>;

    /// Repay `amount` of a margin loan on `asset`.
    async fn repay_loan(&self, asset: &str, amount: Decimal) -> Result<(), ApiError>;

    /// Submit a margin market order and return the fill report.
    async fn market_order(
        &self,
        pair: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<MarginOrder, ApiError>;
}
