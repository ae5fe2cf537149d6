//! Error taxonomy for the execution pipeline.
//!
//! Loan and repay failures are reported and swallowed by the executor, so
//! they never appear here. Everything else flows up to the webhook handler,
//! which maps each tier to its response envelope.

use thiserror::Error;

use crate::api::ApiError;

/// Failures that terminate a webhook invocation.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Passphrase did not match the configured secret.
    #[error("access denied")]
    Authentication,

    /// The signal could not be normalized into a trade instruction.
    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    /// The guard threshold tripped: a position in this direction is already
    /// open, so the entry is refused before any account mutation.
    #[error("already in a trade")]
    AlreadyInTrade,

    /// The exchange does not list the requested pair.
    #[error("unknown symbol: {0}")]
    SymbolNotFound(String),

    /// The step-down retry loop hit its attempt cap without acceptance.
    #[error("order retry budget exhausted after {0} attempts")]
    OrderRetryExhausted(u32),

    /// Any other exchange failure during order submission.
    #[error(transparent)]
    Exchange(#[from] ApiError),
}
