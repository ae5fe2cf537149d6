//! Data models for signals, symbol rules, and account state.

mod account;
mod rules;
mod signal;

pub use account::{AccountSnapshot, AssetBalance, Position, PositionInfo};
pub use rules::SymbolRules;
pub use signal::{Side, SignalAction, StrategyFields, TradingSignal, WebhookPayload};
