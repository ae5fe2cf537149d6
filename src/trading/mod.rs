//! Execution pipeline: configuration, rules cache, order executor,
//! transaction ledger, and the per-invocation engine.

mod config;
mod engine;
mod executor;
mod ledger;
mod reporter;
mod resolver;

#[cfg(test)]
pub use reporter::recording;

pub use config::{AppConfig, TradingConfig};
pub use engine::{Outcome, TradeEngine};
pub use executor::{OrderExecutor, OrderResult};
pub use ledger::TransactionLedger;
pub use reporter::{DiscordReporter, NullReporter, Reporter};
pub use resolver::RulesResolver;
