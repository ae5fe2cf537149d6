//! Per-invocation execution pipeline.
//!
//! Drives the position transition for one validated signal: close the
//! opposing position, take a loan, open the requested position, and flush
//! the transaction trail. Invocations for the same pair are serialized;
//! different pairs run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ExchangeApi};
use crate::error::ExecutionError;
use crate::models::{PositionInfo, Side, SignalAction, SymbolRules, TradingSignal};

use super::config::TradingConfig;
use super::executor::{OrderExecutor, OrderResult};
use super::ledger::TransactionLedger;
use super::reporter::Reporter;
use super::resolver::RulesResolver;

/// Terminal state of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Opposing position (if any) closed and a new position opened.
    Opened(OrderResult),
    /// Only the opposing position was closed; no new entry was requested.
    ClosedOnly,
    /// The entry order was rejected irrecoverably.
    Failed,
}

pub struct TradeEngine {
    exchange: Arc<dyn ExchangeApi>,
    reporter: Arc<dyn Reporter>,
    resolver: RulesResolver,
    executor: OrderExecutor,
    config: TradingConfig,
    pair_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TradeEngine {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        reporter: Arc<dyn Reporter>,
        config: TradingConfig,
    ) -> Self {
        Self {
            resolver: RulesResolver::new(exchange.clone()),
            executor: OrderExecutor::new(
                exchange.clone(),
                reporter.clone(),
                config.max_retry_steps,
            ),
            exchange,
            reporter,
            config,
            pair_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one signal to its terminal state.
    pub async fn execute(&self, signal: &TradingSignal) -> Result<Outcome, ExecutionError> {
        // Serialize mutations per pair so concurrent signals cannot race on
        // the same free balance.
        let lock = self.pair_lock(&signal.pair).await;
        let _guard = lock.lock().await;

        let rules = self.resolver.resolve(&signal.pair).await?;
        let mut ledger = TransactionLedger::new();

        let outcome = match signal.side {
            Side::Buy => self.run_buy(signal, &rules, &mut ledger).await,
            Side::Sell => self.run_sell(signal, &rules, &mut ledger).await,
        };

        match &outcome {
            Ok(Outcome::Opened(order)) => {
                info!(
                    pair = %signal.pair,
                    side = %signal.side,
                    quantity = %order.filled_quantity,
                    price = %order.filled_price,
                    "position opened"
                );
                ledger.flush(self.reporter.as_ref()).await;
            }
            Ok(Outcome::ClosedOnly) => {
                info!(pair = %signal.pair, side = %signal.side, "opposing position closed");
                ledger.flush(self.reporter.as_ref()).await;
            }
            Ok(Outcome::Failed) => {
                warn!(pair = %signal.pair, side = %signal.side, "entry order failed");
                let direction = match signal.side {
                    Side::Buy => "Long",
                    Side::Sell => "Short",
                };
                self.reporter
                    .alert(&format!("{} failed on {}!", direction, signal.pair))
                    .await;
            }
            Err(ExecutionError::Exchange(e)) if e.is_filter_failure() => {
                // Cached precision no longer matches the exchange.
                self.resolver.invalidate(&signal.pair).await;
            }
            Err(_) => {}
        }

        outcome
    }

    /// Buy side: buy back and repay any open short, then optionally open a
    /// leveraged long.
    async fn run_buy(
        &self,
        signal: &TradingSignal,
        rules: &SymbolRules,
        ledger: &mut TransactionLedger,
    ) -> Result<Outcome, ExecutionError> {
        let snapshot = self.exchange.margin_account().await?;
        let position = PositionInfo::classify(&snapshot, &signal.asset, &signal.base);
        debug!(
            pair = %signal.pair,
            state = ?position.position(),
            snapshot_at = %snapshot.taken_at,
            "account classified"
        );
        let opening = signal.action == SignalAction::Open;

        if opening && position.borrowed_base > self.config.long_guard_threshold {
            return Err(ExecutionError::AlreadyInTrade);
        }

        // An outstanding asset loan means a short is open: buy it back and
        // repay before anything else.
        if position.borrowed_asset > Decimal::ZERO {
            let price = self.fetch_price(&signal.pair).await?;
            if rules.meets_notional(position.borrowed_asset, price) {
                let close = self
                    .executor
                    .submit_order(&signal.pair, Side::Buy, position.borrowed_asset, price, rules)
                    .await?;
                if !close.succeeded {
                    return Ok(Outcome::Failed);
                }
                ledger.record_order(&close, &signal.asset);
                self.executor
                    .repay_loan(&signal.asset, position.borrowed_asset, ledger)
                    .await;
            }
        }

        if !opening {
            return Ok(Outcome::ClosedOnly);
        }

        // Size the loan from the post-close balance, never the stale read.
        let snapshot = self.exchange.margin_account().await?;
        let position = PositionInfo::classify(&snapshot, &signal.asset, &signal.base);
        let loan = position.free_base * self.config.leverage;
        self.executor.take_loan(&signal.base, loan, ledger).await;

        // The loan changed the account (and may have been capped); spend
        // what is actually there.
        let snapshot = self.exchange.margin_account().await?;
        let funds = PositionInfo::classify(&snapshot, &signal.asset, &signal.base).free_base;
        let price = self.fetch_price(&signal.pair).await?;
        let quantity = funds / price;

        let order = self
            .executor
            .submit_order(&signal.pair, Side::Buy, quantity, price, rules)
            .await?;
        if order.succeeded {
            ledger.record_order(&order, &signal.asset);
            Ok(Outcome::Opened(order))
        } else {
            Ok(Outcome::Failed)
        }
    }

    /// Sell side: sell any long holdings and repay the quote loan behind
    /// them, then optionally borrow the asset and sell it to open a short.
    async fn run_sell(
        &self,
        signal: &TradingSignal,
        rules: &SymbolRules,
        ledger: &mut TransactionLedger,
    ) -> Result<Outcome, ExecutionError> {
        let snapshot = self.exchange.margin_account().await?;
        let position = PositionInfo::classify(&snapshot, &signal.asset, &signal.base);
        debug!(
            pair = %signal.pair,
            state = ?position.position(),
            snapshot_at = %snapshot.taken_at,
            "account classified"
        );
        let opening = signal.action == SignalAction::Open;

        if opening && position.borrowed_asset > self.config.short_guard_threshold {
            return Err(ExecutionError::AlreadyInTrade);
        }

        if position.free_asset > Decimal::ZERO {
            let price = self.fetch_price(&signal.pair).await?;
            if rules.meets_notional(position.free_asset, price) {
                let close = self
                    .executor
                    .submit_order(&signal.pair, Side::Sell, position.free_asset, price, rules)
                    .await?;
                if !close.succeeded {
                    return Ok(Outcome::Failed);
                }
                ledger.record_order(&close, &signal.asset);
                if position.borrowed_base > Decimal::ZERO {
                    self.executor
                        .repay_loan(&signal.base, position.borrowed_base, ledger)
                        .await;
                }
            }
        }

        if !opening {
            return Ok(Outcome::ClosedOnly);
        }

        let snapshot = self.exchange.margin_account().await?;
        let position = PositionInfo::classify(&snapshot, &signal.asset, &signal.base);
        let price = self.fetch_price(&signal.pair).await?;
        let quantity =
            (position.free_base + position.free_base * self.config.leverage) / price;

        // Borrow the asset and sell it; the step-down retry absorbs a
        // capped loan.
        self.executor
            .take_loan(&signal.asset, quantity, ledger)
            .await;

        let order = self
            .executor
            .submit_order(&signal.pair, Side::Sell, quantity, price, rules)
            .await?;
        if order.succeeded {
            ledger.record_order(&order, &signal.asset);
            Ok(Outcome::Opened(order))
        } else {
            Ok(Outcome::Failed)
        }
    }

    async fn fetch_price(&self, pair: &str) -> Result<Decimal, ExecutionError> {
        let price = self.exchange.price_index(pair).await?;
        if price <= Decimal::ZERO {
            return Err(ExecutionError::Exchange(ApiError::Decode(format!(
                "nonpositive index price for {}",
                pair
            ))));
        }
        Ok(price)
    }

    async fn pair_lock(&self, pair: &str) -> Arc<Mutex<()>> {
        let mut locks = self.pair_locks.lock().await;
        locks.entry(pair.to_string()).or_default().clone()
    }
}
