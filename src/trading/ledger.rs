//! Invocation-scoped transaction ledger.
//!
//! Each webhook invocation owns exactly one ledger; it is never shared
//! across concurrent invocations. Records accumulate in order and are
//! flushed to the reporter once, only when the invocation reaches a
//! successful terminal state.

use chrono::Local;
use rust_decimal::Decimal;

use crate::models::Side;

use super::executor::OrderResult;
use super::reporter::Reporter;

/// Ordered trail of every meaningful action taken in one invocation.
#[derive(Debug)]
pub struct TransactionLedger {
    entries: Vec<String>,
}

impl TransactionLedger {
    /// Open a ledger with a timestamp header.
    pub fn new() -> Self {
        Self {
            entries: vec![format!(
                "Time: {}",
                Local::now().format("%m/%d/%Y, %H:%M:%S")
            )],
        }
    }

    pub fn record_loan(&mut self, asset: &str, amount: Decimal) {
        self.entries
            .push(format!("Borrowed {} {}", amount.normalize(), asset));
    }

    pub fn record_repay(&mut self, asset: &str, amount: Decimal) {
        self.entries
            .push(format!("Repaid {} {}", amount.normalize(), asset));
    }

    pub fn record_order(&mut self, order: &OrderResult, asset: &str) {
        let side = match order.side {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        };
        let notional = (order.filled_quantity * order.filled_price).round_dp(2);
        self.entries.push(format!(
            "{} {} {} for ${} (${})",
            side,
            order.filled_quantity.normalize(),
            asset,
            order.filled_price.normalize(),
            notional
        ));
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Deliver every record to the reporter, in order. Consumes the ledger:
    /// a flush can only happen once.
    pub async fn flush(self, reporter: &dyn Reporter) {
        for entry in &self.entries {
            reporter.transaction(entry).await;
        }
    }
}
