//! Leveraged order execution: loan sizing, market-order submission with
//! insufficient-balance step-down, and loan repayment.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::api::{ApiError, ExchangeApi, MarginOrder};
use crate::error::ExecutionError;
use crate::models::{Side, SymbolRules};

use super::ledger::TransactionLedger;
use super::reporter::Reporter;

/// Terminal result of one order submission. `succeeded == false` is a
/// valid outcome (the order could not be placed), not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResult {
    pub side: Side,
    pub filled_quantity: Decimal,
    pub filled_price: Decimal,
    pub succeeded: bool,
}

impl OrderResult {
    fn filled(side: Side, order: &MarginOrder) -> Self {
        // Market fills report per-trade prices; take the first fill like a
        // ticker display would, falling back to the aggregate average.
        let (quantity, price) = match order.fills.first() {
            Some(fill) => (fill.qty, fill.price),
            None if !order.executed_qty.is_zero() => (
                order.executed_qty,
                order.cummulative_quote_qty / order.executed_qty,
            ),
            None => (Decimal::ZERO, Decimal::ZERO),
        };

        Self {
            side,
            filled_quantity: quantity,
            filled_price: price,
            succeeded: true,
        }
    }

    fn failed(side: Side) -> Self {
        Self {
            side,
            filled_quantity: Decimal::ZERO,
            filled_price: Decimal::ZERO,
            succeeded: false,
        }
    }
}

/// Executes loans, orders, and repayments against the exchange account.
pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeApi>,
    reporter: Arc<dyn Reporter>,
    max_retry_steps: u32,
}

impl OrderExecutor {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        reporter: Arc<dyn Reporter>,
        max_retry_steps: u32,
    ) -> Self {
        Self {
            exchange,
            reporter,
            max_retry_steps,
        }
    }

    /// Borrow `amount` of `asset`, capped at the currently permitted
    /// maximum. Best-effort: a failure is alerted and the invocation
    /// continues on whatever balance it has. Returns the granted amount.
    pub async fn take_loan(
        &self,
        asset: &str,
        amount: Decimal,
        ledger: &mut TransactionLedger,
    ) -> Decimal {
        match self.request_loan(asset, amount).await {
            Ok(granted) => {
                if granted > Decimal::ZERO {
                    ledger.record_loan(asset, granted);
                }
                granted
            }
            Err(e) => {
                warn!(asset = %asset, amount = %amount, error = %e, "loan request failed");
                self.reporter
                    .alert(&format!("{} during take loan", e))
                    .await;
                Decimal::ZERO
            }
        }
    }

    async fn request_loan(&self, asset: &str, amount: Decimal) -> Result<Decimal, ApiError> {
        let max = self.exchange.max_loan(asset).await?;
        let granted = amount.min(max);
        if granted <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }

        self.exchange.create_loan(asset, granted).await?;
        Ok(granted)
    }

    /// Repay a margin loan. Best-effort: a failure leaves the loan open,
    /// alerts, and lets the invocation continue.
    pub async fn repay_loan(&self, asset: &str, amount: Decimal, ledger: &mut TransactionLedger) {
        match self.exchange.repay_loan(asset, amount).await {
            Ok(()) => ledger.record_repay(asset, amount),
            Err(e) => {
                warn!(asset = %asset, amount = %amount, error = %e, "repay failed");
                self.reporter
                    .alert(&format!("{} during repay loan", e))
                    .await;
            }
        }
    }

    /// Round `quantity` to the symbol's precision and submit a market
    /// order.
    ///
    /// An insufficient-balance rejection retries with the quantity reduced
    /// by exactly one step, until the order is accepted or the quantity
    /// reaches zero (failed result). The attempt cap bounds the loop when
    /// `quantity / step` would make it effectively unbounded. Any other
    /// rejection is alerted and propagated.
    pub async fn submit_order(
        &self,
        pair: &str,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        rules: &SymbolRules,
    ) -> Result<OrderResult, ExecutionError> {
        let mut quantity = rules.round_quantity(quantity);

        if quantity <= Decimal::ZERO || !rules.meets_notional(quantity, price) {
            debug!(
                pair = %pair,
                quantity = %quantity,
                "abandoning order below minimum notional"
            );
            return Ok(OrderResult::failed(side));
        }

        let mut attempts = 0u32;
        loop {
            if attempts >= self.max_retry_steps {
                return Err(ExecutionError::OrderRetryExhausted(attempts));
            }
            attempts += 1;

            match self.exchange.market_order(pair, side, quantity).await {
                Ok(order) => {
                    debug!(pair = %pair, side = %side, quantity = %quantity, "order filled");
                    return Ok(OrderResult::filled(side, &order));
                }
                Err(e) if e.is_insufficient_balance() => {
                    quantity -= rules.step_size;
                    if quantity <= Decimal::ZERO {
                        warn!(pair = %pair, side = %side, "stepped down to zero, order failed");
                        return Ok(OrderResult::failed(side));
                    }
                    debug!(
                        pair = %pair,
                        quantity = %quantity,
                        attempt = attempts,
                        "insufficient balance, stepping order down"
                    );
                }
                Err(e) => {
                    self.reporter
                        .alert(&format!("{} during margin order", e))
                        .await;
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{Call, MockExchange};
    use crate::trading::reporter::recording::RecordingReporter;
    use rust_decimal_macros::dec;

    fn rules() -> SymbolRules {
        SymbolRules::derive(dec!(0.001), dec!(0.01), dec!(0.001), dec!(10))
    }

    fn executor(exchange: Arc<MockExchange>) -> (OrderExecutor, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        (
            OrderExecutor::new(exchange, reporter.clone(), 100),
            reporter,
        )
    }

    #[tokio::test]
    async fn test_order_fills_first_try() {
        let exchange = Arc::new(MockExchange::new().with_price(dec!(100)));
        let (executor, _) = executor(exchange.clone());

        let result = executor
            .submit_order("BTCUSDT", Side::Buy, dec!(2.0004), dec!(100), &rules())
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.filled_quantity, dec!(2));
        assert_eq!(result.filled_price, dec!(100));
        assert_eq!(exchange.order_attempts(), vec![dec!(2)]);
    }

    #[tokio::test]
    async fn test_step_down_retries_one_step_at_a_time() {
        // Only quantities at or below 1.997 are fundable.
        let exchange = Arc::new(
            MockExchange::new()
                .with_price(dec!(100))
                .with_affordable_quantity(dec!(1.997)),
        );
        let (executor, _) = executor(exchange.clone());

        let result = executor
            .submit_order("BTCUSDT", Side::Buy, dec!(2), dec!(100), &rules())
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.filled_quantity, dec!(1.997));
        assert_eq!(
            exchange.order_attempts(),
            vec![dec!(2), dec!(1.999), dec!(1.998), dec!(1.997)]
        );
    }

    #[tokio::test]
    async fn test_step_down_to_zero_returns_failed_result() {
        let exchange = Arc::new(
            MockExchange::new()
                .with_price(dec!(10000))
                .with_affordable_quantity(dec!(0)),
        );
        let (executor, _) = executor(exchange.clone());

        let result = executor
            .submit_order("BTCUSDT", Side::Sell, dec!(0.003), dec!(10000), &rules())
            .await
            .unwrap();

        assert!(!result.succeeded);
        // 0.003, 0.002, 0.001 all rejected; next step reaches zero.
        assert_eq!(
            exchange.order_attempts(),
            vec![dec!(0.003), dec!(0.002), dec!(0.001)]
        );
    }

    #[tokio::test]
    async fn test_retry_cap_exhausts() {
        let exchange = Arc::new(
            MockExchange::new()
                .with_price(dec!(100))
                .with_affordable_quantity(dec!(0)),
        );
        let reporter = Arc::new(RecordingReporter::new());
        let executor = OrderExecutor::new(exchange.clone(), reporter, 5);

        let err = executor
            .submit_order("BTCUSDT", Side::Buy, dec!(1), dec!(100), &rules())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::OrderRetryExhausted(5)));
        assert_eq!(exchange.order_attempts().len(), 5);
    }

    #[tokio::test]
    async fn test_non_insufficient_rejection_is_fatal_and_alerted() {
        let exchange = Arc::new(
            MockExchange::new()
                .with_price(dec!(100))
                .with_order_rejection(-1013, "Filter failure: LOT_SIZE"),
        );
        let (executor, reporter) = executor(exchange.clone());

        let err = executor
            .submit_order("BTCUSDT", Side::Buy, dec!(1), dec!(100), &rules())
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Exchange(_)));
        assert_eq!(exchange.order_attempts().len(), 1);
        assert_eq!(reporter.alerts().len(), 1);
        assert!(reporter.alerts()[0].contains("Filter failure"));
    }

    #[tokio::test]
    async fn test_below_notional_abandoned_without_submission() {
        let exchange = Arc::new(MockExchange::new().with_price(dec!(100)));
        let (executor, _) = executor(exchange.clone());

        let result = executor
            .submit_order("BTCUSDT", Side::Buy, dec!(0.05), dec!(100), &rules())
            .await
            .unwrap();

        assert!(!result.succeeded);
        assert!(exchange.order_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_take_loan_caps_at_maximum() {
        let exchange = Arc::new(MockExchange::new().with_max_loan(dec!(250)));
        let (executor, _) = executor(exchange.clone());
        let mut ledger = TransactionLedger::new();

        let granted = executor.take_loan("USDT", dec!(300), &mut ledger).await;

        assert_eq!(granted, dec!(250));
        assert!(exchange.calls().contains(&Call::CreateLoan {
            asset: "USDT".to_string(),
            amount: dec!(250),
        }));
        assert_eq!(ledger.entries()[1], "Borrowed 250 USDT");
    }

    #[tokio::test]
    async fn test_take_loan_failure_is_swallowed_and_alerted() {
        let exchange = Arc::new(
            MockExchange::new().with_loan_rejection(-3045, "The system does not have enough asset now."),
        );
        let (executor, reporter) = executor(exchange.clone());
        let mut ledger = TransactionLedger::new();

        let granted = executor.take_loan("USDT", dec!(300), &mut ledger).await;

        assert_eq!(granted, Decimal::ZERO);
        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(reporter.alerts().len(), 1);
        assert!(reporter.alerts()[0].contains("during take loan"));
    }

    #[tokio::test]
    async fn test_repay_failure_is_swallowed_and_alerted() {
        let exchange =
            Arc::new(MockExchange::new().with_repay_rejection(-3041, "Balance is not enough"));
        let (executor, reporter) = executor(exchange.clone());
        let mut ledger = TransactionLedger::new();

        executor.repay_loan("BTC", dec!(0.5), &mut ledger).await;

        assert_eq!(ledger.entries().len(), 1);
        assert_eq!(reporter.alerts().len(), 1);
        assert!(reporter.alerts()[0].contains("during repay loan"));
    }
}
