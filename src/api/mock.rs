//! Scripted in-memory exchange for tests.
//!
//! Simulates a margin account that mutates on loans, repayments, and fills,
//! and records every call so tests can assert on the exact sequence of
//! operations an invocation performed.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{AccountSnapshot, AssetBalance, Side};

use super::types::*;
use super::{ApiError, ExchangeApi, INSUFFICIENT_BALANCE_MSG};

/// One recorded exchange call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SymbolInfo,
    Account,
    Price,
    MaxLoan { asset: String },
    CreateLoan { asset: String, amount: Decimal },
    RepayLoan { asset: String, amount: Decimal },
    Order { side: Side, quantity: Decimal },
}

struct MockState {
    balances: HashMap<String, AssetBalance>,
    price: Decimal,
    max_loan: Decimal,
    /// Orders above this quantity are rejected for insufficient balance.
    affordable_quantity: Option<Decimal>,
    /// Every order is rejected with this (code, message) when set.
    order_rejection: Option<(i64, String)>,
    /// Loan creation is rejected with this (code, message) when set.
    loan_rejection: Option<(i64, String)>,
    /// Repayment is rejected with this (code, message) when set.
    repay_rejection: Option<(i64, String)>,
    calls: Vec<Call>,
    next_order_id: u64,
}

pub struct MockExchange {
    min_qty: Decimal,
    step_size: Decimal,
    tick_size: Decimal,
    min_notional: Decimal,
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            min_qty: dec!(0.00001),
            step_size: dec!(0.00001),
            tick_size: dec!(0.01),
            min_notional: dec!(10),
            state: Mutex::new(MockState {
                balances: HashMap::new(),
                price: dec!(20000),
                max_loan: dec!(1000000),
                affordable_quantity: None,
                order_rejection: None,
                loan_rejection: None,
                repay_rejection: None,
                calls: Vec::new(),
                next_order_id: 1,
            }),
        }
    }

    pub fn with_lot(mut self, min_qty: Decimal, step_size: Decimal) -> Self {
        self.min_qty = min_qty;
        self.step_size = step_size;
        self
    }

    pub fn with_min_notional(mut self, min_notional: Decimal) -> Self {
        self.min_notional = min_notional;
        self
    }

    pub fn with_balance(self, asset: &str, free: Decimal, borrowed: Decimal) -> Self {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert(asset.to_string(), AssetBalance { free, borrowed });
        self
    }

    pub fn with_price(self, price: Decimal) -> Self {
        self.state.lock().unwrap().price = price;
        self
    }

    pub fn with_max_loan(self, max_loan: Decimal) -> Self {
        self.state.lock().unwrap().max_loan = max_loan;
        self
    }

    pub fn with_affordable_quantity(self, quantity: Decimal) -> Self {
        self.state.lock().unwrap().affordable_quantity = Some(quantity);
        self
    }

    pub fn with_order_rejection(self, code: i64, message: &str) -> Self {
        self.state.lock().unwrap().order_rejection = Some((code, message.to_string()));
        self
    }

    pub fn with_loan_rejection(self, code: i64, message: &str) -> Self {
        self.state.lock().unwrap().loan_rejection = Some((code, message.to_string()));
        self
    }

    pub fn with_repay_rejection(self, code: i64, message: &str) -> Self {
        self.state.lock().unwrap().repay_rejection = Some((code, message.to_string()));
        self
    }

    /// Every call recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded order attempts, in order.
    pub fn order_attempts(&self) -> Vec<Decimal> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Order { quantity, .. } => Some(quantity),
                _ => None,
            })
            .collect()
    }

    /// Whether any account-mutating call was recorded.
    pub fn mutated(&self) -> bool {
        self.calls().iter().any(|c| {
            matches!(
                c,
                Call::CreateLoan { .. } | Call::RepayLoan { .. } | Call::Order { .. }
            )
        })
    }

    pub fn balance(&self, asset: &str) -> AssetBalance {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(asset)
            .copied()
            .unwrap_or_default()
    }

    fn split_pair(pair: &str) -> (String, String) {
        // Test pairs are always quoted in USDT.
        let asset = pair.trim_end_matches("USDT").to_string();
        (asset, "USDT".to_string())
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn symbol_info(&self, pair: &str) -> Result<SymbolInfo, ApiError> {
        self.state.lock().unwrap().calls.push(Call::SymbolInfo);

        Ok(SymbolInfo {
            symbol: pair.to_string(),
            filters: vec![
                SymbolFilter::PriceFilter {
                    min_price: self.tick_size,
                    max_price: dec!(1000000),
                    tick_size: self.tick_size,
                },
                SymbolFilter::LotSize {
                    min_qty: self.min_qty,
                    max_qty: dec!(9000000),
                    step_size: self.step_size,
                },
                SymbolFilter::Notional {
                    min_notional: self.min_notional,
                },
            ],
        })
    }

    async fn margin_account(&self) -> Result<AccountSnapshot, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Account);
        Ok(AccountSnapshot::new(state.balances.clone()))
    }

    async fn price_index(&self, _pair: &str) -> Result<Decimal, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Price);
        Ok(state.price)
    }

    async fn max_loan(&self, asset: &str) -> Result<Decimal, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::MaxLoan {
            asset: asset.to_string(),
        });
        Ok(state.max_loan)
    }

    async fn create_loan(&self, asset: &str, amount: Decimal) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateLoan {
            asset: asset.to_string(),
            amount,
        });

        if let Some((code, msg)) = state.loan_rejection.clone() {
            return Err(ApiError::rejected(code, msg));
        }

        let balance = state.balances.entry(asset.to_string()).or_default();
        balance.free += amount;
        balance.borrowed += amount;
        Ok(())
    }

    async fn repay_loan(&self, asset: &str, amount: Decimal) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::RepayLoan {
            asset: asset.to_string(),
            amount,
        });

        if let Some((code, msg)) = state.repay_rejection.clone() {
            return Err(ApiError::rejected(code, msg));
        }

        let balance = state.balances.entry(asset.to_string()).or_default();
        balance.free -= amount;
        balance.borrowed -= amount;
        Ok(())
    }

    async fn market_order(
        &self,
        pair: &str,
        side: Side,
        quantity: Decimal,
    ) -> Result<MarginOrder, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Order { side, quantity });

        if let Some((code, msg)) = state.order_rejection.clone() {
            return Err(ApiError::rejected(code, msg));
        }

        if let Some(affordable) = state.affordable_quantity {
            if quantity > affordable {
                return Err(ApiError::rejected(-2010, INSUFFICIENT_BALANCE_MSG));
            }
        }

        let price = state.price;
        let (asset, base) = Self::split_pair(pair);
        let notional = quantity * price;

        match side {
            Side::Buy => {
                state.balances.entry(asset).or_default().free += quantity;
                state.balances.entry(base).or_default().free -= notional;
            }
            Side::Sell => {
                state.balances.entry(asset).or_default().free -= quantity;
                state.balances.entry(base).or_default().free += notional;
            }
        }

        let order_id = state.next_order_id;
        state.next_order_id += 1;

        Ok(MarginOrder {
            symbol: pair.to_string(),
            order_id,
            side: side.as_str().to_string(),
            status: "FILLED".to_string(),
            executed_qty: quantity,
            cummulative_quote_qty: notional,
            fills: vec![Fill { price, qty: quantity }],
        })
    }
}
