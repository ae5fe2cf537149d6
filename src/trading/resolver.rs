//! Per-symbol trading rules cache.
//!
//! Exchange filters change rarely, so resolved rules are kept for the
//! process lifetime. A filter-failure rejection from the exchange means the
//! cached rules went stale; the engine invalidates the pair and the next
//! invocation re-derives them.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::{ApiError, ExchangeApi, SymbolFilter, SymbolInfo};
use crate::error::ExecutionError;
use crate::models::SymbolRules;

pub struct RulesResolver {
    exchange: Arc<dyn ExchangeApi>,
    cache: RwLock<HashMap<String, SymbolRules>>,
}

impl RulesResolver {
    pub fn new(exchange: Arc<dyn ExchangeApi>) -> Self {
        Self {
            exchange,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Rules for a pair, from cache or freshly derived from exchange
    /// filter metadata.
    pub async fn resolve(&self, pair: &str) -> Result<SymbolRules, ExecutionError> {
        if let Some(rules) = self.cache.read().await.get(pair) {
            return Ok(*rules);
        }

        let info = self.exchange.symbol_info(pair).await.map_err(|e| {
            if e.is_unknown_symbol() {
                ExecutionError::SymbolNotFound(pair.to_string())
            } else {
                ExecutionError::Exchange(e)
            }
        })?;

        let rules = Self::derive(&info)?;
        debug!(
            pair = %pair,
            quantity_precision = rules.quantity_precision,
            price_precision = rules.price_precision,
            step = %rules.step_size,
            min_notional = %rules.min_notional,
            "symbol rules resolved"
        );

        self.cache.write().await.insert(pair.to_string(), rules);
        Ok(rules)
    }

    /// Drop cached rules for a pair so the next resolve re-reads filters.
    pub async fn invalidate(&self, pair: &str) {
        if self.cache.write().await.remove(pair).is_some() {
            info!(pair = %pair, "symbol rules invalidated");
        }
    }

    fn derive(info: &SymbolInfo) -> Result<SymbolRules, ExecutionError> {
        let mut lot: Option<(Decimal, Decimal)> = None;
        let mut tick_size = Decimal::ZERO;
        let mut min_notional = Decimal::ZERO;

        for filter in &info.filters {
            match filter {
                SymbolFilter::LotSize {
                    min_qty, step_size, ..
                } => lot = Some((*min_qty, *step_size)),
                SymbolFilter::PriceFilter { tick_size: t, .. } => tick_size = *t,
                SymbolFilter::MinNotional { min_notional: n }
                | SymbolFilter::Notional { min_notional: n } => min_notional = *n,
                SymbolFilter::Other => {}
            }
        }

        let (min_qty, step_size) = lot.ok_or_else(|| {
            ExecutionError::Exchange(ApiError::Decode(format!(
                "symbol {} has no LOT_SIZE filter",
                info.symbol
            )))
        })?;

        Ok(SymbolRules::derive(min_qty, tick_size, step_size, min_notional))
    }
}
