//! Wire types for the Binance cross-margin REST API.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Response from /api/v3/exchangeInfo.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

/// Filter metadata for one trading pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub filters: Vec<SymbolFilter>,
}

/// Per-pair trading constraint. Only the filters the sizing logic consumes
/// are modeled; the rest deserialize to `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "filterType")]
pub enum SymbolFilter {
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        min_qty: Decimal,
        max_qty: Decimal,
        step_size: Decimal,
    },

    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter {
        min_price: Decimal,
        max_price: Decimal,
        tick_size: Decimal,
    },

    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: Decimal },

    // Spot symbols migrated from MIN_NOTIONAL to NOTIONAL; both occur.
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: Decimal },

    #[serde(other)]
    Other,
}

/// Response from /sapi/v1/margin/account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAccountResponse {
    pub user_assets: Vec<UserAsset>,
}

/// One asset row of the margin account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAsset {
    pub asset: String,
    pub free: Decimal,
    pub borrowed: Decimal,
}

/// Response from /sapi/v1/margin/priceIndex.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceIndex {
    pub price: Decimal,
}

/// Response from /sapi/v1/margin/maxBorrowable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaxBorrowable {
    pub amount: Decimal,
}

/// Response from /sapi/v1/margin/loan and /repay.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginTransaction {
    pub tran_id: u64,
}

/// Response from /sapi/v1/margin/order (FULL response type).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginOrder {
    pub symbol: String,
    pub order_id: u64,
    pub side: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub cummulative_quote_qty: Decimal,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

/// Partial fill of a market order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub price: Decimal,
    pub qty: Decimal,
}

/// Error body the exchange returns on rejected requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}
