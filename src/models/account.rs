//! Margin account snapshot and position classification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Free and borrowed amounts for one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetBalance {
    pub free: Decimal,
    pub borrowed: Decimal,
}

/// Point-in-time view of the margin account.
///
/// Every mutating call (loan, order, repay) invalidates prior snapshots, so
/// the engine re-reads the account instead of reusing one across a mutation.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub taken_at: DateTime<Utc>,
    balances: HashMap<String, AssetBalance>,
}

impl AccountSnapshot {
    pub fn new(balances: HashMap<String, AssetBalance>) -> Self {
        Self {
            taken_at: Utc::now(),
            balances,
        }
    }

    /// Balance for an asset; assets the account has never touched read as
    /// zero rather than missing.
    pub fn balance(&self, asset: &str) -> AssetBalance {
        self.balances.get(asset).copied().unwrap_or_default()
    }
}

/// Direction of the currently open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Flat,
    /// Holding the asset, financed by borrowed quote currency.
    Long,
    /// Sold borrowed asset, to be bought back cheaper.
    Short,
}

/// Balances relevant to one trading pair, extracted from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionInfo {
    pub free_asset: Decimal,
    pub borrowed_asset: Decimal,
    pub free_base: Decimal,
    pub borrowed_base: Decimal,
}

impl PositionInfo {
    /// Classify the account state for one pair. Pure over the snapshot:
    /// identical inputs always produce identical output.
    pub fn classify(snapshot: &AccountSnapshot, asset: &str, base: &str) -> Self {
        let asset_balance = snapshot.balance(asset);
        let base_balance = snapshot.balance(base);

        Self {
            free_asset: asset_balance.free,
            borrowed_asset: asset_balance.borrowed,
            free_base: base_balance.free,
            borrowed_base: base_balance.borrowed,
        }
    }

    /// Derived position direction. A borrowed asset means an open short; a
    /// borrowed quote currency means a leveraged long.
    pub fn position(&self) -> Position {
        if self.borrowed_asset > Decimal::ZERO {
            Position::Short
        } else if self.borrowed_base > Decimal::ZERO {
            Position::Long
        } else {
            Position::Flat
        }
    }
}
