//! Symbol trading rules derived from exchange filter metadata.
//!
//! Precision is counted in decimal shifts from the minimum lot (or tick)
//! size: positive precision allows that many fractional digits, negative
//! precision requires rounding to a power-of-ten integer (-2 means the
//! nearest 100).

use rust_decimal::Decimal;

/// Per-symbol quantity and price constraints. Immutable once resolved;
/// refreshed only through the resolver's cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolRules {
    /// Fractional digits allowed for order quantities (negative: the
    /// quantity must be a multiple of `10^-precision`).
    pub quantity_precision: i32,

    /// Fractional digits allowed for prices.
    pub price_precision: i32,

    /// Minimum lot increment; also the decrement used by the
    /// insufficient-balance retry.
    pub step_size: Decimal,

    /// Minimum order value in the quote currency.
    pub min_notional: Decimal,
}

impl SymbolRules {
    /// Derive rules from raw filter values: the minimum lot quantity, the
    /// price tick size, the lot increment, and the minimum notional.
    pub fn derive(
        min_quantity: Decimal,
        tick_size: Decimal,
        step_size: Decimal,
        min_notional: Decimal,
    ) -> Self {
        Self {
            quantity_precision: precision_of(min_quantity),
            price_precision: precision_of(tick_size),
            step_size,
            min_notional,
        }
    }

    /// Round an order quantity to this symbol's precision: standard rounding
    /// for fractional precision, floor to the power-of-ten multiple for
    /// negative precision.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.quantity_precision >= 0 {
            quantity.round_dp(self.quantity_precision as u32)
        } else {
            let modulus = Decimal::from(10_i64.pow((-self.quantity_precision) as u32));
            (quantity / modulus).floor() * modulus
        }
    }

    /// Whether an order of `quantity` at `price` clears the minimum notional.
    pub fn meets_notional(&self, quantity: Decimal, price: Decimal) -> bool {
        quantity * price >= self.min_notional
    }
}

/// Count decimal shifts until the value crosses 1.
///
/// Values below 1 shift left (positive precision), values above 1
/// floor-divide by 10 (negative precision). A value of exactly 1 allows
/// whole units only.
fn precision_of(value: Decimal) -> i32 {
    if value <= Decimal::ZERO {
        return 0;
    }

    let mut v = value;
    let mut precision = 0;

    if v < Decimal::ONE {
        while v < Decimal::ONE {
            v *= Decimal::TEN;
            precision += 1;
        }
    } else if v > Decimal::ONE {
        while v > Decimal::ONE {
            v = (v / Decimal::TEN).floor();
            precision -= 1;
        }
    }

    precision
}
