//! Amount types for Vend
//!
//! All money values are `rust_decimal::Decimal`. The engine never re-derives
//! an order's charge from current method configuration; the breakdown
//! snapshotted at order creation is the source of truth for what was charged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Snapshot of what a buyer is charged: subtotal, fees, and their sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBreakdown {
    /// Sum of line item prices
    pub subtotal: Decimal,
    /// Method fee applied at selection time
    pub fees: Decimal,
    /// Always `subtotal + fees`
    pub total: Decimal,
}

impl AmountBreakdown {
    /// Build a breakdown; total is derived, never supplied.
    pub fn new(subtotal: Decimal, fees: Decimal) -> Self {
        Self {
            subtotal,
            fees,
            total: subtotal + fees,
        }
    }

    /// Breakdown with no fee component
    pub fn fee_free(subtotal: Decimal) -> Self {
        Self::new(subtotal, Decimal::ZERO)
    }

    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    /// Check the core money invariant: `total == subtotal + fees`
    pub fn is_consistent(&self) -> bool {
        self.total == self.subtotal + self.fees
    }
}

impl Default for AmountBreakdown {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for AmountBreakdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (subtotal {} + fees {})",
            self.total, self.subtotal, self.fees
        )
    }
}
