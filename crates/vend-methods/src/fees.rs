//! Fee schedule calculation
//!
//! Pure computation over the method's configured schedule. The result is
//! clamped to `[min_fee, max_fee]` where those bounds are non-zero, floored
//! at zero, and capped at the charged amount so a fee can never exceed the
//! principal.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How the fee is derived from the amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    /// `amount * percentage / 100`
    Percentage,
    /// Flat `fixed`
    Fixed,
    /// `fixed + amount * percentage / 100`
    Mixed,
}

/// Fee configuration for one payment method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub mode: FeeMode,
    /// Percentage points (2 means 2%)
    pub percentage: Decimal,
    pub fixed: Decimal,
    /// Lower clamp; zero disables it
    pub min_fee: Decimal,
    /// Upper clamp; zero disables it
    pub max_fee: Decimal,
}

impl FeeSchedule {
    /// Schedule that charges nothing
    pub fn free() -> Self {
        Self {
            mode: FeeMode::Fixed,
            percentage: Decimal::ZERO,
            fixed: Decimal::ZERO,
            min_fee: Decimal::ZERO,
            max_fee: Decimal::ZERO,
        }
    }

    /// Plain percentage schedule
    pub fn percentage(pct: Decimal) -> Self {
        Self {
            mode: FeeMode::Percentage,
            percentage: pct,
            fixed: Decimal::ZERO,
            min_fee: Decimal::ZERO,
            max_fee: Decimal::ZERO,
        }
    }

    /// Calculate the fee for `amount`.
    pub fn calculate(&self, amount: Decimal) -> Decimal {
        let raw = match self.mode {
            FeeMode::Percentage => amount * self.percentage / dec!(100),
            FeeMode::Fixed => self.fixed,
            FeeMode::Mixed => self.fixed + amount * self.percentage / dec!(100),
        };

        let mut fee = raw;
        if self.min_fee > Decimal::ZERO && fee < self.min_fee {
            fee = self.min_fee;
        }
        if self.max_fee > Decimal::ZERO && fee > self.max_fee {
            fee = self.max_fee;
        }
        if fee < Decimal::ZERO {
            fee = Decimal::ZERO;
        }
        // Fee must never eat the full principal.
        if fee > amount {
            fee = amount;
        }
        fee
    }
}
