//! Precision-safe decimal types for order sizing.
//!
//! Uses `rust_decimal` for exact decimal arithmetic so balance comparisons
//! and minimum-order checks never suffer floating-point rounding.

use rust_decimal::prelude::RoundingStrategy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;

/// Amount of quote currency (trade amount, balance, notional).
///
/// Wraps `Decimal` so amounts are never mixed with prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub Decimal);

impl Amount {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Notional exposure at the given leverage: `amount * leverage`.
    #[inline]
    pub fn notional(&self, leverage: u32) -> Amount {
        Self(self.0 * Decimal::from(leverage))
    }

    /// Round up to `dp` decimal places.
    ///
    /// Used when raising an amount to a minimum: rounding down could land
    /// just below the threshold.
    #[inline]
    pub fn ceil_dp(&self, dp: u32) -> Self {
        Self(self.0.round_dp_with_strategy(dp, RoundingStrategy::AwayFromZero))
    }

    /// Round down to `dp` decimal places.
    #[inline]
    pub fn floor_dp(&self, dp: u32) -> Self {
        Self(self.0.round_dp_with_strategy(dp, RoundingStrategy::ToZero))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Amount {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Amount {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl From<u32> for Amount {
    fn from(v: u32) -> Self {
        Self(Decimal::from(v))
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Amount {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Instrument price (entry, stop-loss, take-profit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notional_calculation() {
        let amount = Amount::new(dec!(5));
        assert_eq!(amount.notional(10), Amount::new(dec!(50)));
        assert_eq!(amount.notional(1), Amount::new(dec!(5)));
    }

    #[test]
    fn test_ceil_dp_never_rounds_below() {
        // 8 / 3 = 2.666..., rounded up to cents must still reach 8 at 3x
        let raw = Amount::new(dec!(8) / dec!(3));
        let ceiled = raw.ceil_dp(2);
        assert_eq!(ceiled, Amount::new(dec!(2.67)));
        assert!(ceiled.notional(3) >= Amount::new(dec!(8)));
    }

    #[test]
    fn test_floor_dp() {
        assert_eq!(
            Amount::new(dec!(12.349)).floor_dp(2),
            Amount::new(dec!(12.34))
        );
    }

    #[test]
    fn test_display_is_normalized() {
        assert_eq!(Amount::new(dec!(50.00)).to_string(), "50");
        assert_eq!(Price::new(dec!(64000.50)).to_string(), "64000.5");
    }

    #[test]
    fn test_positive_checks() {
        assert!(!Amount::ZERO.is_positive());
        assert!(!Amount::new(dec!(-1)).is_positive());
        assert!(Price::new(dec!(0.0001)).is_positive());
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(Amount::default(), Amount::ZERO);
        assert_eq!(Price::default(), Price::new(Decimal::ZERO));
    }
}
