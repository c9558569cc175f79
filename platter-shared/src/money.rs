//! Fixed-precision currency amounts.
//!
//! Every amount is held as a [`Decimal`] rounded to two places. Gateways that
//! work in minor units (kobo, cents) go through [`Money::from_minor`] and
//! [`Money::to_minor`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

const SCALE: u32 = 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Invalid amount: {0}")]
    Invalid(String),
    #[error("Amount out of range")]
    OutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    /// Whole currency units, e.g. `Money::from_major(10)` is 10.00
    pub fn from_major(units: i64) -> Self {
        Self::new(Decimal::from(units))
    }

    /// Minor units (cents/kobo), e.g. `Money::from_minor(1050)` is 10.50
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, SCALE))
    }

    pub fn to_minor(self) -> Result<i64, MoneyError> {
        (self.0 * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or(MoneyError::OutOfRange)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.0 * Decimal::from(quantity))
    }

    /// Share kept by the vendor after the platform takes `rate_percent`.
    pub fn after_commission(self, rate_percent: Decimal) -> Self {
        let retained = Decimal::ONE - rate_percent / Decimal::ONE_HUNDRED;
        Self::new(self.0 * retained)
    }

    /// `None` when the sum leaves `Decimal`'s range
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Self::new)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Self::new)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn non_negative(self) -> Self {
        if self.is_negative() {
            Self::ZERO
        } else {
            self
        }
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim())
            .map(Self::new)
            .map_err(|_| MoneyError::Invalid(s.to_string()))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::new(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money::new(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = *self - rhs;
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_units() {
        let price = Money::from_minor(1050);
        assert_eq!(price.to_string(), "10.50");
        assert_eq!(price.to_minor().unwrap(), 1050);
        assert_eq!(Money::from_major(25).to_minor().unwrap(), 2500);
    }

    #[test]
    fn test_rounds_to_two_places() {
        let m: Money = "3.335".parse().unwrap();
        assert_eq!(m.to_string(), "3.34");
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn test_line_total_and_sum() {
        let lines = [Money::from_major(10).times(2), Money::from_major(5).times(1)];
        let total: Money = lines.iter().sum();
        assert_eq!(total, Money::from_major(25));
    }

    #[test]
    fn test_commission() {
        let subtotal = Money::from_major(20);
        assert_eq!(subtotal.after_commission(Decimal::new(10, 0)), Money::from_major(18));
        assert_eq!(subtotal.after_commission(Decimal::ZERO), subtotal);
        assert_eq!(
            Money::from_minor(999).after_commission(Decimal::new(125, 1)),
            "8.74".parse().unwrap()
        );
    }

    #[test]
    fn test_non_negative_clamp() {
        let negative = Money::from_major(5) - Money::from_major(8);
        assert!(negative.is_negative());
        assert_eq!(negative.non_negative(), Money::ZERO);
        assert!(!Money::ZERO.is_negative());
    }

    #[test]
    fn test_checked_arithmetic_at_range_edge() {
        let max = Money::new(Decimal::MAX);
        assert_eq!(max.checked_add(Money::from_major(1)), None);
        assert_eq!(Money::new(Decimal::MIN).checked_sub(Money::from_major(1)), None);
        assert_eq!(
            Money::from_minor(150).checked_add(Money::from_minor(250)),
            Some(Money::from_major(4))
        );
        assert_eq!(
            Money::from_major(4).checked_sub(Money::from_minor(50)),
            Some(Money::from_minor(350))
        );
    }

    #[test]
    fn test_serde_as_decimal_string() {
        let m = Money::from_minor(2050);
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"20.50\"");
        let parsed: Money = serde_json::from_str("\"12.345\"").unwrap();
        assert_eq!(parsed.to_string(), "12.35");
    }
}
