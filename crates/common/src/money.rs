use serde::{Deserialize, Serialize};

/// Money amount held in integer minor units (e.g. paise, cents).
///
/// Prices and totals never pass through floating point, so a total
/// captured at checkout is exactly the sum of its line subtotals.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units (1250 = 12.50).
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates an amount from whole major units.
    pub fn from_major(major: i64) -> Self {
        Self(major * 100)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion.
    pub fn major_part(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor-unit remainder after the major part.
    pub fn minor_part(&self) -> i64 {
        self.0.abs() % 100
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, returning `None` on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    /// Adds another amount, returning `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}.{:02}", self.major_part().abs(), self.minor_part())
        } else {
            write!(f, "{}.{:02}", self.major_part(), self.minor_part())
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
