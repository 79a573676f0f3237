//! Money in integer minor currency units.

use serde::{Deserialize, Serialize};

const BASIS_POINTS: i64 = 10_000;

/// Money amount represented in minor units (poisha) to avoid floating point issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    minor: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub fn from_minor(minor: i64) -> Self {
        Self { minor }
    }

    /// Creates a new Money amount from whole major units, saturating at the
    /// representable range.
    pub fn from_major(major: i64) -> Self {
        Self {
            minor: major.saturating_mul(100),
        }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { minor: 0 }
    }

    /// Returns the amount in minor units.
    pub fn minor(&self) -> i64 {
        self.minor
    }

    /// Returns the whole major-unit portion.
    pub fn major(&self) -> i64 {
        self.minor / 100
    }

    /// Returns the minor-unit remainder after the major portion.
    pub fn minor_part(&self) -> i64 {
        self.minor.abs() % 100
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.minor.checked_add(rhs.minor).map(Money::from_minor)
    }

    /// Multiplies by a quantity, or `None` on overflow.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.minor
            .checked_mul(i64::from(quantity))
            .map(Money::from_minor)
    }

    /// Returns `bps` basis points of this amount, rounded half up, or `None`
    /// if the result does not fit.
    pub fn checked_basis_points(&self, bps: u32) -> Option<Money> {
        let scaled = i128::from(self.minor) * i128::from(bps);
        let rounded = (scaled + i128::from(BASIS_POINTS / 2)).div_euclid(i128::from(BASIS_POINTS));
        i64::try_from(rounded).ok().map(Money::from_minor)
    }

    /// Sums amounts, or `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.minor < 0 {
            write!(f, "-৳{}.{:02}", self.major().abs(), self.minor_part())
        } else {
            write!(f, "৳{}.{:02}", self.major(), self.minor_part())
        }
    }
}
