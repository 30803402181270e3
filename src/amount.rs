use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Fixed-point money with 2 decimal places, stored as a count of minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    const SCALE: i64 = 100;

    pub const ZERO: Amount = Amount(0);

    /// Largest magnitude accepted for a single order amount (10 trillion).
    pub const MAX: Amount = Amount(1_000_000_000_000_000);

    /// Round a float to 2 decimals, half away from zero.
    pub fn from_float(value: f64) -> Self {
        Amount((value * Self::SCALE as f64).round() as i64)
    }

    /// Like [`Amount::from_float`], but `None` for non-finite or out-of-range input.
    pub fn checked_from_float(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Self::from_float(value)).filter(|a| a.in_range())
    }

    pub fn from_minor(value: i64) -> Self {
        Amount(value)
    }

    /// Within `-MAX..=MAX`.
    pub fn in_range(self) -> bool {
        self.0.unsigned_abs() <= Self::MAX.0 as u64
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Distance between two amounts, in minor units.
    pub fn distance(self, other: Amount) -> u64 {
        self.0.abs_diff(other.0)
    }

    /// `round2(self * percent / 100)`, rounding half away from zero.
    pub fn share(self, percent: Percent) -> Amount {
        let product = self.0 as i128 * percent.0 as i128;
        let divisor = Percent::WHOLE as i128;
        let half = divisor / 2;
        let rounded = if product >= 0 {
            (product + half) / divisor
        } else {
            (product - half) / divisor
        };
        Amount(rounded as i64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        let whole = abs / Self::SCALE;
        let frac = abs % Self::SCALE;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// Sum of many amounts, wide enough that adding order amounts never overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Total(i128);

impl From<Amount> for Total {
    fn from(amount: Amount) -> Self {
        Total(amount.0 as i128)
    }
}

impl PartialEq<Amount> for Total {
    fn eq(&self, other: &Amount) -> bool {
        self.0 == other.0 as i128
    }
}

impl fmt::Display for Total {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Amount::SCALE as u128;
        write!(f, "{sign}{}.{:02}", abs / scale, abs % scale)
    }
}

impl std::ops::Add for Total {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Total(self.0 + rhs.0)
    }
}

impl std::ops::Add<Amount> for Total {
    type Output = Self;

    fn add(self, rhs: Amount) -> Self::Output {
        self + Total::from(rhs)
    }
}

impl std::ops::AddAssign<Amount> for Total {
    fn add_assign(&mut self, rhs: Amount) {
        *self = *self + rhs;
    }
}

// Persisted documents hold plain decimal numbers.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Amount::from_float)
    }
}

/// A commission share in hundredths of a percent (100% = 10 000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percent(u32);

impl Percent {
    const SCALE: u32 = 100;
    const WHOLE: u32 = 100 * Self::SCALE;

    pub const ZERO: Percent = Percent(0);
    pub const HUNDRED: Percent = Percent(Self::WHOLE);

    /// Round a float percentage to 2 decimals. Negative input clamps to zero.
    pub fn from_float(value: f64) -> Self {
        Percent((value * Self::SCALE as f64).round().max(0.0) as u32)
    }

    pub fn whole(value: u32) -> Self {
        Percent(value * Self::SCALE)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `HUNDRED - self`, or `None` if `self` is above 100%.
    pub fn remainder_of_hundred(self) -> Option<Percent> {
        Self::WHOLE.checked_sub(self.0).map(Percent)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = self.0 % Self::SCALE;
        if frac == 0 {
            write!(f, "{whole}%")
        } else {
            write!(f, "{whole}.{frac:02}%")
        }
    }
}

impl std::ops::Add for Percent {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Percent(self.0 + rhs.0)
    }
}

impl Serialize for Percent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Percent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        f64::deserialize(deserializer).map(Percent::from_float)
    }
}
