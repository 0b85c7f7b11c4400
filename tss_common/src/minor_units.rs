use std::{fmt::Display, iter::Sum, ops::{Add, Mul}};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const GBP_CURRENCY_CODE: &str = "GBP";
pub const GBP_CURRENCY_CODE_LOWER: &str = "gbp";

//--------------------------------------     MinorUnits       --------------------------------------------------------
/// An amount of currency in integer minor units (pence). All monetary arithmetic in the settlement
/// engine is integer-only; there is deliberately no floating-point constructor.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

impl Mul<i64> for MinorUnits {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MinorUnits {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MinorUnits {}

impl TryFrom<u64> for MinorUnits {
    type Error = MinorUnitsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MinorUnitsConversionError(format!("Value {} is too large to convert to MinorUnits", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}£{}.{:02}", abs / 100, abs % 100)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_pounds(pounds: i64) -> Self {
        Self(pounds * 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Renders the amount as a bare two-decimal string, e.g. `12.50`, for template substitution.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(MinorUnits::from(1250).to_string(), "£12.50");
        assert_eq!(MinorUnits::from(5).to_string(), "£0.05");
        assert_eq!(MinorUnits::from(-305).to_string(), "-£3.05");
        assert_eq!(MinorUnits::from(1800).to_decimal_string(), "18.00");
    }

    #[test]
    fn arithmetic() {
        let a = MinorUnits::from(500);
        let b = MinorUnits::from(120);
        assert_eq!(a + b, MinorUnits::from(620));
        assert_eq!(a - b, MinorUnits::from(380));
        assert_eq!(b * 3, MinorUnits::from(360));
        let total: MinorUnits = vec![a, b, MinorUnits::from(80)].into_iter().sum();
        assert_eq!(total, MinorUnits::from(700));
    }
}
