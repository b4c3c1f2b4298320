use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Neg, Sub},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

/// The currency assumed when a provider object does not name one.
pub const DEFAULT_CURRENCY: &str = "usd";

//--------------------------------------       Cents         ---------------------------------------------------------
/// An amount in the smallest unit of its currency, exactly as the provider reports it.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Cents(i64);

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct CentsConversionError(String);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for Cents {
    type Error = CentsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| CentsConversionError(format!("Value {value} is too large to convert to Cents")))
    }
}

impl Add for Cents {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Cents::from(500).to_string(), "5.00");
        assert_eq!(Cents::from(7).to_string(), "0.07");
        assert_eq!(Cents::from(-1234).to_string(), "-12.34");
    }

    #[test]
    fn conversion_from_u64() {
        assert_eq!(Cents::try_from(42u64).unwrap(), Cents::from(42));
        assert!(Cents::try_from(u64::MAX).is_err());
    }

    #[test]
    fn arithmetic() {
        let total: Cents = [Cents::from(100), Cents::from(250), -Cents::from(50)].into_iter().sum();
        assert_eq!(total, Cents::from(300));
        assert_eq!(Cents::from(300) - Cents::from(300), Cents::default());
    }

    #[test]
    fn serializes_as_plain_integer() {
        assert_eq!(serde_json::to_string(&Cents::from(500)).unwrap(), "500");
        let c: Cents = serde_json::from_str("1999").unwrap();
        assert_eq!(c.value(), 1999);
    }
}
