//! Money in integer minor currency units.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis points in one whole (100%).
const BPS_SCALE: i128 = 10_000;

/// Money amount in minor currency units (paise, cents).
///
/// Never floating point: fee and refund arithmetic stay exact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates an amount from minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Subtracts two amounts, returning `None` on overflow.
    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Returns `bps` basis points of this amount, rounded half up.
    ///
    /// 200 bps of 1000 is 20. Computed in i128 so large amounts cannot overflow
    /// the intermediate product.
    pub fn percent_bps(&self, bps: u32) -> Money {
        let product = self.0 as i128 * bps as i128;
        let rounded = if product >= 0 {
            (product + BPS_SCALE / 2) / BPS_SCALE
        } else {
            (product - BPS_SCALE / 2) / BPS_SCALE
        };
        Money(rounded as i64)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

/// Error returned for currency codes the engine does not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported currency: {0}")]
pub struct CurrencyError(pub String);

/// ISO 4217 currencies accepted for payment orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Inr,
    Usd,
    Eur,
    Gbp,
    Aed,
    Sgd,
}

impl Currency {
    /// Returns the ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Aed => "AED",
            Currency::Sgd => "SGD",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = CurrencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::Inr),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            "AED" => Ok(Currency::Aed),
            "SGD" => Ok(Currency::Sgd),
            _ => Err(CurrencyError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_amount() {
        assert_eq!(Money::from_minor(1000).percent_bps(200), Money::from_minor(20));
        assert_eq!(Money::from_minor(1000).percent_bps(0), Money::zero());
        assert_eq!(Money::from_minor(999).percent_bps(150), Money::from_minor(15));
        // 0.5 rounds up
        assert_eq!(Money::from_minor(50).percent_bps(100), Money::from_minor(1));
    }

    #[test]
    fn percent_does_not_overflow_large_amounts() {
        let amount = Money::from_minor(i64::MAX / 2);
        assert!(amount.percent_bps(10_000).is_positive());
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(250);
        assert_eq!((a + b).minor_units(), 1250);
        assert_eq!((a - b).minor_units(), 750);
        assert_eq!(Money::from_minor(i64::MAX).checked_add(b), None);
        let total: Money = [a, b, b].into_iter().sum();
        assert_eq!(total.minor_units(), 1500);
    }

    #[test]
    fn display() {
        assert_eq!(Money::from_minor(1020).to_string(), "10.20");
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_minor(-1234).to_string(), "-12.34");
    }

    #[test]
    fn currency_parsing() {
        assert_eq!("inr".parse::<Currency>().unwrap(), Currency::Inr);
        assert_eq!("USD".parse::<Currency>().unwrap(), Currency::Usd);
        assert!("XYZ".parse::<Currency>().is_err());
        assert_eq!(Currency::Inr.to_string(), "INR");
    }

    #[test]
    fn currency_serializes_as_code() {
        assert_eq!(serde_json::to_string(&Currency::Inr).unwrap(), "\"INR\"");
        let parsed: Currency = serde_json::from_str("\"EUR\"").unwrap();
        assert_eq!(parsed, Currency::Eur);
    }
}
