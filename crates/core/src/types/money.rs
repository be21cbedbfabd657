//! Money in integer minor units.
//!
//! The storefront sells in Japanese yen, which has no subunit, so one minor
//! unit is one yen. Amounts are plain `i64`s on the wire to the payment
//! processor and in the database.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use serde::{Deserialize, Serialize};

/// A non-currency-tagged amount in minor units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Create an amount from minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Multiply by a line quantity, returning `None` on overflow.
    #[must_use]
    pub const fn checked_times(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as i64) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Render with thousands separators and the currency symbol, e.g. `¥6,000`.
    #[must_use]
    pub fn display(&self, currency: Currency) -> String {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{sign}{}{grouped}", currency.symbol())
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Amount {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self {
        Self(self.0 * i64::from(rhs))
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported ISO 4217 currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    #[default]
    Jpy,
    Usd,
}

impl Currency {
    /// Lowercase code as used by the payment processor.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Jpy => "jpy",
            Self::Usd => "usd",
        }
    }

    /// Display symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Jpy => "¥",
            Self::Usd => "$",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpy" => Ok(Self::Jpy),
            "usd" => Ok(Self::Usd),
            other => Err(format!("unsupported currency: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Amount::from_minor(0).display(Currency::Jpy), "¥0");
        assert_eq!(Amount::from_minor(3000).display(Currency::Jpy), "¥3,000");
        assert_eq!(
            Amount::from_minor(1_234_567).display(Currency::Jpy),
            "¥1,234,567"
        );
        assert_eq!(Amount::from_minor(-500).display(Currency::Usd), "-$500");
    }

    #[test]
    fn test_sum_and_multiply() {
        let total: Amount = [Amount::from_minor(3000) * 2, Amount::from_minor(3000)]
            .into_iter()
            .sum();
        assert_eq!(total.minor(), 9000);
        assert_eq!(Amount::from_minor(i64::MAX).checked_times(2), None);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!("JPY".parse::<Currency>().unwrap(), Currency::Jpy);
        assert!("eur".parse::<Currency>().is_err());
    }
}
