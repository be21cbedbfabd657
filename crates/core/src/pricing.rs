//! Canonical price resolution.
//!
//! Every place that needs a price (cart view, payment intent amount, order
//! materialization) goes through [`unit_price`] and [`total`], so the amount
//! charged and the amount recorded on the order can never disagree.

use crate::types::{Amount, Currency};

/// Currency every catalog price is expressed in.
pub const CATALOG_CURRENCY: Currency = Currency::Jpy;

/// Price of one printed garment.
pub const BASE_UNIT_PRICE: Amount = Amount::from_minor(3000);

/// Largest quantity accepted on a single cart line.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// Unit price of a garment in the given size and color.
///
/// All sizes and colors currently share the base price.
#[must_use]
pub const fn unit_price(size: &str, color: &str) -> Amount {
    let _ = (size, color);
    BASE_UNIT_PRICE
}

/// A priced line ready to be summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: Amount,
    pub quantity: u32,
}

impl PricedLine {
    /// Price a line with the canonical rule.
    #[must_use]
    pub const fn new(size: &str, color: &str, quantity: u32) -> Self {
        Self {
            unit_price: unit_price(size, color),
            quantity,
        }
    }

    /// `unit_price × quantity`, or `None` on overflow.
    #[must_use]
    pub const fn subtotal(&self) -> Option<Amount> {
        self.unit_price.checked_times(self.quantity)
    }
}

/// Sum of every line's `unit_price × quantity`, or `None` on overflow.
#[must_use]
pub fn total<'a, I>(lines: I) -> Option<Amount>
where
    I: IntoIterator<Item = &'a PricedLine>,
{
    lines.into_iter().try_fold(Amount::ZERO, |acc, line| {
        let subtotal = line.subtotal()?;
        acc.minor()
            .checked_add(subtotal.minor())
            .map(Amount::from_minor)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_total() {
        let lines = [PricedLine::new("M", "White", 2)];
        assert_eq!(total(&lines).unwrap(), Amount::from_minor(6000));
    }

    #[test]
    fn test_multi_line_total_matches_sum_of_subtotals() {
        let lines = [
            PricedLine::new("S", "Black", 1),
            PricedLine::new("XL", "White", 3),
        ];
        let expected: Amount = lines.iter().map(|l| l.subtotal().unwrap()).sum();
        assert_eq!(total(&lines).unwrap(), expected);
        assert_eq!(expected.minor(), 12_000);
    }

    #[test]
    fn test_empty_total_is_zero() {
        assert_eq!(total(&[]).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_overflow_is_none() {
        let lines = [PricedLine {
            unit_price: Amount::from_minor(i64::MAX),
            quantity: 2,
        }];
        assert_eq!(total(&lines), None);
    }
}
