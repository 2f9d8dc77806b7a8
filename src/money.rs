//! Monetary arithmetic
//!
//! All amounts and multipliers are [`Decimal`]. Amounts are kept at two
//! decimal places, rounding half away from zero.

use rust_decimal::{Decimal, RoundingStrategy};

/// Smallest payable amount; anything below is paid as zero
pub fn min_payout() -> Decimal {
    Decimal::new(1, 2)
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Winnings for a bet at an accumulated multiplier
///
/// Sub-cent results are floored to zero, everything else is rounded to cents.
pub fn win_amount(bet: Decimal, multiplier: Decimal) -> Decimal {
    let raw = bet * multiplier;
    if raw < min_payout() {
        Decimal::ZERO
    } else {
        round_money(raw)
    }
}

/// Parse a client supplied amount. Rejects anything that is not a finite
/// positive decimal.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let value: Decimal = raw.trim().parse().ok()?;
    if value > Decimal::ZERO {
        Some(value)
    } else {
        None
    }
}

/// Integer cents, used for ordered index keys
pub fn to_cents(amount: Decimal) -> u64 {
    use rust_decimal::prelude::ToPrimitive;
    (round_money(amount) * Decimal::ONE_HUNDRED)
        .to_u64()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_win_amount_rounds_to_cents() {
        assert_eq!(win_amount(d("10"), d("3.00")), d("30.00"));
        assert_eq!(win_amount(d("0.33"), d("1.5")), d("0.50"));
        assert_eq!(win_amount(d("1.11"), d("1.11")), d("1.23"));
    }

    #[test]
    fn test_sub_cent_win_is_zero() {
        assert_eq!(win_amount(d("0.10"), d("0.05")), Decimal::ZERO);
        assert_eq!(win_amount(d("0.10"), d("0.10")), d("0.01"));
        assert_eq!(win_amount(d("100"), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round_money(d("0.125")), d("0.13"));
        assert_eq!(round_money(d("2.345")), d("2.35"));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 12.5 "), Some(d("12.5")));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("-3"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_to_cents() {
        assert_eq!(to_cents(d("12.34")), 1234);
        assert_eq!(to_cents(d("0.005")), 1);
    }
}
