use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Number of fraction digits of every amount handled by the engine.
pub const SCALE: u32 = 2;

const MINOR_PER_MAJOR: i64 = 100;

/// Signed money amount represented as **integer minor units** (cents).
///
/// Use this type for **all** monetary values in the engine (unit prices,
/// subtotals, totals, ledger amounts and balances) to avoid floating-point
/// drift: summing cents is exact.
///
/// # Examples
///
/// ```rust
/// use engine::Money;
///
/// let amount = Money::new(12_34);
/// assert_eq!(amount.minor(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects >
/// 2 decimals):
///
/// ```rust
/// use engine::Money;
///
/// assert_eq!("10".parse::<Money>().unwrap().minor(), 1000);
/// assert_eq!("10,5".parse::<Money>().unwrap().minor(), 1050);
/// assert!("12.345".parse::<Money>().is_err());
/// assert_eq!(Money::parse_rounded("12.345").unwrap().minor(), 1235);
/// ```
///
/// Arithmetic only goes through the `checked_*` methods; there are no
/// operators that could wrap or panic:
///
/// ```compile_fail
/// use engine::Money;
///
/// let _ = Money::new(1) + Money::new(2);
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Checked multiplication by an integer quantity.
    ///
    /// Both factors are exact at scale 2 and the quantity is integral, so the
    /// product needs no rounding.
    #[must_use]
    pub fn checked_mul(self, quantity: i64) -> Option<Money> {
        self.0.checked_mul(quantity).map(Money)
    }

    /// Parses a decimal string, rounding half-up (away from zero on ties) to
    /// two fraction digits.
    ///
    /// Meant for amounts coming from sources with more precision than the
    /// engine stores (e.g. a wholesaler price list quoting `0.125`).
    pub fn parse_rounded(s: &str) -> Result<Self, EngineError> {
        parse_minor(s, Rounding::HalfUp)
    }

    /// Sums amounts, `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let major = abs / MINOR_PER_MAJOR as u64;
        let minor = abs % MINOR_PER_MAJOR as u64;
        write!(f, "{sign}{major}.{minor:02}")
    }
}

impl FromStr for Money {
    type Err = EngineError;

    /// Parses a decimal string into minor units.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`, see [`Money::parse_rounded`])
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_minor(s, Rounding::Reject)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Rounding {
    Reject,
    HalfUp,
}

fn parse_minor(s: &str, rounding: Rounding) -> Result<Money, EngineError> {
    let empty = || EngineError::InvalidAmount("empty amount".to_string());
    let invalid = || EngineError::InvalidAmount(format!("invalid amount: {}", s.trim()));
    let overflow = || EngineError::InvalidAmount("amount too large".to_string());

    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(empty());
    }

    let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
        (true, stripped)
    } else if let Some(stripped) = trimmed.strip_prefix('+') {
        (false, stripped)
    } else {
        (false, trimmed)
    };

    let rest = rest.trim().replace(',', ".");
    if rest.is_empty() {
        return Err(empty());
    }

    let (major_str, frac_str) = match rest.split_once('.') {
        Some((major, frac)) => (major, frac),
        None => (rest.as_str(), ""),
    };

    if major_str.is_empty() || !major_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac_str.len() > SCALE as usize && rounding == Rounding::Reject {
        return Err(EngineError::InvalidAmount("too many decimals".to_string()));
    }

    let major: i64 = major_str.parse().map_err(|_| overflow())?;

    let mut digits = frac_str.bytes().map(|b| i64::from(b - b'0'));
    let tens = digits.next().unwrap_or(0);
    let units = digits.next().unwrap_or(0);
    let round_up = digits.next().is_some_and(|d| d >= 5);
    let minor = tens * 10 + units + i64::from(round_up);

    let total = major
        .checked_mul(MINOR_PER_MAJOR)
        .and_then(|v| v.checked_add(minor))
        .ok_or_else(overflow)?;

    let signed = if negative {
        total.checked_neg().ok_or_else(overflow)?
    } else {
        total
    };

    Ok(Money(signed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(Money::new(0).to_string(), "0.00");
        assert_eq!(Money::new(1).to_string(), "0.01");
        assert_eq!(Money::new(10).to_string(), "0.10");
        assert_eq!(Money::new(33375).to_string(), "333.75");
        assert_eq!(Money::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<Money>().unwrap().minor(), 1000);
        assert_eq!("10.5".parse::<Money>().unwrap().minor(), 1050);
        assert_eq!("10,50".parse::<Money>().unwrap().minor(), 1050);
        assert_eq!("-0.01".parse::<Money>().unwrap().minor(), -1);
        assert_eq!("+1.00".parse::<Money>().unwrap().minor(), 100);
        assert_eq!("  2.30 ".parse::<Money>().unwrap().minor(), 230);
        assert_eq!("7.".parse::<Money>().unwrap().minor(), 700);
    }

    #[test]
    fn parse_rejects_garbage_and_extra_decimals() {
        assert!("12.345".parse::<Money>().is_err());
        assert!("0.001".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!("-".parse::<Money>().is_err());
        assert!("1.2.3".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
        assert!("12a".parse::<Money>().is_err());
    }

    #[test]
    fn parse_rounded_rounds_half_up() {
        assert_eq!(Money::parse_rounded("0.125").unwrap().minor(), 13);
        assert_eq!(Money::parse_rounded("0.124").unwrap().minor(), 12);
        assert_eq!(Money::parse_rounded("1.995").unwrap().minor(), 200);
        assert_eq!(Money::parse_rounded("-0.125").unwrap().minor(), -13);
        assert_eq!(Money::parse_rounded("25.50").unwrap().minor(), 2550);
    }

    #[test]
    fn checked_ops_detect_overflow() {
        assert_eq!(Money::new(2550).checked_mul(10), Some(Money::new(25500)));
        assert_eq!(Money::new(i64::MAX).checked_mul(2), None);
        assert_eq!(Money::new(i64::MAX).checked_add(Money::new(1)), None);
        assert_eq!(
            Money::checked_sum([Money::new(25500), Money::new(7875)]),
            Some(Money::new(33375))
        );
        assert_eq!(Money::checked_sum([Money::new(i64::MAX), Money::new(1)]), None);
    }
}
