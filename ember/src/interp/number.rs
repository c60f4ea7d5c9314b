//! Arbitrary-precision numeric helpers
//!
//! Both `Int` and `Float` values carry a [`BigDecimal`]; the variant only
//! decides typing and formatting. An `Int` payload is always integral.

use crate::error::{Result, ScriptError};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, FromPrimitive, RoundingMode, ToPrimitive, Zero};
use std::str::FromStr;

/// Fractional digits kept by `/` and negative powers
pub const DEFAULT_FLOAT_DIGITS: i64 = 16;

/// Exponents above this are refused instead of exhausting memory
const MAX_EXPONENT: i64 = 100_000;

pub fn parse(text: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(text).ok()
}

/// Truncate toward zero
pub fn truncate(n: &BigDecimal) -> BigDecimal {
    n.with_scale_round(0, RoundingMode::Down)
}

pub fn is_integral(n: &BigDecimal) -> bool {
    truncate(n) == *n
}

pub fn to_bigint(n: &BigDecimal) -> BigInt {
    truncate(n).with_scale(0).into_bigint_and_exponent().0
}

pub fn from_bigint(n: BigInt) -> BigDecimal {
    BigDecimal::new(n, 0)
}

/// Integral value as `i64`, if it fits
pub fn to_i64(n: &BigDecimal) -> Option<i64> {
    if is_integral(n) { n.to_i64() } else { None }
}

/// Quotient rounded to `digits` fractional digits
pub fn divide(a: &BigDecimal, b: &BigDecimal, digits: i64) -> Result<BigDecimal> {
    if b.is_zero() {
        return Err(ScriptError::divide_by_zero());
    }
    Ok((a / b).round(digits).normalized())
}

/// `a ** b`; integral exponents stay exact
pub fn pow(base: &BigDecimal, exp: &BigDecimal, digits: i64) -> Result<BigDecimal> {
    if let Some(e) = to_i64(exp) {
        if e.abs() > MAX_EXPONENT {
            return Err(ScriptError::arithmetic(format!("exponent is too large: {e}")));
        }
        let mut result = BigDecimal::from(1);
        let mut factor = base.clone();
        let mut remaining = e.unsigned_abs();
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = &result * &factor;
            }
            factor = &factor * &factor;
            remaining >>= 1;
        }
        return if e < 0 {
            divide(&BigDecimal::from(1), &result, digits)
        } else {
            Ok(result)
        };
    }

    let (Some(b), Some(e)) = (base.to_f64(), exp.to_f64()) else {
        return Err(ScriptError::arithmetic("operand is out of floating range"));
    };
    BigDecimal::from_f64(b.powf(e))
        .map(|n| n.round(digits).normalized())
        .ok_or_else(|| ScriptError::arithmetic(format!("{b} ** {e} is not a number")))
}

/// Plain decimal rendering, never scientific notation.
///
/// Floats always show a fractional part (`2.0`).
pub fn format(n: &BigDecimal, float: bool) -> String {
    let negative = *n < BigDecimal::zero();
    let (digits, scale) = n.normalized().into_bigint_and_exponent();
    let mut text = if negative {
        (-digits).to_string()
    } else {
        digits.to_string()
    };

    if scale <= 0 {
        if text != "0" {
            text.push_str(&"0".repeat(scale.unsigned_abs() as usize));
        }
        if float {
            text.push_str(".0");
        }
    } else {
        let scale = scale as usize;
        if text.len() <= scale {
            text = format!("{}{text}", "0".repeat(scale - text.len() + 1));
        }
        let point = text.len() - scale;
        text.insert(point, '.');
    }

    if negative {
        text.insert(0, '-');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> BigDecimal {
        parse(text).unwrap()
    }

    #[test]
    fn test_format_integers() {
        assert_eq!(format(&n("0"), false), "0");
        assert_eq!(format(&n("1200"), false), "1200");
        assert_eq!(format(&n("-42"), false), "-42");
    }

    #[test]
    fn test_format_floats() {
        assert_eq!(format(&n("2"), true), "2.0");
        assert_eq!(format(&n("2.50"), true), "2.5");
        assert_eq!(format(&n("-0.125"), true), "-0.125");
        assert_eq!(format(&n("0.001"), true), "0.001");
        assert_eq!(format(&n("1e3"), true), "1000.0");
    }

    #[test]
    fn test_divide_rounds() {
        let third = divide(&n("1"), &n("3"), DEFAULT_FLOAT_DIGITS).unwrap();
        assert_eq!(format(&third, true), "0.3333333333333333");
        assert!(divide(&n("1"), &n("0"), 16).is_err());
    }

    #[test]
    fn test_pow() {
        assert_eq!(pow(&n("2"), &n("10"), 16).unwrap(), n("1024"));
        assert_eq!(pow(&n("2"), &n("-2"), 16).unwrap(), n("0.25"));
        assert_eq!(pow(&n("7"), &n("0"), 16).unwrap(), n("1"));
        assert_eq!(pow(&n("4"), &n("0.5"), 16).unwrap(), n("2"));
    }

    #[test]
    fn test_precision_is_not_lost() {
        let big = n("12345678901234567890123");
        let sum = &big + &n("1");
        assert_eq!(format(&sum, false), "12345678901234567890124");
    }

    #[test]
    fn test_truncate_and_i64() {
        assert_eq!(truncate(&n("-7.9")), n("-7"));
        assert_eq!(to_i64(&n("12")), Some(12));
        assert_eq!(to_i64(&n("1.5")), None);
    }
}
