//! Numeric tower: exact 64-bit integers and inexact doubles.
//!
//! Mixed operations promote to inexact. Exact operations that would leave
//! the 64-bit range fail instead of wrapping.

use std::cmp::Ordering;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Real(f64),
}

impl Number {
    #[inline]
    pub fn is_exact(self) -> bool {
        matches!(self, Number::Integer(_))
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Real(r) => r,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(i) => i == 0,
            Number::Real(r) => r == 0.0,
        }
    }

    fn exact_op(
        self,
        other: Number,
        name: &'static str,
        exact: fn(i64, i64) -> Option<i64>,
        inexact: fn(f64, f64) -> f64,
    ) -> Result<Number> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => {
                exact(a, b).map(Number::Integer).ok_or(Error::Overflow(name))
            }
            (a, b) => Ok(Number::Real(inexact(a.to_f64(), b.to_f64()))),
        }
    }

    pub fn add(self, other: Number) -> Result<Number> {
        self.exact_op(other, "+", i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, other: Number) -> Result<Number> {
        self.exact_op(other, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, other: Number) -> Result<Number> {
        self.exact_op(other, "*", i64::checked_mul, |a, b| a * b)
    }

    /// Exact when both operands are exact and the division is even,
    /// inexact otherwise.
    pub fn div(self, other: Number) -> Result<Number> {
        match (self, other) {
            (_, divisor) if divisor.is_zero() => Err(Error::DivisionByZero("/")),
            (Number::Integer(a), Number::Integer(b)) => match a.checked_rem(b) {
                Some(0) => a
                    .checked_div(b)
                    .map(Number::Integer)
                    .ok_or(Error::Overflow("/")),
                Some(_) => Ok(Number::Real(a as f64 / b as f64)),
                None => Err(Error::Overflow("/")),
            },
            (a, b) => Ok(Number::Real(a.to_f64() / b.to_f64())),
        }
    }

    fn integer_division(
        self,
        other: Number,
        name: &'static str,
        exact: fn(i64, i64) -> Option<i64>,
        inexact: fn(f64, f64) -> f64,
    ) -> Result<Number> {
        if other.is_zero() {
            return Err(Error::DivisionByZero(name));
        }
        self.exact_op(other, name, exact, inexact)
    }

    pub fn quotient(self, other: Number) -> Result<Number> {
        self.integer_division(other, "quotient", i64::checked_div, |a, b| (a / b).trunc())
    }

    pub fn remainder(self, other: Number) -> Result<Number> {
        self.integer_division(other, "remainder", |a, b| Some(a.wrapping_rem(b)), |a, b| a % b)
    }

    /// Result takes the sign of the divisor.
    pub fn modulo(self, other: Number) -> Result<Number> {
        self.integer_division(
            other,
            "modulo",
            |a, b| {
                let r = a.wrapping_rem(b);
                Some(if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            },
            |a, b| {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
            },
        )
    }

    pub fn neg(self) -> Result<Number> {
        match self {
            Number::Integer(i) => i.checked_neg().map(Number::Integer).ok_or(Error::Overflow("-")),
            Number::Real(r) => Ok(Number::Real(-r)),
        }
    }

    pub fn abs(self) -> Result<Number> {
        match self {
            Number::Integer(i) => i.checked_abs().map(Number::Integer).ok_or(Error::Overflow("abs")),
            Number::Real(r) => Ok(Number::Real(r.abs())),
        }
    }

    /// Numeric comparison across exactness. NaN compares unordered.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => Some(a.cmp(&b)),
            (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
        }
    }

    pub fn num_eq(self, other: Number) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// `eqv?` on numbers: equal value and equal exactness.
    pub fn eqv(self, other: Number) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (Number::Real(a), Number::Real(b)) => a == b,
            _ => false,
        }
    }

    pub fn expt(self, power: Number) -> Result<Number> {
        match (self, power) {
            (Number::Integer(base), Number::Integer(exp)) if exp >= 0 => {
                let exp = u32::try_from(exp).map_err(|_| Error::Overflow("expt"))?;
                base.checked_pow(exp).map(Number::Integer).ok_or(Error::Overflow("expt"))
            }
            (a, b) => Ok(Number::Real(a.to_f64().powf(b.to_f64()))),
        }
    }

    pub fn to_exact(self) -> Result<Number> {
        match self {
            Number::Integer(_) => Ok(self),
            Number::Real(r) if r.is_finite() && r.fract() == 0.0 => {
                if r >= i64::MIN as f64 && r < i64::MAX as f64 {
                    Ok(Number::Integer(r as i64))
                } else {
                    Err(Error::Overflow("inexact->exact"))
                }
            }
            Number::Real(r) => Err(Error::WrongType {
                procedure: "inexact->exact".into(),
                expected: "integral real",
                got: r.to_string(),
            }),
        }
    }

    /// Applies a rounding function, keeping exact integers untouched.
    pub fn round_with(self, f: fn(f64) -> f64) -> Number {
        match self {
            Number::Integer(_) => self,
            Number::Real(r) => Number::Real(f(r)),
        }
    }
}

/// Round half to even, as Scheme's `round` requires.
pub fn round_even(r: f64) -> f64 {
    let rounded = r.round();
    if (r - r.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - r.signum()
    } else {
        rounded
    }
}

/// Works on magnitudes so that `i64::MIN` needs no negation.
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Parses a numeric literal. `None` means the token is not a number.
pub fn parse(token: &str, radix: u32) -> Option<Number> {
    let digits = token.strip_prefix('+').unwrap_or(token);
    if radix == 10 {
        let body = digits.strip_prefix('-').unwrap_or(digits);
        let first = body.chars().next()?;
        let starts_numeric = first.is_ascii_digit()
            || (first == '.' && body[1..].starts_with(|c: char| c.is_ascii_digit()));
        if !starts_numeric {
            return None;
        }
    }
    if let Ok(i) = i64::from_str_radix(digits, radix) {
        return Some(Number::Integer(i));
    }
    if radix == 10 {
        if let Ok(r) = digits.parse::<f64>() {
            return Some(Number::Real(r));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_arithmetic_promotes() {
        let sum = Number::Integer(1).add(Number::Real(2.0)).unwrap();
        assert_eq!(sum, Number::Real(3.0));
        assert_eq!(
            Number::Integer(1).add(Number::Integer(2)).unwrap(),
            Number::Integer(3)
        );
    }

    #[test]
    fn exact_overflow_is_an_error() {
        assert!(matches!(
            Number::Integer(i64::MAX).add(Number::Integer(1)),
            Err(Error::Overflow("+"))
        ));
        assert!(matches!(
            Number::Integer(i64::MIN).neg(),
            Err(Error::Overflow(_))
        ));
    }

    #[test]
    fn division_keeps_exactness_only_when_even() {
        assert_eq!(Number::Integer(6).div(Number::Integer(3)).unwrap(), Number::Integer(2));
        assert_eq!(Number::Integer(1).div(Number::Integer(2)).unwrap(), Number::Real(0.5));
        assert!(matches!(
            Number::Integer(1).div(Number::Integer(0)),
            Err(Error::DivisionByZero(_))
        ));
        assert!(matches!(
            Number::Integer(1).div(Number::Real(0.0)),
            Err(Error::DivisionByZero(_))
        ));
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(Number::Integer(-7).modulo(Number::Integer(2)).unwrap(), Number::Integer(1));
        assert_eq!(Number::Integer(7).modulo(Number::Integer(-2)).unwrap(), Number::Integer(-1));
        assert_eq!(Number::Integer(-7).remainder(Number::Integer(2)).unwrap(), Number::Integer(-1));
    }

    #[test]
    fn minimum_integer_boundaries() {
        assert_eq!(Number::Integer(i64::MIN).remainder(Number::Integer(-1)).unwrap(), Number::Integer(0));
        assert_eq!(Number::Integer(i64::MIN).modulo(Number::Integer(-1)).unwrap(), Number::Integer(0));
        assert!(matches!(
            Number::Integer(i64::MIN).quotient(Number::Integer(-1)),
            Err(Error::Overflow("quotient"))
        ));
        assert_eq!(gcd(i64::MIN.unsigned_abs(), 6), 2);
        assert_eq!(gcd(i64::MIN.unsigned_abs(), 0), 1 << 63);
    }

    #[test]
    fn eqv_distinguishes_exactness() {
        assert!(!Number::Integer(1).eqv(Number::Real(1.0)));
        assert!(Number::Integer(1).num_eq(Number::Real(1.0)));
    }

    #[test]
    fn parse_literals() {
        assert_eq!(parse("42", 10), Some(Number::Integer(42)));
        assert_eq!(parse("-3", 10), Some(Number::Integer(-3)));
        assert_eq!(parse("+5", 10), Some(Number::Integer(5)));
        assert_eq!(parse("2.5", 10), Some(Number::Real(2.5)));
        assert_eq!(parse(".5", 10), Some(Number::Real(0.5)));
        assert_eq!(parse("1e3", 10), Some(Number::Real(1000.0)));
        assert_eq!(parse("ff", 16), Some(Number::Integer(255)));
        assert_eq!(parse("-", 10), None);
        assert_eq!(parse("...", 10), None);
        assert_eq!(parse("inf", 10), None);
        assert_eq!(parse("1+", 10), None);
    }

    #[test]
    fn round_to_even() {
        assert_eq!(round_even(2.5), 2.0);
        assert_eq!(round_even(3.5), 4.0);
        assert_eq!(round_even(-2.5), -2.0);
        assert_eq!(round_even(2.4), 2.0);
    }
}
