use std::cmp::Ordering;

use heap::CellRef;

use crate::interpreter::Interpreter;
use crate::number::{self, Number};
use crate::primitives::{expect_integer, expect_number, expect_string};
use crate::{Error, Result};

fn fold(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &'static str,
    identity: Number,
    op: fn(Number, Number) -> Result<Number>,
) -> Result<CellRef> {
    let mut acc = identity;
    for arg in args {
        acc = op(acc, expect_number(interp, *arg, name)?)?;
    }
    interp.make_number(acc)
}

/// `(- x)` negates, `(- x y ...)` subtracts left to right. Same shape for `/`.
fn fold_inverse(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &'static str,
    identity: Number,
    op: fn(Number, Number) -> Result<Number>,
) -> Result<CellRef> {
    let first = expect_number(interp, args[0], name)?;
    if args.len() == 1 {
        let value = op(identity, first)?;
        return interp.make_number(value);
    }
    let mut acc = first;
    for arg in &args[1..] {
        acc = op(acc, expect_number(interp, *arg, name)?)?;
    }
    interp.make_number(acc)
}

pub fn add(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    fold(interp, args, "+", Number::Integer(0), Number::add)
}

pub fn mul(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    fold(interp, args, "*", Number::Integer(1), Number::mul)
}

pub fn sub(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    fold_inverse(interp, args, "-", Number::Integer(0), Number::sub)
}

pub fn div(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    fold_inverse(interp, args, "/", Number::Integer(1), Number::div)
}

fn binary(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &'static str,
    op: fn(Number, Number) -> Result<Number>,
) -> Result<CellRef> {
    let a = expect_number(interp, args[0], name)?;
    let b = expect_number(interp, args[1], name)?;
    let value = op(a, b)?;
    interp.make_number(value)
}

pub fn quotient(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    binary(interp, args, "quotient", Number::quotient)
}

pub fn remainder(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    binary(interp, args, "remainder", Number::remainder)
}

pub fn modulo(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    binary(interp, args, "modulo", Number::modulo)
}

pub fn expt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    binary(interp, args, "expt", Number::expt)
}

/// Chained comparison: true when `ok` holds for every adjacent pair.
fn compare_chain(
    interp: &mut Interpreter,
    args: &[CellRef],
    name: &'static str,
    ok: fn(Ordering) -> bool,
) -> Result<CellRef> {
    let numbers = args
        .iter()
        .map(|arg| expect_number(interp, *arg, name))
        .collect::<Result<Vec<_>>>()?;
    let holds = numbers
        .windows(2)
        .all(|pair| pair[0].compare(pair[1]).is_some_and(ok));
    Ok(interp.boolean(holds))
}

pub fn num_eq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chain(interp, args, "=", Ordering::is_eq)
}

pub fn lt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chain(interp, args, "<", Ordering::is_lt)
}

pub fn gt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chain(interp, args, ">", Ordering::is_gt)
}

pub fn le(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chain(interp, args, "<=", Ordering::is_le)
}

pub fn ge(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    compare_chain(interp, args, ">=", Ordering::is_ge)
}

pub fn abs(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let value = expect_number(interp, args[0], "abs")?.abs()?;
    interp.make_number(value)
}

/// The result is inexact if any argument is.
fn extremum(interp: &mut Interpreter, args: &[CellRef], name: &'static str, keep: Ordering) -> Result<CellRef> {
    let mut best = expect_number(interp, args[0], name)?;
    let mut exact = best.is_exact();
    for arg in &args[1..] {
        let n = expect_number(interp, *arg, name)?;
        exact &= n.is_exact();
        if n.compare(best) == Some(keep) {
            best = n;
        }
    }
    if !exact {
        best = Number::Real(best.to_f64());
    }
    interp.make_number(best)
}

pub fn min(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    extremum(interp, args, "min", Ordering::Less)
}

pub fn max(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    extremum(interp, args, "max", Ordering::Greater)
}

pub fn gcd(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let mut acc: u64 = 0;
    for arg in args {
        let n = expect_integer(interp, *arg, "gcd")?;
        acc = number::gcd(acc, n.unsigned_abs());
    }
    let acc = i64::try_from(acc).map_err(|_| Error::Overflow("gcd"))?;
    interp.make_integer(acc)
}

pub fn lcm(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let mut acc: i64 = 1;
    for arg in args {
        let n = expect_integer(interp, *arg, "lcm")?;
        if n == 0 {
            return interp.make_integer(0);
        }
        let divisor = number::gcd(acc.unsigned_abs(), n.unsigned_abs());
        acc = i64::try_from(divisor)
            .ok()
            .and_then(|divisor| (acc / divisor).checked_mul(n))
            .and_then(i64::checked_abs)
            .ok_or(Error::Overflow("lcm"))?;
    }
    interp.make_integer(acc)
}

pub fn exact_to_inexact(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let n = expect_number(interp, args[0], "exact->inexact")?;
    interp.make_real(n.to_f64())
}

pub fn inexact_to_exact(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let n = expect_number(interp, args[0], "inexact->exact")?.to_exact()?;
    interp.make_number(n)
}

fn rounding(interp: &mut Interpreter, args: &[CellRef], name: &'static str, f: fn(f64) -> f64) -> Result<CellRef> {
    let n = expect_number(interp, args[0], name)?;
    interp.make_number(n.round_with(f))
}

pub fn floor(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    rounding(interp, args, "floor", f64::floor)
}

pub fn ceiling(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    rounding(interp, args, "ceiling", f64::ceil)
}

pub fn round(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    rounding(interp, args, "round", number::round_even)
}

pub fn truncate(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    rounding(interp, args, "truncate", f64::trunc)
}

/// Exact results for exact perfect squares, inexact otherwise.
pub fn sqrt(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let n = expect_number(interp, args[0], "sqrt")?;
    let root = n.to_f64().sqrt();
    if let Number::Integer(i) = n {
        let candidate = root.round() as i64;
        if i >= 0 && candidate.checked_mul(candidate) == Some(i) {
            return interp.make_integer(candidate);
        }
    }
    interp.make_real(root)
}

fn transcendental(interp: &mut Interpreter, args: &[CellRef], name: &'static str, f: fn(f64) -> f64) -> Result<CellRef> {
    let x = expect_number(interp, args[0], name)?.to_f64();
    interp.make_real(f(x))
}

pub fn exp(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "exp", f64::exp)
}

pub fn log(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "log", f64::ln)
}

pub fn sin(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "sin", f64::sin)
}

pub fn cos(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "cos", f64::cos)
}

pub fn tan(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "tan", f64::tan)
}

pub fn asin(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "asin", f64::asin)
}

pub fn acos(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    transcendental(interp, args, "acos", f64::acos)
}

pub fn atan(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let y = expect_number(interp, args[0], "atan")?.to_f64();
    let value = match args.get(1) {
        Some(x) => y.atan2(expect_number(interp, *x, "atan")?.to_f64()),
        None => y.atan(),
    };
    interp.make_real(value)
}

pub fn is_number(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.boolean(interp.number(args[0]).is_some()))
}

pub fn is_integer(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let integral = match interp.number(args[0]) {
        Some(Number::Integer(_)) => true,
        Some(Number::Real(r)) => r.is_finite() && r.fract() == 0.0,
        None => false,
    };
    Ok(interp.boolean(integral))
}

pub fn is_exact(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let n = expect_number(interp, args[0], "exact?")?;
    Ok(interp.boolean(n.is_exact()))
}

pub fn is_inexact(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let n = expect_number(interp, args[0], "inexact?")?;
    Ok(interp.boolean(!n.is_exact()))
}

fn sign_test(interp: &mut Interpreter, args: &[CellRef], name: &'static str, want: Ordering) -> Result<CellRef> {
    let n = expect_number(interp, args[0], name)?;
    Ok(interp.boolean(n.compare(Number::Integer(0)) == Some(want)))
}

pub fn is_zero(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    sign_test(interp, args, "zero?", Ordering::Equal)
}

pub fn is_positive(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    sign_test(interp, args, "positive?", Ordering::Greater)
}

pub fn is_negative(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    sign_test(interp, args, "negative?", Ordering::Less)
}

fn parity(interp: &Interpreter, value: CellRef, name: &'static str) -> Result<i64> {
    match interp.number(value) {
        Some(Number::Integer(i)) => Ok(i.rem_euclid(2)),
        Some(Number::Real(r)) if r.fract() == 0.0 => Ok(r.rem_euclid(2.0) as i64),
        _ => Err(interp.wrong_type(name, "integer", value)),
    }
}

pub fn is_odd(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let bit = parity(interp, args[0], "odd?")?;
    Ok(interp.boolean(bit == 1))
}

pub fn is_even(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let bit = parity(interp, args[0], "even?")?;
    Ok(interp.boolean(bit == 0))
}

fn radix_arg(interp: &Interpreter, args: &[CellRef], name: &'static str) -> Result<u32> {
    let Some(radix) = args.get(1) else {
        return Ok(10);
    };
    match expect_integer(interp, *radix, name)? {
        r @ (2 | 8 | 10 | 16) => Ok(r as u32),
        _ => Err(interp.wrong_type(name, "radix 2, 8, 10 or 16", *radix)),
    }
}

fn integer_in_radix(value: i64, radix: u32) -> String {
    let digits = match radix {
        2 => format!("{:b}", value.unsigned_abs()),
        8 => format!("{:o}", value.unsigned_abs()),
        16 => format!("{:x}", value.unsigned_abs()),
        _ => value.unsigned_abs().to_string(),
    };
    if value < 0 { format!("-{digits}") } else { digits }
}

pub fn number_to_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let n = expect_number(interp, args[0], "number->string")?;
    let radix = radix_arg(interp, args, "number->string")?;
    let text = match n {
        Number::Integer(i) => integer_in_radix(i, radix),
        Number::Real(_) => interp.write_to_string(args[0]),
    };
    interp.make_string(text)
}

pub fn string_to_number(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let radix = radix_arg(interp, args, "string->number")?;
    let text = expect_string(interp, args[0], "string->number")?;
    match number::parse(text, radix) {
        Some(n) => interp.make_number(n),
        None => Ok(interp.f()),
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;
    use crate::Error;

    fn eval(interp: &mut Interpreter, source: &str) -> String {
        let value = interp.eval_str(source).unwrap();
        interp.write_to_string(value)
    }

    #[test]
    fn exactness_follows_operands() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(+ 1 2)"), "3");
        assert_eq!(eval(&mut interp, "(+ 1 2.0)"), "3.0");
        assert_eq!(eval(&mut interp, "(/ 6 3)"), "2");
        assert_eq!(eval(&mut interp, "(/ 1 2)"), "0.5");
        assert_eq!(eval(&mut interp, "(- 5)"), "-5");
        assert_eq!(eval(&mut interp, "(- 10 1 2)"), "7");
        assert_eq!(eval(&mut interp, "(max 1 2.0)"), "2.0");
        assert_eq!(eval(&mut interp, "(min 3 1 2)"), "1");
    }

    #[test]
    fn integer_division_family() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(quotient -7 2)"), "-3");
        assert_eq!(eval(&mut interp, "(remainder -7 2)"), "-1");
        assert_eq!(eval(&mut interp, "(modulo -7 2)"), "1");
        assert!(matches!(
            interp.eval_str("(quotient 1 0)"),
            Err(Error::DivisionByZero("quotient"))
        ));
        assert_eq!(eval(&mut interp, "(gcd 12 18)"), "6");
        assert_eq!(eval(&mut interp, "(lcm 4 6)"), "12");
    }

    #[test]
    fn comparisons_chain() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(< 1 2 3)"), "#t");
        assert_eq!(eval(&mut interp, "(< 1 3 2)"), "#f");
        assert_eq!(eval(&mut interp, "(= 1 1.0)"), "#t");
        assert_eq!(eval(&mut interp, "(>= 3 3 1)"), "#t");
    }

    #[test]
    fn rounding_and_roots() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(round 2.5)"), "2.0");
        assert_eq!(eval(&mut interp, "(round 3.5)"), "4.0");
        assert_eq!(eval(&mut interp, "(floor -1.5)"), "-2.0");
        assert_eq!(eval(&mut interp, "(sqrt 16)"), "4");
        assert_eq!(eval(&mut interp, "(sqrt 2.25)"), "1.5");
        assert_eq!(eval(&mut interp, "(expt 2 10)"), "1024");
        assert_eq!(eval(&mut interp, "(inexact->exact 4.0)"), "4");
    }

    #[test]
    fn number_string_conversion() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(number->string 255 16)"), "\"ff\"");
        assert_eq!(eval(&mut interp, "(number->string -5 2)"), "\"-101\"");
        assert_eq!(eval(&mut interp, "(string->number \"42\")"), "42");
        assert_eq!(eval(&mut interp, "(string->number \"ff\" 16)"), "255");
        assert_eq!(eval(&mut interp, "(string->number \"abc\")"), "#f");
    }

    #[test]
    fn overflow_is_reported() {
        let mut interp = Interpreter::new().unwrap();
        assert!(matches!(
            interp.eval_str("(* 9223372036854775807 2)"),
            Err(Error::Overflow("*"))
        ));
    }
}
