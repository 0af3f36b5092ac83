use heap::CellRef;

use crate::cell::{Cell, Payload};
use crate::interpreter::Interpreter;
use crate::number::Number;
use crate::op::Op;
use crate::{Error, Result};

pub mod equivalence;
pub mod list;
pub mod numeric;
pub mod port;
pub mod string;
pub mod vector;
pub mod vm;

/// A native procedure. Receives the evaluated arguments, which stay rooted
/// through the interpreter's `args` register for the duration of the call.
pub type PrimitiveFn = fn(&mut Interpreter, &[CellRef]) -> Result<CellRef>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    pub const fn at_least(n: usize) -> Self {
        Self { min: n, max: None }
    }

    pub const fn between(min: usize, max: usize) -> Self {
        Self { min, max: Some(max) }
    }

    pub fn check(self, procedure: &str, got: usize) -> Result<()> {
        if got >= self.min && self.max.is_none_or(|max| got <= max) {
            return Ok(());
        }
        let expected = match self.max {
            Some(max) if max == self.min => max.to_string(),
            Some(max) => format!("{} to {max}", self.min),
            None => format!("at least {}", self.min),
        };
        Err(Error::Arity {
            procedure: procedure.to_owned(),
            expected,
            got,
        })
    }
}

#[derive(Clone, Copy)]
pub enum PrimitiveKind {
    /// Computes its value directly.
    Native(PrimitiveFn),
    /// Hands the argument list to an evaluator state.
    Control(Op),
}

#[derive(Clone, Copy)]
pub struct PrimitiveDesc {
    pub name: &'static str,
    pub arity: Arity,
    pub kind: PrimitiveKind,
}

impl PrimitiveDesc {
    pub const fn new(name: &'static str, arity: Arity, func: PrimitiveFn) -> Self {
        Self {
            name,
            arity,
            kind: PrimitiveKind::Native(func),
        }
    }

    pub const fn control(name: &'static str, arity: Arity, op: Op) -> Self {
        Self {
            name,
            arity,
            kind: PrimitiveKind::Control(op),
        }
    }
}

const fn exactly(n: usize) -> Arity {
    Arity::exactly(n)
}

const fn at_least(n: usize) -> Arity {
    Arity::at_least(n)
}

const fn between(min: usize, max: usize) -> Arity {
    Arity::between(min, max)
}

pub fn default_primitives() -> Vec<PrimitiveDesc> {
    vec![
        PrimitiveDesc::control("call/cc", exactly(1), Op::CallCC),
        PrimitiveDesc::control("call-with-current-continuation", exactly(1), Op::CallCC),
        PrimitiveDesc::control("dynamic-wind", exactly(3), Op::DynamicWind),
        PrimitiveDesc::control("apply", at_least(2), Op::ApplyProc),
        PrimitiveDesc::control("eval", between(1, 2), Op::EvalProc),
        PrimitiveDesc::control("force", exactly(1), Op::Force),
        PrimitiveDesc::control("load", exactly(1), Op::Load),
        // numbers
        PrimitiveDesc::new("+", at_least(0), numeric::add),
        PrimitiveDesc::new("-", at_least(1), numeric::sub),
        PrimitiveDesc::new("*", at_least(0), numeric::mul),
        PrimitiveDesc::new("/", at_least(1), numeric::div),
        PrimitiveDesc::new("quotient", exactly(2), numeric::quotient),
        PrimitiveDesc::new("remainder", exactly(2), numeric::remainder),
        PrimitiveDesc::new("modulo", exactly(2), numeric::modulo),
        PrimitiveDesc::new("=", at_least(1), numeric::num_eq),
        PrimitiveDesc::new("<", at_least(1), numeric::lt),
        PrimitiveDesc::new(">", at_least(1), numeric::gt),
        PrimitiveDesc::new("<=", at_least(1), numeric::le),
        PrimitiveDesc::new(">=", at_least(1), numeric::ge),
        PrimitiveDesc::new("abs", exactly(1), numeric::abs),
        PrimitiveDesc::new("min", at_least(1), numeric::min),
        PrimitiveDesc::new("max", at_least(1), numeric::max),
        PrimitiveDesc::new("gcd", at_least(0), numeric::gcd),
        PrimitiveDesc::new("lcm", at_least(0), numeric::lcm),
        PrimitiveDesc::new("expt", exactly(2), numeric::expt),
        PrimitiveDesc::new("exact->inexact", exactly(1), numeric::exact_to_inexact),
        PrimitiveDesc::new("inexact->exact", exactly(1), numeric::inexact_to_exact),
        PrimitiveDesc::new("floor", exactly(1), numeric::floor),
        PrimitiveDesc::new("ceiling", exactly(1), numeric::ceiling),
        PrimitiveDesc::new("round", exactly(1), numeric::round),
        PrimitiveDesc::new("truncate", exactly(1), numeric::truncate),
        PrimitiveDesc::new("sqrt", exactly(1), numeric::sqrt),
        PrimitiveDesc::new("exp", exactly(1), numeric::exp),
        PrimitiveDesc::new("log", exactly(1), numeric::log),
        PrimitiveDesc::new("sin", exactly(1), numeric::sin),
        PrimitiveDesc::new("cos", exactly(1), numeric::cos),
        PrimitiveDesc::new("tan", exactly(1), numeric::tan),
        PrimitiveDesc::new("asin", exactly(1), numeric::asin),
        PrimitiveDesc::new("acos", exactly(1), numeric::acos),
        PrimitiveDesc::new("atan", between(1, 2), numeric::atan),
        PrimitiveDesc::new("number?", exactly(1), numeric::is_number),
        PrimitiveDesc::new("integer?", exactly(1), numeric::is_integer),
        PrimitiveDesc::new("real?", exactly(1), numeric::is_number),
        PrimitiveDesc::new("exact?", exactly(1), numeric::is_exact),
        PrimitiveDesc::new("inexact?", exactly(1), numeric::is_inexact),
        PrimitiveDesc::new("zero?", exactly(1), numeric::is_zero),
        PrimitiveDesc::new("positive?", exactly(1), numeric::is_positive),
        PrimitiveDesc::new("negative?", exactly(1), numeric::is_negative),
        PrimitiveDesc::new("odd?", exactly(1), numeric::is_odd),
        PrimitiveDesc::new("even?", exactly(1), numeric::is_even),
        PrimitiveDesc::new("number->string", between(1, 2), numeric::number_to_string),
        PrimitiveDesc::new("string->number", between(1, 2), numeric::string_to_number),
        // pairs and lists
        PrimitiveDesc::new("cons", exactly(2), list::cons),
        PrimitiveDesc::new("car", exactly(1), list::car),
        PrimitiveDesc::new("cdr", exactly(1), list::cdr),
        PrimitiveDesc::new("caar", exactly(1), list::caar),
        PrimitiveDesc::new("cadr", exactly(1), list::cadr),
        PrimitiveDesc::new("cdar", exactly(1), list::cdar),
        PrimitiveDesc::new("cddr", exactly(1), list::cddr),
        PrimitiveDesc::new("caddr", exactly(1), list::caddr),
        PrimitiveDesc::new("cdddr", exactly(1), list::cdddr),
        PrimitiveDesc::new("cadddr", exactly(1), list::cadddr),
        PrimitiveDesc::new("set-car!", exactly(2), list::set_car),
        PrimitiveDesc::new("set-cdr!", exactly(2), list::set_cdr),
        PrimitiveDesc::new("list", at_least(0), list::list),
        PrimitiveDesc::new("list*", at_least(1), list::list_star),
        PrimitiveDesc::new("length", exactly(1), list::length),
        PrimitiveDesc::new("append", at_least(0), list::append),
        PrimitiveDesc::new("reverse", exactly(1), list::reverse),
        PrimitiveDesc::new("list-tail", exactly(2), list::list_tail),
        PrimitiveDesc::new("list-ref", exactly(2), list::list_ref),
        PrimitiveDesc::new("last-pair", exactly(1), list::last_pair),
        PrimitiveDesc::new("memq", exactly(2), list::memq),
        PrimitiveDesc::new("memv", exactly(2), list::memv),
        PrimitiveDesc::new("member", exactly(2), list::member),
        PrimitiveDesc::new("assq", exactly(2), list::assq),
        PrimitiveDesc::new("assv", exactly(2), list::assv),
        PrimitiveDesc::new("assoc", exactly(2), list::assoc),
        // equivalence and type predicates
        PrimitiveDesc::new("eq?", exactly(2), equivalence::is_eq),
        PrimitiveDesc::new("eqv?", exactly(2), equivalence::is_eqv),
        PrimitiveDesc::new("equal?", exactly(2), equivalence::is_equal),
        PrimitiveDesc::new("not", exactly(1), equivalence::not),
        PrimitiveDesc::new("null?", exactly(1), equivalence::is_null),
        PrimitiveDesc::new("pair?", exactly(1), equivalence::is_pair),
        PrimitiveDesc::new("list?", exactly(1), equivalence::is_list),
        PrimitiveDesc::new("symbol?", exactly(1), equivalence::is_symbol),
        PrimitiveDesc::new("string?", exactly(1), equivalence::is_string),
        PrimitiveDesc::new("char?", exactly(1), equivalence::is_char),
        PrimitiveDesc::new("vector?", exactly(1), equivalence::is_vector),
        PrimitiveDesc::new("boolean?", exactly(1), equivalence::is_boolean),
        PrimitiveDesc::new("procedure?", exactly(1), equivalence::is_procedure),
        PrimitiveDesc::new("closure?", exactly(1), equivalence::is_closure),
        PrimitiveDesc::new("macro?", exactly(1), equivalence::is_macro),
        PrimitiveDesc::new("promise?", exactly(1), equivalence::is_promise),
        PrimitiveDesc::new("environment?", exactly(1), equivalence::is_environment),
        PrimitiveDesc::new("port?", exactly(1), equivalence::is_port),
        PrimitiveDesc::new("eof-object?", exactly(1), equivalence::is_eof),
        // strings, characters and symbols
        PrimitiveDesc::new("string-length", exactly(1), string::string_length),
        PrimitiveDesc::new("string-ref", exactly(2), string::string_ref),
        PrimitiveDesc::new("string-set!", exactly(3), string::string_set),
        PrimitiveDesc::new("make-string", between(1, 2), string::make_string),
        PrimitiveDesc::new("string", at_least(0), string::string),
        PrimitiveDesc::new("substring", between(2, 3), string::substring),
        PrimitiveDesc::new("string-append", at_least(0), string::string_append),
        PrimitiveDesc::new("string-copy", exactly(1), string::string_copy),
        PrimitiveDesc::new("string-fill!", exactly(2), string::string_fill),
        PrimitiveDesc::new("string->list", exactly(1), string::string_to_list),
        PrimitiveDesc::new("list->string", exactly(1), string::list_to_string),
        PrimitiveDesc::new("string=?", at_least(1), string::string_eq),
        PrimitiveDesc::new("string<?", at_least(1), string::string_lt),
        PrimitiveDesc::new("string>?", at_least(1), string::string_gt),
        PrimitiveDesc::new("string<=?", at_least(1), string::string_le),
        PrimitiveDesc::new("string>=?", at_least(1), string::string_ge),
        PrimitiveDesc::new("string-ci=?", at_least(1), string::string_ci_eq),
        PrimitiveDesc::new("string-upcase", exactly(1), string::string_upcase),
        PrimitiveDesc::new("string-downcase", exactly(1), string::string_downcase),
        PrimitiveDesc::new("symbol->string", exactly(1), string::symbol_to_string),
        PrimitiveDesc::new("string->symbol", exactly(1), string::string_to_symbol),
        PrimitiveDesc::new("char->integer", exactly(1), string::char_to_integer),
        PrimitiveDesc::new("integer->char", exactly(1), string::integer_to_char),
        PrimitiveDesc::new("char-upcase", exactly(1), string::char_upcase),
        PrimitiveDesc::new("char-downcase", exactly(1), string::char_downcase),
        PrimitiveDesc::new("char-alphabetic?", exactly(1), string::is_char_alphabetic),
        PrimitiveDesc::new("char-numeric?", exactly(1), string::is_char_numeric),
        PrimitiveDesc::new("char-whitespace?", exactly(1), string::is_char_whitespace),
        PrimitiveDesc::new("char-upper-case?", exactly(1), string::is_char_upper_case),
        PrimitiveDesc::new("char-lower-case?", exactly(1), string::is_char_lower_case),
        PrimitiveDesc::new("char=?", at_least(1), string::char_eq),
        PrimitiveDesc::new("char<?", at_least(1), string::char_lt),
        PrimitiveDesc::new("char>?", at_least(1), string::char_gt),
        PrimitiveDesc::new("char<=?", at_least(1), string::char_le),
        PrimitiveDesc::new("char>=?", at_least(1), string::char_ge),
        PrimitiveDesc::new("char-ci=?", at_least(1), string::char_ci_eq),
        // vectors
        PrimitiveDesc::new("make-vector", between(1, 2), vector::make_vector),
        PrimitiveDesc::new("vector", at_least(0), vector::vector),
        PrimitiveDesc::new("vector-length", exactly(1), vector::vector_length),
        PrimitiveDesc::new("vector-ref", exactly(2), vector::vector_ref),
        PrimitiveDesc::new("vector-set!", exactly(3), vector::vector_set),
        PrimitiveDesc::new("vector-fill!", exactly(2), vector::vector_fill),
        PrimitiveDesc::new("vector->list", exactly(1), vector::vector_to_list),
        PrimitiveDesc::new("list->vector", exactly(1), vector::list_to_vector),
        // ports
        PrimitiveDesc::new("read", between(0, 1), port::read),
        PrimitiveDesc::new("read-char", between(0, 1), port::read_char),
        PrimitiveDesc::new("peek-char", between(0, 1), port::peek_char),
        PrimitiveDesc::new("char-ready?", between(0, 1), port::char_ready),
        PrimitiveDesc::new("write", between(1, 2), port::write),
        PrimitiveDesc::new("display", between(1, 2), port::display),
        PrimitiveDesc::new("write-char", between(1, 2), port::write_char),
        PrimitiveDesc::new("newline", between(0, 1), port::newline),
        PrimitiveDesc::new("open-input-file", exactly(1), port::open_input_file),
        PrimitiveDesc::new("open-output-file", exactly(1), port::open_output_file),
        PrimitiveDesc::new("open-input-string", exactly(1), port::open_input_string),
        PrimitiveDesc::new("open-output-string", exactly(0), port::open_output_string),
        PrimitiveDesc::new("get-output-string", exactly(1), port::get_output_string),
        PrimitiveDesc::new("close-input-port", exactly(1), port::close_input_port),
        PrimitiveDesc::new("close-output-port", exactly(1), port::close_output_port),
        PrimitiveDesc::new("current-input-port", exactly(0), port::current_input_port),
        PrimitiveDesc::new("current-output-port", exactly(0), port::current_output_port),
        PrimitiveDesc::new("input-port?", exactly(1), port::is_input_port),
        PrimitiveDesc::new("output-port?", exactly(1), port::is_output_port),
        PrimitiveDesc::new("eof-object", exactly(0), port::eof_object),
        // interpreter control
        PrimitiveDesc::new("gc", exactly(0), vm::gc),
        PrimitiveDesc::new("gc-verbose", between(0, 1), vm::gc_verbose),
        PrimitiveDesc::new("tracing", exactly(1), vm::tracing),
        PrimitiveDesc::new("new-segment", between(0, 1), vm::new_segment),
        PrimitiveDesc::new("oblist", exactly(0), vm::oblist),
        PrimitiveDesc::new("gensym", exactly(0), vm::gensym),
        PrimitiveDesc::new("error", at_least(0), vm::error),
        PrimitiveDesc::new("exit", between(0, 1), vm::exit),
        PrimitiveDesc::new("the-environment", exactly(0), vm::the_environment),
        PrimitiveDesc::new("global-environment", exactly(0), vm::global_environment),
        PrimitiveDesc::new("interaction-environment", exactly(0), vm::global_environment),
        PrimitiveDesc::new("make-closure", between(1, 2), vm::make_closure),
        PrimitiveDesc::new("get-closure-code", exactly(1), vm::get_closure_code),
    ]
}

pub fn find_primitive(prims: &[PrimitiveDesc], name: &str) -> Option<usize> {
    prims.iter().position(|p| p.name == name)
}

impl Interpreter {
    /// Binds every primitive in the global environment.
    pub(crate) fn install_primitives(&mut self) -> Result<()> {
        self.primitives = default_primitives();
        let global = self.st.global_env;
        for index in 0..self.primitives.len() {
            let symbol = self.intern(self.primitives[index].name)?;
            let cell = self.alloc_cell(Cell::immutable(Payload::Primitive(index)))?;
            self.define(global, symbol, cell)?;
        }
        Ok(())
    }

    pub(crate) fn primitive_name(&self, index: usize) -> &'static str {
        self.primitives.get(index).map_or("?", |desc| desc.name)
    }
}

pub(crate) fn expect_number(interp: &Interpreter, value: CellRef, procedure: &str) -> Result<Number> {
    interp
        .number(value)
        .ok_or_else(|| interp.wrong_type(procedure, "number", value))
}

pub(crate) fn expect_integer(interp: &Interpreter, value: CellRef, procedure: &str) -> Result<i64> {
    interp
        .integer_value(value)
        .ok_or_else(|| interp.wrong_type(procedure, "integer", value))
}

/// A non-negative exact integer usable as an index or length.
pub(crate) fn expect_index(interp: &Interpreter, value: CellRef, procedure: &str) -> Result<usize> {
    interp
        .integer_value(value)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| interp.wrong_type(procedure, "non-negative integer", value))
}

pub(crate) fn expect_string<'a>(interp: &'a Interpreter, value: CellRef, procedure: &str) -> Result<&'a str> {
    interp
        .string_value(value)
        .ok_or_else(|| interp.wrong_type(procedure, "string", value))
}

pub(crate) fn expect_char(interp: &Interpreter, value: CellRef, procedure: &str) -> Result<char> {
    interp
        .char_value(value)
        .ok_or_else(|| interp.wrong_type(procedure, "character", value))
}

pub(crate) fn expect_symbol<'a>(interp: &'a Interpreter, value: CellRef, procedure: &str) -> Result<&'a str> {
    interp
        .symbol_name(value)
        .ok_or_else(|| interp.wrong_type(procedure, "symbol", value))
}

/// Rejects mutation of cells built with an immutable constructor.
pub(crate) fn expect_mutable(interp: &Interpreter, value: CellRef, procedure: &str) -> Result<()> {
    if interp.is_immutable(value) {
        return Err(Error::MutateImmutable(procedure.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages() {
        assert!(Arity::exactly(2).check("f", 2).is_ok());
        assert!(Arity::at_least(1).check("f", 5).is_ok());
        let err = Arity::between(1, 2).check("f", 3).unwrap_err();
        assert_eq!(err.to_string(), "f: expected 1 to 2 arguments, got 3");
        let err = Arity::at_least(1).check("g", 0).unwrap_err();
        assert_eq!(err.to_string(), "g: expected at least 1 arguments, got 0");
    }

    #[test]
    fn primitive_names_are_unique() {
        let prims = default_primitives();
        for (i, desc) in prims.iter().enumerate() {
            assert_eq!(find_primitive(&prims, desc.name), Some(i), "{}", desc.name);
        }
    }

    #[test]
    fn primitives_are_bound_globally() {
        let interp = Interpreter::new().unwrap();
        let car = interp.lookup_global("car").unwrap();
        assert!(matches!(interp.payload(car), Payload::Primitive(_)));
        assert!(interp.is_immutable(car));
    }
}
