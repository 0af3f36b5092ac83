//! External representations of values.

use std::fmt::Write as _;

use ahash::AHashSet;
use heap::CellRef;

use crate::{cell::Payload, interpreter::Interpreter};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Style {
    /// `write`: strings quoted, characters as `#\x` literals.
    Write,
    /// `display`: strings and characters as their raw text.
    Display,
}

enum Item {
    Value(CellRef),
    /// Remainder of the list that starts at `head`.
    Rest { head: CellRef, rest: CellRef },
    Elements { vector: CellRef, index: usize },
}

fn char_name(c: char) -> Option<&'static str> {
    Some(match c {
        ' ' => "space",
        '\n' => "newline",
        '\t' => "tab",
        '\r' => "return",
        '\0' => "nul",
        '\x07' => "alarm",
        '\x08' => "backspace",
        '\x1b' => "altmode",
        '\x7f' => "delete",
        _ => return None,
    })
}

fn write_real(out: &mut String, r: f64) {
    if r.is_nan() {
        out.push_str("+nan.0");
    } else if r.is_infinite() {
        out.push_str(if r > 0.0 { "+inf.0" } else { "-inf.0" });
    } else {
        let _ = write!(out, "{r:?}");
    }
}

fn write_string_literal(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:x};", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_char_literal(out: &mut String, c: char) {
    out.push_str("#\\");
    match char_name(c) {
        Some(name) => out.push_str(name),
        None if c.is_control() => {
            let _ = write!(out, "x{:x}", c as u32);
        }
        None => out.push(c),
    }
}

struct Printer<'a> {
    interp: &'a Interpreter,
    style: Style,
    out: String,
    /// Pairs and vectors currently being printed. Meeting one again means
    /// the structure is circular.
    open: AHashSet<CellRef>,
    work: Vec<Item>,
}

impl<'a> Printer<'a> {
    fn new(interp: &'a Interpreter, style: Style) -> Self {
        Self {
            interp,
            style,
            out: String::new(),
            open: AHashSet::new(),
            work: Vec::new(),
        }
    }

    fn run(mut self, root: CellRef) -> String {
        self.work.push(Item::Value(root));
        while let Some(item) = self.work.pop() {
            match item {
                Item::Value(cell) => self.value(cell),
                Item::Rest { head, rest } => self.rest(head, rest),
                Item::Elements { vector, index } => self.elements(vector, index),
            }
        }
        self.out
    }

    fn rest(&mut self, head: CellRef, rest: CellRef) {
        match self.interp.payload(rest) {
            Payload::Nil => self.close_list(head),
            Payload::Pair(car, cdr) if !self.open.contains(&rest) => {
                self.open.insert(rest);
                self.out.push(' ');
                self.work.push(Item::Rest { head, rest: *cdr });
                self.work.push(Item::Value(*car));
            }
            Payload::Pair(..) => {
                self.out.push_str(" . #<cycle>");
                self.close_list(head);
            }
            _ => {
                self.out.push_str(" . ");
                // The tail is an atom, so printing it never reopens the list.
                self.value(rest);
                self.close_list(head);
            }
        }
    }

    fn close_list(&mut self, head: CellRef) {
        self.out.push(')');
        let mut cell = head;
        while self.open.remove(&cell) {
            match self.interp.pair(cell) {
                Some((_, cdr)) => cell = cdr,
                None => break,
            }
        }
    }

    fn elements(&mut self, vector: CellRef, index: usize) {
        let Payload::Vector(items) = self.interp.payload(vector) else {
            return;
        };
        match items.get(index) {
            Some(item) => {
                if index > 0 {
                    self.out.push(' ');
                }
                self.work.push(Item::Elements { vector, index: index + 1 });
                self.work.push(Item::Value(*item));
            }
            None => {
                self.out.push(')');
                self.open.remove(&vector);
            }
        }
    }

    fn value(&mut self, cell: CellRef) {
        let interp = self.interp;
        let out = &mut self.out;
        match interp.payload(cell) {
            Payload::Pair(..) | Payload::Vector(_) if self.open.contains(&cell) => {
                out.push_str("#<cycle>");
            }
            Payload::Pair(car, cdr) => {
                out.push('(');
                self.open.insert(cell);
                self.work.push(Item::Rest { head: cell, rest: *cdr });
                self.work.push(Item::Value(*car));
            }
            Payload::Vector(_) => {
                out.push_str("#(");
                self.open.insert(cell);
                self.work.push(Item::Elements { vector: cell, index: 0 });
            }
            Payload::Nil => out.push_str("()"),
            Payload::True => out.push_str("#t"),
            Payload::False => out.push_str("#f"),
            Payload::Eof => out.push_str("#<eof>"),
            Payload::Unspecified => out.push_str("#<unspecified>"),
            Payload::Integer(i) => {
                let _ = write!(out, "{i}");
            }
            Payload::Real(r) => write_real(out, *r),
            Payload::Character(c) => match self.style {
                Style::Write => write_char_literal(out, *c),
                Style::Display => out.push(*c),
            },
            Payload::String(text) => match self.style {
                Style::Write => write_string_literal(out, text),
                Style::Display => out.push_str(text),
            },
            Payload::Symbol(name) => out.push_str(name),
            Payload::Port(port) => {
                let _ = write!(out, "#<port {}>", port.name());
            }
            Payload::Closure(_) => out.push_str("#<closure>"),
            Payload::Macro(_) => out.push_str("#<macro>"),
            Payload::Continuation(_) => out.push_str("#<continuation>"),
            Payload::Primitive(index) => {
                let _ = write!(out, "#<primitive {}>", interp.primitive_name(*index));
            }
            Payload::Foreign(_) => out.push_str("#<foreign procedure>"),
            Payload::Promise(_) => out.push_str("#<promise>"),
            Payload::Environment(_) => out.push_str("#<environment>"),
            Payload::Frame(_) => out.push_str("#<frame>"),
            Payload::Free(_) => out.push_str("#<free cell>"),
        }
    }
}

impl Interpreter {
    /// The representation `write` produces.
    pub fn write_to_string(&self, cell: CellRef) -> String {
        Printer::new(self, Style::Write).run(cell)
    }

    /// The representation `display` produces.
    pub fn display_to_string(&self, cell: CellRef) -> String {
        Printer::new(self, Style::Display).run(cell)
    }
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;

    fn write(interp: &mut Interpreter, source: &str) -> String {
        let value = interp.eval_str(source).unwrap();
        interp.write_to_string(value)
    }

    fn display(interp: &mut Interpreter, source: &str) -> String {
        let value = interp.eval_str(source).unwrap();
        interp.display_to_string(value)
    }

    #[test]
    fn atoms() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(write(&mut interp, "'(1 2.5 -3.0 #t #f () sym)"), "(1 2.5 -3.0 #t #f () sym)");
        assert_eq!(write(&mut interp, "(* 1e308 10.0)"), "+inf.0");
        assert_eq!(write(&mut interp, "car"), "#<primitive car>");
        assert_eq!(write(&mut interp, "(lambda (x) x)"), "#<closure>");
        assert_eq!(write(&mut interp, "(eof-object)"), "#<eof>");
    }

    #[test]
    fn write_and_display_differ_on_text() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(write(&mut interp, "\"a\\\"b\\\\c\\n\""), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(display(&mut interp, "\"a\\\"b\""), "a\"b");
        assert_eq!(write(&mut interp, "(list #\\a #\\space #\\newline #\\tab)"), "(#\\a #\\space #\\newline #\\tab)");
        assert_eq!(display(&mut interp, "(list #\\a \"b c\")"), "(a b c)");
    }

    #[test]
    fn dotted_pairs_and_vectors() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(write(&mut interp, "(cons 1 (cons 2 3))"), "(1 2 . 3)");
        assert_eq!(write(&mut interp, "(vector 1 (list 2 #(3)) \"x\")"), "#(1 (2 #(3)) \"x\")");
        assert_eq!(write(&mut interp, "''a"), "(quote (quote a))");
    }

    #[test]
    fn shared_structure_is_not_a_cycle() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(write(&mut interp, "(define x (list 1 2)) (list x x)"), "((1 2) (1 2))");
        assert_eq!(write(&mut interp, "(cons x x)"), "((1 2) 1 2)");
    }

    #[test]
    fn cycles_terminate() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(write(&mut interp, "(define c (list 1 2)) (set-cdr! (cdr c) c) c"), "(1 2 . #<cycle>)");
        assert_eq!(write(&mut interp, "(define v (vector 1 2)) (vector-set! v 0 v) v"), "#(#<cycle> 2)");
    }
}
