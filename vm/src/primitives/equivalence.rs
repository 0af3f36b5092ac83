use heap::CellRef;

use crate::cell::Payload;
use crate::interpreter::Interpreter;
use crate::Result;

impl Interpreter {
    /// Identity, plus value equality for numbers of the same exactness and
    /// for characters.
    pub fn eqv(&self, a: CellRef, b: CellRef) -> bool {
        if a == b {
            return true;
        }
        match (self.payload(a), self.payload(b)) {
            (Payload::Character(x), Payload::Character(y)) => x == y,
            _ => match (self.number(a), self.number(b)) {
                (Some(x), Some(y)) => x.eqv(y),
                _ => false,
            },
        }
    }

    /// Structural equality over pairs, vectors and strings. Uses an explicit
    /// work list so deep structures do not recurse natively.
    pub fn equal(&self, a: CellRef, b: CellRef) -> bool {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            if self.eqv(a, b) {
                continue;
            }
            match (self.payload(a), self.payload(b)) {
                (Payload::Pair(a_car, a_cdr), Payload::Pair(b_car, b_cdr)) => {
                    pending.push((*a_cdr, *b_cdr));
                    pending.push((*a_car, *b_car));
                }
                (Payload::Vector(xs), Payload::Vector(ys)) if xs.len() == ys.len() => {
                    pending.extend(xs.iter().copied().zip(ys.iter().copied()).rev());
                }
                (Payload::String(x), Payload::String(y)) if x == y => {}
                _ => return false,
            }
        }
        true
    }
}

fn predicate(interp: &Interpreter, args: &[CellRef], test: fn(&Payload) -> bool) -> Result<CellRef> {
    Ok(interp.boolean(test(interp.payload(args[0]))))
}

pub fn is_eq(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.boolean(args[0] == args[1]))
}

pub fn is_eqv(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.boolean(interp.eqv(args[0], args[1])))
}

pub fn is_equal(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.boolean(interp.equal(args[0], args[1])))
}

pub fn not(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.boolean(!interp.is_true(args[0])))
}

pub fn is_null(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Nil))
}

pub fn is_pair(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Pair(..)))
}

pub fn is_list(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.boolean(interp.list_length(args[0]).is_some()))
}

pub fn is_symbol(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Symbol(_)))
}

pub fn is_string(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::String(_)))
}

pub fn is_char(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Character(_)))
}

pub fn is_vector(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Vector(_)))
}

pub fn is_boolean(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::True | Payload::False))
}

pub fn is_procedure(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, Payload::is_procedure)
}

pub fn is_closure(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Closure(_)))
}

pub fn is_macro(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Macro(_)))
}

pub fn is_promise(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Promise(_)))
}

pub fn is_environment(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Environment(_)))
}

pub fn is_port(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Port(_)))
}

pub fn is_eof(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    predicate(interp, args, |p| matches!(p, Payload::Eof))
}

#[cfg(test)]
mod tests {
    use crate::interpreter::Interpreter;

    fn eval(interp: &mut Interpreter, source: &str) -> String {
        let value = interp.eval_str(source).unwrap();
        interp.write_to_string(value)
    }

    #[test]
    fn eqv_respects_exactness() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(eqv? 1 1.0)"), "#f");
        assert_eq!(eval(&mut interp, "(eqv? 100 100)"), "#t");
        assert_eq!(eval(&mut interp, "(eqv? 1.5 1.5)"), "#t");
        assert_eq!(eval(&mut interp, "(eqv? #\\a #\\a)"), "#t");
        assert_eq!(eval(&mut interp, "(eq? 'a 'a)"), "#t");
        assert_eq!(eval(&mut interp, "(eq? (list 1) (list 1))"), "#f");
    }

    #[test]
    fn equal_compares_structure() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(equal? '(1 (2 #(3 \"x\"))) (list 1 (list 2 (vector 3 \"x\"))))"), "#t");
        assert_eq!(eval(&mut interp, "(equal? '(1 2) '(1 2 3))"), "#f");
        assert_eq!(eval(&mut interp, "(equal? \"ab\" \"ab\")"), "#t");
    }

    #[test]
    fn equal_handles_deep_lists() {
        let mut interp = Interpreter::new().unwrap();
        let source = "(define (build n acc) (if (= n 0) acc (build (- n 1) (cons n acc)))) \
                      (equal? (build 100000 '()) (build 100000 '()))";
        assert_eq!(eval(&mut interp, source), "#t");
    }

    #[test]
    fn type_predicates() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(list (null? '()) (pair? '()) (list? '(1 . 2)) (boolean? #f))"), "(#t #f #f #t)");
        assert_eq!(eval(&mut interp, "(list (procedure? car) (procedure? (lambda () 1)) (closure? car))"), "(#t #t #f)");
        assert_eq!(eval(&mut interp, "(not 0)"), "#f");
    }
}
