use heap::CellRef;

use crate::cell::{Closure, Payload};
use crate::interpreter::Interpreter;
use crate::primitives::{expect_index, expect_integer};
use crate::{Error, Result};

pub fn gc(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    let stats = interp.collect_garbage();
    log::debug!("(gc): {} collected, {} free", stats.collected, stats.free);
    Ok(interp.unspecified())
}

/// `(gc-verbose [flag])` returns the previous setting.
pub fn gc_verbose(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let previous = interp.heap.verbose();
    let enable = args.first().is_none_or(|flag| interp.is_true(*flag));
    interp.set_gc_verbose(enable);
    Ok(interp.boolean(previous))
}

/// `(tracing flag)` returns the previous setting.
pub fn tracing(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let previous = interp.st.tracing;
    interp.set_tracing(interp.is_true(args[0]));
    Ok(interp.boolean(previous))
}

/// `(new-segment [n])` grows the heap by `n` segments and returns how many
/// were added.
pub fn new_segment(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let wanted = match args.first() {
        Some(n) => expect_index(interp, *n, "new-segment")?,
        None => 1,
    };
    let mut added = 0;
    for _ in 0..wanted {
        if interp.heap.grow().is_err() {
            break;
        }
        added += 1;
    }
    interp.make_integer(added)
}

/// Every interned symbol, in name order.
pub fn oblist(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    let names = interp.symbol_names();
    let symbols = names
        .iter()
        .filter_map(|name| interp.st.symbols.get(name))
        .collect::<Vec<_>>();
    interp.list_from(&symbols)
}

pub fn gensym(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    interp.gensym()
}

/// `(error message irritant ...)`. The irritants are kept for the error hook.
pub fn error(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let (message, irritants) = match args.split_first() {
        Some((first, rest)) => match interp.string_value(*first) {
            Some(text) => (text.to_owned(), rest),
            None => (String::new(), args),
        },
        None => (String::new(), args),
    };
    let rendered: String = irritants
        .iter()
        .map(|irritant| format!(" {}", interp.write_to_string(*irritant)))
        .collect();
    interp.st.irritants = interp.list_from(irritants)?;
    Err(Error::User {
        message,
        irritants: rendered,
    })
}

pub fn exit(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let code = match args.first() {
        Some(code) => expect_integer(interp, *code, "exit")?,
        None => 0,
    };
    Err(Error::Exit(i32::try_from(code).unwrap_or(1)))
}

/// The environment the call was made in.
pub fn the_environment(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.st.env)
}

pub fn global_environment(interp: &mut Interpreter, _args: &[CellRef]) -> Result<CellRef> {
    Ok(interp.global_env())
}

/// `(make-closure '(lambda formals body ...) [env])`
pub fn make_closure(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    let mut code = args[0];
    if let Some((head, rest)) = interp.pair(code) {
        if head == interp.st.sym.lambda {
            code = rest;
        }
    }
    if interp.pair(code).is_none() {
        return Err(interp.wrong_type("make-closure", "lambda expression", args[0]));
    }
    let env = match args.get(1) {
        Some(env) => {
            interp.frame(*env)?;
            *env
        }
        None => interp.st.env,
    };
    interp.alloc(Payload::Closure(Closure { code, env }))
}

/// `(lambda formals body ...)` for a closure or macro.
pub fn get_closure_code(interp: &mut Interpreter, args: &[CellRef]) -> Result<CellRef> {
    match *interp.payload(args[0]) {
        Payload::Closure(closure) | Payload::Macro(closure) => {
            interp.cons(interp.st.sym.lambda, closure.code)
        }
        _ => Ok(interp.f()),
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
    fn error_carries_message_and_irritants() {
        let mut interp = Interpreter::new().unwrap();
        let err = interp.eval_str("(error \"bad thing:\" 42 'foo)").unwrap_err();
        assert_eq!(err.to_string(), "bad thing: 42 foo");
        assert!(matches!(err, Error::User { ref message, .. } if message == "bad thing:"));
    }

    #[test]
    fn exit_is_not_recoverable() {
        let mut interp = Interpreter::new().unwrap();
        interp.eval_str("(define (*error-hook* . args) 'handled)").unwrap();
        assert!(matches!(interp.eval_str("(exit 3)"), Err(Error::Exit(3))));
    }

    #[test]
    fn gensym_and_oblist() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(eq? (gensym) (gensym))"), "#f");
        assert_eq!(eval(&mut interp, "(symbol? (gensym))"), "#t");
        assert_eq!(eval(&mut interp, "(if (memq 'car (oblist)) #t #f)"), "#t");
        assert_eq!(eval(&mut interp, "(define g (gensym)) (if (memq g (oblist)) #t #f)"), "#f");
    }

    #[test]
    fn gc_keeps_reachable_values() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(define keep (list 1 2 3)) (gc) keep"), "(1 2 3)");
        assert_eq!(eval(&mut interp, "(> (new-segment 1) 0)"), "#t");
    }

    #[test]
    fn closures_expose_their_code() {
        let mut interp = Interpreter::new().unwrap();
        assert_eq!(eval(&mut interp, "(get-closure-code (lambda (x) (* x 2)))"), "(lambda (x) (* x 2))");
        assert_eq!(eval(&mut interp, "((make-closure '(lambda (x) (+ x 1))) 41)"), "42");
    }
}
