use std::path::PathBuf;

use vm::{CellRef, Error, HeapSettings, Interpreter, Result, Settings};

fn eval(interp: &mut Interpreter, source: &str) -> String {
    let value = interp
        .eval_str(source)
        .unwrap_or_else(|err| panic!("{source}: {err}"));
    interp.write_to_string(value)
}

fn small_heap(segment_size: usize, max_segments: usize) -> Settings {
    Settings {
        heap: HeapSettings {
            segment_size,
            max_segments,
            initial_segments: 1,
            min_free_after_gc: segment_size / 4,
        },
        ..Settings::default()
    }
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lax-{}-{name}", std::process::id()))
}

#[test]
fn tail_calls_run_in_constant_dump_space() {
    let mut interp = Interpreter::new().unwrap();
    eval(&mut interp, "(define (spin n) (if (= n 0) 'done (spin (- n 1))))");
    interp.reset_peak_dump_depth();
    assert_eq!(eval(&mut interp, "(spin 1000000)"), "done");
    let peak = interp.stats().peak_dump_depth;
    assert!(peak < 32, "dump grew to {peak} frames");
}

#[test]
fn tail_positions_in_derived_forms() {
    let mut interp = Interpreter::new().unwrap();
    let source = "(define (walk n) \
                    (cond ((= n 0) 'bottom) \
                          ((odd? n) (and #t (walk (- n 1)))) \
                          (else (or #f (let ((m (- n 1))) (walk m))))))";
    eval(&mut interp, source);
    interp.reset_peak_dump_depth();
    assert_eq!(eval(&mut interp, "(walk 200000)"), "bottom");
    assert!(interp.stats().peak_dump_depth < 32);
}

#[test]
fn deep_non_tail_recursion_uses_the_heap() {
    let mut interp = Interpreter::new().unwrap();
    eval(&mut interp, "(define (count n) (if (= n 0) 0 (+ 1 (count (- n 1)))))");
    assert_eq!(eval(&mut interp, "(count 100000)"), "100000");
    assert!(interp.stats().peak_dump_depth >= 100000);
}

#[test]
fn garbage_is_reclaimed_under_a_small_heap() {
    let mut interp = Interpreter::with_settings(small_heap(2000, 50)).unwrap();
    let source = "(define (churn n) (if (= n 0) 'ok (begin (make-vector 3 n) (list n n n) (churn (- n 1))))) \
                  (churn 50000)";
    assert_eq!(eval(&mut interp, source), "ok");
    let stats = interp.stats();
    assert!(stats.collections > 0);
    assert!(stats.segments <= 50);
}

#[test]
fn live_data_survives_collection() {
    let mut interp = Interpreter::with_settings(small_heap(1000, 200)).unwrap();
    let source = "(define (build n acc) (if (= n 0) acc (build (- n 1) (cons n acc)))) \
                  (define kept (build 20000 '())) \
                  (gc) \
                  (list (length kept) (car kept) (list-ref kept 19999))";
    assert_eq!(eval(&mut interp, source), "(20000 1 20000)");
}

#[test]
fn running_out_of_heap_is_recoverable() {
    let mut interp = Interpreter::with_settings(small_heap(1000, 8)).unwrap();
    let err = interp
        .eval_str("(define (grow acc) (grow (cons acc acc))) (grow '())")
        .unwrap_err();
    assert!(matches!(err, Error::OutOfMemory(_)));
    assert_eq!(eval(&mut interp, "(+ 1 2)"), "3");
}

#[test]
fn symbols_are_interned() {
    let mut interp = Interpreter::new().unwrap();
    assert_eq!(eval(&mut interp, "(eq? 'abc (string->symbol \"abc\"))"), "#t");
    let a = interp.intern("shared").unwrap();
    let b = interp.intern("shared").unwrap();
    assert_eq!(a, b);
}

#[test]
fn escaping_from_a_loop_with_call_cc() {
    let mut interp = Interpreter::new().unwrap();
    let source = "(call/cc (lambda (k) (for-each (lambda (x) (if (> x 2) (k x))) '(1 2 3 4)) 'none))";
    assert_eq!(eval(&mut interp, source), "3");
}

#[test]
fn reentering_a_continuation_loops() {
    let mut interp = Interpreter::new().unwrap();
    let source = "(let ((n 0) (k #f)) \
                    (let ((r (call/cc (lambda (c) (set! k c) 0)))) \
                      (set! n (+ n 1)) \
                      (if (< n 5) (k n) (list n r))))";
    assert_eq!(eval(&mut interp, source), "(5 4)");
}

#[test]
fn dynamic_wind_unwinds_on_escape() {
    let mut interp = Interpreter::new().unwrap();
    let source = "(define trail '()) \
                  (define (note x) (set! trail (cons x trail))) \
                  (call/cc (lambda (k) \
                    (dynamic-wind \
                      (lambda () (note 'in)) \
                      (lambda () (k 'escaped) (note 'unreachable)) \
                      (lambda () (note 'out))))) \
                  (reverse trail)";
    assert_eq!(eval(&mut interp, source), "(in out)");
}

#[test]
fn mutation_contracts() {
    let mut interp = Interpreter::new().unwrap();
    assert!(matches!(
        interp.eval_str("(string-set! \"literal\" 0 #\\x)"),
        Err(Error::MutateImmutable(_))
    ));
    assert!(matches!(
        interp.eval_str("(set! never-defined 1)"),
        Err(Error::UnboundVariable(_))
    ));
    assert!(interp.lookup_global("never-defined").is_none());
    assert_eq!(eval(&mut interp, "(define s (string-copy \"abc\")) (string-set! s 0 #\\x) s"), "\"xbc\"");
}

#[test]
fn immutable_pairs_reject_set_car_and_set_cdr() {
    let mut interp = Interpreter::new().unwrap();
    let one = interp.make_integer(1).unwrap();
    interp.pin(one);
    let nil = interp.nil();
    let frozen = interp.immutable_cons(one, nil).unwrap();
    interp.unpin(one);
    interp.define_global("frozen", frozen).unwrap();
    assert!(matches!(
        interp.eval_str("(set-car! frozen 2)"),
        Err(Error::MutateImmutable(_))
    ));
    assert!(matches!(
        interp.eval_str("(set-cdr! frozen '(2))"),
        Err(Error::MutateImmutable(_))
    ));
    assert_eq!(eval(&mut interp, "frozen"), "(1)");
    // quoted data is ordinary, mutable structure
    assert_eq!(eval(&mut interp, "(define q '(1 2)) (set-car! q 9) q"), "(9 2)");
}

#[test]
fn arity_is_enforced_for_closures_and_primitives() {
    let mut interp = Interpreter::new().unwrap();
    eval(&mut interp, "(define (two a b) a) (define (rest a . more) more)");
    assert!(matches!(interp.eval_str("(two 1)"), Err(Error::Arity { .. })));
    match interp.eval_str("(two 1 2 3)") {
        Err(Error::Arity { expected, got, .. }) => {
            assert_eq!(expected, "2");
            assert_eq!(got, 3);
        }
        other => panic!("expected an arity error, got {other:?}"),
    }
    assert!(matches!(interp.eval_str("((lambda () 1) 'extra)"), Err(Error::Arity { .. })));
    assert!(matches!(interp.eval_str("(car 1 2)"), Err(Error::Arity { .. })));
    assert_eq!(eval(&mut interp, "(rest 1 2 3)"), "(2 3)");
}

#[test]
fn numeric_contract() {
    let mut interp = Interpreter::new().unwrap();
    assert_eq!(eval(&mut interp, "(list (eqv? 2 2.0) (= 2 2.0) (eqv? 2.0 2.0) (eq? '() '()))"), "(#f #t #t #t)");
    assert_eq!(eval(&mut interp, "(list (/ 6 3) (/ 1 2) (exact? (/ 6 3)) (inexact? (/ 1 2)))"), "(2 0.5 #t #t)");
    assert!(matches!(interp.eval_str("(* 9223372036854775807 2)"), Err(Error::Overflow(_))));
    assert!(matches!(interp.eval_str("(quotient 1 0)"), Err(Error::DivisionByZero(_))));
    assert!(matches!(interp.eval_str("(/ 1 0.0)"), Err(Error::DivisionByZero(_))));
}

#[test]
fn minimum_integer_through_integer_division() {
    let mut interp = Interpreter::new().unwrap();
    let min = i64::MIN;
    assert!(matches!(interp.eval_str(&format!("(gcd {min})")), Err(Error::Overflow(_))));
    assert!(matches!(interp.eval_str(&format!("(gcd {min} 0)")), Err(Error::Overflow(_))));
    assert!(matches!(interp.eval_str(&format!("(lcm {min} 1)")), Err(Error::Overflow(_))));
    assert!(matches!(interp.eval_str(&format!("(quotient {min} -1)")), Err(Error::Overflow(_))));
    assert!(matches!(interp.eval_str(&format!("(abs {min})")), Err(Error::Overflow(_))));
    assert_eq!(eval(&mut interp, &format!("(gcd {min} 6)")), "2");
    assert_eq!(eval(&mut interp, &format!("(remainder {min} -1)")), "0");
    assert_eq!(eval(&mut interp, &format!("(modulo {min} -1)")), "0");
    assert_eq!(eval(&mut interp, &format!("(quotient {min} 1)")), min.to_string());
    assert_eq!(eval(&mut interp, "(+ 1 2)"), "3");
}

#[test]
fn huge_buffers_are_out_of_memory() {
    let mut interp = Interpreter::new().unwrap();
    assert!(matches!(
        interp.eval_str("(make-vector 4611686018427387903 0)"),
        Err(Error::OutOfMemory(_))
    ));
    assert!(matches!(
        interp.eval_str("(make-string 4611686018427387903 #\\a)"),
        Err(Error::OutOfMemory(_))
    ));
    assert!(matches!(
        interp.eval_str("(make-string 9223372036854775807)"),
        Err(Error::OutOfMemory(_))
    ));
    assert_eq!(eval(&mut interp, "(vector-length (make-vector 1000 0))"), "1000");
    assert_eq!(eval(&mut interp, "(make-string 3 #\\z)"), "\"zzz\"");
}

#[test]
fn buffer_limit_is_configurable() {
    let settings = Settings {
        max_buffer_len: 16,
        ..Settings::default()
    };
    let mut interp = Interpreter::with_settings(settings).unwrap();
    assert_eq!(eval(&mut interp, "(vector-length (make-vector 16))"), "16");
    assert!(matches!(interp.eval_str("(make-vector 17)"), Err(Error::OutOfMemory(_))));
    assert!(matches!(interp.eval_str("(make-string 17)"), Err(Error::OutOfMemory(_))));
}

#[test]
fn long_quasiquoted_lists_expand() {
    let mut interp = Interpreter::new().unwrap();
    let items = "x ".repeat(20_000);
    assert_eq!(eval(&mut interp, &format!("(length `({items}))")), "20000");
    let source = format!("(define y 7) (length `({items} ,y ,@(list 1 2)))");
    assert_eq!(eval(&mut interp, &source), "20003");
    let nested = format!("`{}{}", "(".repeat(20_001), ")".repeat(20_001));
    assert_eq!(eval(&mut interp, &format!("(pair? {nested})")), "#t");
}

#[test]
fn prelude_procedures() {
    let mut interp = Interpreter::new().unwrap();
    assert_eq!(eval(&mut interp, "(map + '(1 2 3) '(10 20 30))"), "(11 22 33)");
    assert_eq!(eval(&mut interp, "(map (lambda (x) (* x x)) '(1 2 3))"), "(1 4 9)");
    assert_eq!(eval(&mut interp, "(filter odd? '(1 2 3 4 5))"), "(1 3 5)");
    assert_eq!(eval(&mut interp, "(fold-left - 0 '(1 2 3))"), "-6");
    assert_eq!(eval(&mut interp, "(fold-right cons '() '(1 2 3))"), "(1 2 3)");
    assert_eq!(
        eval(&mut interp, "(call-with-output-string (lambda (p) (for-each (lambda (x) (display x p)) '(a b c))))"),
        "\"abc\""
    );
    assert_eq!(eval(&mut interp, "(define s (cons-stream 1 (cons-stream 2 '()))) (stream-car (stream-cdr s))"), "2");
    assert_eq!(eval(&mut interp, "(when (> 1 0) 'yes)"), "yes");
}

#[test]
fn error_hook_supplies_a_value() {
    let mut interp = Interpreter::new().unwrap();
    eval(&mut interp, "(define (*error-hook* message . irritants) (cons 'handled irritants))");
    assert_eq!(eval(&mut interp, "(list 1 (error \"boom\" 2 3))"), "(1 (handled 2 3))");
    assert_eq!(eval(&mut interp, "(car (car '()))"), "handled");
}

#[test]
fn error_inside_the_hook_aborts() {
    let mut interp = Interpreter::new().unwrap();
    eval(&mut interp, "(define (*error-hook* . args) (car '()))");
    assert!(matches!(interp.eval_str("(error \"first\")"), Err(Error::WrongType { .. })));
    eval(&mut interp, "(define *error-hook* #f)");
    assert!(matches!(interp.eval_str("(error \"plain\")"), Err(Error::User { .. })));
}

#[test]
fn loading_files() {
    let path = temp_path("lib.scm");
    std::fs::write(&path, "(define (triple x) (* 3 x))\n(define loaded 'yes)\n(triple 7)\n").unwrap();
    let mut interp = Interpreter::new().unwrap();
    let value = interp.load_file(&path).unwrap();
    assert_eq!(interp.write_to_string(value), "21");
    let source = format!("(load {:?}) loaded", path.display().to_string());
    assert_eq!(eval(&mut interp, &source), "yes");
    let _ = std::fs::remove_file(path);
}

#[test]
fn self_loading_file_hits_the_nesting_limit() {
    let path = temp_path("self.scm");
    std::fs::write(&path, format!("(load {:?})\n", path.display().to_string())).unwrap();
    let mut interp = Interpreter::new().unwrap();
    assert!(matches!(interp.load_file(&path), Err(Error::NestingTooDeep(_))));
    assert_eq!(eval(&mut interp, "'still-alive"), "still-alive");
    let _ = std::fs::remove_file(path);
}

fn host_sum(interp: &mut Interpreter, args: CellRef) -> Result<CellRef> {
    let mut total = 0;
    for arg in interp.list_to_vec(args)? {
        total += interp.integer_value(arg).unwrap_or(0);
    }
    interp.make_integer(total)
}

/// `(twice f x)` calls back into Scheme: `(f (f x))`.
fn twice(interp: &mut Interpreter, args: CellRef) -> Result<CellRef> {
    let procedure = interp.car(args)?;
    let x = interp.car(interp.cdr(args)?)?;
    let once_args = interp.list_from(&[x])?;
    let once = interp.call(procedure, once_args)?;
    let again_args = interp.list_from(&[once])?;
    interp.call(procedure, again_args)
}

#[test]
fn foreign_functions_are_procedures() {
    let mut interp = Interpreter::new().unwrap();
    interp
        .register_foreign_functions(&[("host-sum", host_sum), ("twice", twice)])
        .unwrap();
    assert_eq!(eval(&mut interp, "(host-sum 1 2 3)"), "6");
    assert_eq!(eval(&mut interp, "(apply host-sum '(4 5))"), "9");
    assert_eq!(eval(&mut interp, "(procedure? host-sum)"), "#t");
    assert_eq!(eval(&mut interp, "(twice (lambda (x) (* x 10)) 3)"), "300");
    assert_eq!(eval(&mut interp, "(+ 1 (twice (lambda (x) (+ x 1)) 0))"), "3");
}

#[test]
fn host_calls_into_scheme() {
    let mut interp = Interpreter::new().unwrap();
    eval(&mut interp, "(define (answer) 42) (define (add a b) (+ a b))");
    let answer = interp.apply0("answer").unwrap();
    assert_eq!(interp.integer_value(answer), Some(42));
    let add = interp.lookup_global("add").unwrap();
    let one = interp.make_integer(1).unwrap();
    interp.pin(one);
    let two = interp.make_integer(2).unwrap();
    let args = interp.list_from(&[one, two]).unwrap();
    interp.unpin(one);
    let sum = interp.call(add, args).unwrap();
    assert_eq!(interp.integer_value(sum), Some(3));
}

#[test]
fn output_can_be_captured() {
    let mut interp = Interpreter::new().unwrap();
    interp.set_output_port_string().unwrap();
    eval(&mut interp, "(for-each (lambda (x) (write x) (newline)) '(1 \"two\" #\\3))");
    assert_eq!(interp.take_output().as_deref(), Some("1\n\"two\"\n#\\3\n"));
}
