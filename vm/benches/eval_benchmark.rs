use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vm::{HeapSettings, Interpreter, Settings};

fn bench_settings() -> Settings {
    Settings {
        heap: HeapSettings {
            segment_size: 50_000,
            max_segments: 100,
            initial_segments: 2,
            min_free_after_gc: 12_500,
        },
        ..Settings::default()
    }
}

/// Defines `setup` once, then times `expr` evaluated `iters_per_sample`
/// times per sample.
fn run_case(c: &mut Criterion, name: &str, setup: &str, expr: &str, iters_per_sample: usize) {
    let mut interp = Interpreter::with_settings(bench_settings()).expect("interpreter");
    interp.eval_str(setup).expect("setup");
    let form = interp.read_str(expr).expect("read");
    interp.pin(form);
    let form = interp.car(form).expect("one form");
    let warmup = interp.evaluate(form).expect("warmup");
    black_box(warmup);

    c.bench_function(name, |b| {
        b.iter(|| {
            for _ in 0..iters_per_sample {
                let value = interp.evaluate(form).expect("evaluate");
                black_box(value);
            }
        })
    });
}

fn bench_eval(c: &mut Criterion) {
    run_case(
        c,
        "tail_loop_100k",
        "(define (spin n) (if (= n 0) 'done (spin (- n 1))))",
        "(spin 100000)",
        1,
    );
    run_case(
        c,
        "cons_churn",
        "(define (build n acc) (if (= n 0) acc (build (- n 1) (cons n acc))))",
        "(length (build 10000 '()))",
        1,
    );
    run_case(
        c,
        "fib_20",
        "(define (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))",
        "(fib 20)",
        1,
    );
    run_case(
        c,
        "call_cc_escape",
        "(define (find-first pred l) (call/cc (lambda (k) (for-each (lambda (x) (if (pred x) (k x))) l) #f))) \
         (define numbers (let loop ((i 0) (acc '())) (if (= i 1000) acc (loop (+ i 1) (cons i acc)))))",
        "(find-first (lambda (x) (< x 10)) numbers)",
        100,
    );
}

criterion_group!(benches, bench_eval);
criterion_main!(benches);
