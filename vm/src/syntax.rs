//! Special forms. Each handler starts with the form's operands in `code`.

use heap::CellRef;

use crate::{
    cell::{Closure, Payload, Promise},
    dump::Step,
    interpreter::Interpreter,
    op::Op,
    Error, Result,
};

/// Pending work while expanding a quasiquote template.
enum Quasi {
    /// Expand a template at the given quasiquote depth.
    Expand(CellRef, usize),
    /// An unquoted expression, used as is.
    Literal(CellRef),
    /// `(cons car cdr)` from the two latest results.
    Cons,
    /// `(append arg rest)` from the latest result.
    Append(CellRef),
    /// `(list 'tag inner)` from the latest result.
    Tag(CellRef),
    /// `(list->vector inner)` from the latest result.
    Vector,
}

fn pop_result(results: &mut Vec<CellRef>) -> Result<CellRef> {
    results
        .pop()
        .ok_or_else(|| Error::syntax("quasiquote: malformed template"))
}

impl Interpreter {
    fn split(&self, form: CellRef, keyword: &str) -> Result<(CellRef, CellRef)> {
        self.pair(form)
            .ok_or_else(|| Error::syntax(format!("{keyword}: malformed form")))
    }

    fn expect_symbol(&self, cell: CellRef, keyword: &str) -> Result<CellRef> {
        if self.is_symbol(cell) {
            Ok(cell)
        } else {
            Err(Error::syntax(format!(
                "{keyword}: expected a symbol, got {}",
                self.write_to_string(cell)
            )))
        }
    }

    /// `(name init)` → `(name, init)`.
    fn binding_parts(&self, binding: CellRef, keyword: &str) -> Result<(CellRef, CellRef)> {
        let (name, rest) = self.split(binding, keyword)?;
        let (init, _) = self.split(rest, keyword)?;
        Ok((self.expect_symbol(name, keyword)?, init))
    }

    pub(crate) fn op_quote(&mut self) -> Result<Step> {
        let (datum, _) = self.split(self.st.code, "quote")?;
        self.s_return(datum)
    }

    pub(crate) fn op_lambda(&mut self) -> Result<Step> {
        let code = self.st.code;
        let (_, body) = self.split(code, "lambda")?;
        if self.is_nil(body) {
            return Err(Error::syntax("lambda: empty body"));
        }
        let closure = self.alloc(Payload::Closure(Closure {
            code,
            env: self.st.env,
        }))?;
        self.s_return(closure)
    }

    pub(crate) fn op_define0(&mut self) -> Result<Step> {
        let (target, rest) = self.split(self.st.code, "define")?;
        if let Some((name, formals)) = self.pair(target) {
            let name = self.expect_symbol(name, "define")?;
            if self.is_nil(rest) {
                return Err(Error::syntax("define: empty body"));
            }
            let code = self.cons(formals, rest)?;
            let closure = self.alloc(Payload::Closure(Closure {
                code,
                env: self.st.env,
            }))?;
            self.define(self.st.env, name, closure)?;
            return self.s_return(name);
        }

        let name = self.expect_symbol(target, "define")?;
        let Some((expr, _)) = self.pair(rest) else {
            self.define(self.st.env, name, self.st.sp.unspecified)?;
            return self.s_return(name);
        };
        self.push_frame(Op::Define1, self.st.sp.nil, name)?;
        self.st.code = expr;
        self.goto(Op::Eval)
    }

    /// `(define-macro (name . formals) body ...)`
    pub(crate) fn op_define_macro(&mut self) -> Result<Step> {
        let (target, body) = self.split(self.st.code, "define-macro")?;
        let (name, formals) = self.split(target, "define-macro")?;
        let name = self.expect_symbol(name, "define-macro")?;
        if self.is_nil(body) {
            return Err(Error::syntax("define-macro: empty body"));
        }
        let code = self.cons(formals, body)?;
        let transformer = self.alloc(Payload::Macro(Closure {
            code,
            env: self.st.env,
        }))?;
        self.define(self.st.env, name, transformer)?;
        self.s_return(name)
    }

    pub(crate) fn op_set0(&mut self) -> Result<Step> {
        let (name, rest) = self.split(self.st.code, "set!")?;
        let name = self.expect_symbol(name, "set!")?;
        let (expr, _) = self.split(rest, "set!")?;
        self.push_frame(Op::Set1, self.st.sp.nil, name)?;
        self.st.code = expr;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_if0(&mut self) -> Result<Step> {
        let (test, branches) = self.split(self.st.code, "if")?;
        self.split(branches, "if")?;
        self.push_frame(Op::If1, self.st.sp.nil, branches)?;
        self.st.code = test;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_if1(&mut self) -> Result<Step> {
        let (consequent, rest) = self.split(self.st.code, "if")?;
        if self.is_true(self.st.value) {
            self.st.code = consequent;
        } else if let Some((alternative, _)) = self.pair(rest) {
            self.st.code = alternative;
        } else {
            return self.s_return(self.st.sp.unspecified);
        }
        self.goto(Op::Eval)
    }

    /// Evaluates a body; the last expression runs without a saved frame.
    pub(crate) fn op_begin(&mut self) -> Result<Step> {
        let Some((first, rest)) = self.pair(self.st.code) else {
            return self.s_return(self.st.sp.unspecified);
        };
        if !self.is_nil(rest) {
            self.push_frame(Op::Begin, self.st.sp.nil, rest)?;
        }
        self.st.code = first;
        self.goto(Op::Eval)
    }

    // ── cond / case / and / or ────────────────────────────────────────

    /// Starts testing the first of `clauses`.
    pub(crate) fn cond_next(&mut self, clauses: CellRef) -> Result<Step> {
        let Some((clause, _)) = self.pair(clauses) else {
            return self.s_return(self.st.sp.unspecified);
        };
        let (test, _) = self.split(clause, "cond")?;
        self.st.code = clauses;
        if test == self.st.sym.else_ {
            self.st.value = self.st.sp.t;
            return self.goto(Op::Cond1);
        }
        self.push_frame(Op::Cond1, self.st.sp.nil, clauses)?;
        self.st.code = test;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_cond1(&mut self) -> Result<Step> {
        let (clause, rest) = self.split(self.st.code, "cond")?;
        if !self.is_true(self.st.value) {
            return self.cond_next(rest);
        }
        let (_, body) = self.split(clause, "cond")?;
        match self.pair(body) {
            None => self.s_return(self.st.value),
            Some((arrow, receiver)) if arrow == self.st.sym.arrow => {
                let (receiver, _) = self.split(receiver, "cond")?;
                self.call_with_quoted(receiver, self.st.value)
            }
            Some(_) => {
                self.st.code = body;
                self.goto(Op::Begin)
            }
        }
    }

    /// Evaluates `(receiver 'value)`. `receiver` must be reachable from
    /// `code` and `value` from a register.
    fn call_with_quoted(&mut self, receiver: CellRef, value: CellRef) -> Result<Step> {
        let base = self.st.scratch.len();
        self.protect(receiver);
        let quoted = self.list_from(&[self.st.sym.quote, value])?;
        self.protect(quoted);
        let call = self.list_from(&[receiver, quoted])?;
        self.st.scratch.truncate(base);
        self.st.code = call;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_case0(&mut self) -> Result<Step> {
        let (key, clauses) = self.split(self.st.code, "case")?;
        self.push_frame(Op::Case1, self.st.sp.nil, clauses)?;
        self.st.code = key;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_case1(&mut self) -> Result<Step> {
        let key = self.st.value;
        let mut clauses = self.st.code;
        while let Some((clause, rest)) = self.pair(clauses) {
            let (data, body) = self.split(clause, "case")?;
            let matched = data == self.st.sym.else_ || {
                let mut datum = data;
                let mut found = false;
                while let Some((candidate, more)) = self.pair(datum) {
                    if self.eqv(key, candidate) {
                        found = true;
                        break;
                    }
                    datum = more;
                }
                found
            };
            if matched {
                if let Some((arrow, receiver)) = self.pair(body) {
                    if arrow == self.st.sym.arrow {
                        let (receiver, _) = self.split(receiver, "case")?;
                        return self.call_with_quoted(receiver, key);
                    }
                }
                self.st.code = body;
                return self.goto(Op::Begin);
            }
            clauses = rest;
        }
        self.s_return(self.st.sp.unspecified)
    }

    /// Evaluates the next operand of `and`/`or`; the last one is a tail call.
    pub(crate) fn and_or_next(&mut self, resume: Op) -> Result<Step> {
        let Some((expr, rest)) = self.pair(self.st.code) else {
            return self.s_return(self.st.value);
        };
        if !self.is_nil(rest) {
            self.push_frame(resume, self.st.sp.nil, rest)?;
        }
        self.st.code = expr;
        self.goto(Op::Eval)
    }

    // ── let family ────────────────────────────────────────────────────

    pub(crate) fn op_let0(&mut self) -> Result<Step> {
        let code = self.st.code;
        let (first, rest) = self.split(code, "let")?;
        let bindings = if self.is_symbol(first) {
            self.split(rest, "let")?.0
        } else {
            first
        };
        // the form rides along as the first collected value
        self.st.value = code;
        self.st.args = self.st.sp.nil;
        self.st.code = bindings;
        self.goto(Op::Let1)
    }

    /// Evaluates binding inits one by one, then continues at `done` with
    /// the original form in `code` and the values in `args`.
    pub(crate) fn collect_bindings(&mut self, resume: Op, done: Op, keyword: &str) -> Result<Step> {
        self.st.args = self.cons(self.st.value, self.st.args)?;
        let code = self.st.code;
        if let Some((binding, rest)) = self.pair(code) {
            let (_, init) = self.binding_parts(binding, keyword)?;
            self.push_frame(resume, self.st.args, rest)?;
            self.st.code = init;
            self.st.args = self.st.sp.nil;
            return self.goto(Op::Eval);
        }
        if !self.is_nil(code) {
            return Err(Error::syntax(format!("{keyword}: malformed bindings")));
        }
        let collected = self.reverse(self.st.args)?;
        let (form, values) = self.split(collected, keyword)?;
        self.st.code = form;
        self.st.args = values;
        self.goto(done)
    }

    pub(crate) fn op_let2(&mut self) -> Result<Step> {
        let form = self.st.code;
        let (first, rest) = self.split(form, "let")?;

        if self.is_symbol(first) {
            let (bindings, body) = self.split(rest, "let")?;
            let mut names = Vec::new();
            for binding in self.list_to_vec(bindings)? {
                names.push(self.binding_parts(binding, "let")?.0);
            }
            self.st.env = self.new_frame(Some(self.st.env))?;
            let formals = self.list_from(&names)?;
            let code = self.cons(formals, body)?;
            let closure = self.alloc(Payload::Closure(Closure {
                code,
                env: self.st.env,
            }))?;
            self.define(self.st.env, first, closure)?;
            self.st.code = closure;
            return self.goto(Op::Apply);
        }

        let frame = self.new_frame(Some(self.st.env))?;
        let mut bindings = first;
        let mut values = self.st.args;
        while let (Some((binding, more)), Some((value, rest_values))) =
            (self.pair(bindings), self.pair(values))
        {
            let (name, _) = self.binding_parts(binding, "let")?;
            self.frame_mut(frame)?.define(name, value);
            bindings = more;
            values = rest_values;
        }
        self.st.env = frame;
        self.st.code = rest;
        self.goto(Op::Begin)
    }

    pub(crate) fn op_let_star0(&mut self) -> Result<Step> {
        let (bindings, body) = self.split(self.st.code, "let*")?;
        let Some((binding, _)) = self.pair(bindings) else {
            self.st.env = self.new_frame(Some(self.st.env))?;
            self.st.code = body;
            return self.goto(Op::Begin);
        };
        let (_, init) = self.binding_parts(binding, "let*")?;
        self.push_frame(Op::LetStar1, body, bindings)?;
        self.st.code = init;
        self.goto(Op::Eval)
    }

    /// `code` holds the bindings starting at the one just evaluated,
    /// `args` the body. Each binding gets its own frame.
    pub(crate) fn op_let_star1(&mut self) -> Result<Step> {
        let (binding, rest) = self.split(self.st.code, "let*")?;
        let (name, _) = self.binding_parts(binding, "let*")?;
        let value = self.st.value;
        let frame = self.new_frame(Some(self.st.env))?;
        self.frame_mut(frame)?.define(name, value);
        self.st.env = frame;

        match self.pair(rest) {
            Some((next, _)) => {
                let (_, init) = self.binding_parts(next, "let*")?;
                self.push_frame(Op::LetStar1, self.st.args, rest)?;
                self.st.code = init;
                self.goto(Op::Eval)
            }
            None => {
                self.st.code = self.st.args;
                self.st.args = self.st.sp.nil;
                self.goto(Op::Begin)
            }
        }
    }

    pub(crate) fn op_letrec0(&mut self) -> Result<Step> {
        let code = self.st.code;
        let (bindings, _) = self.split(code, "letrec")?;
        self.st.env = self.new_frame(Some(self.st.env))?;
        self.st.value = code;
        self.st.args = self.st.sp.nil;
        self.st.code = bindings;
        self.goto(Op::LetRec1)
    }

    /// Inits were evaluated inside the new frame; bind them there now.
    pub(crate) fn op_letrec2(&mut self) -> Result<Step> {
        let (bindings, body) = self.split(self.st.code, "letrec")?;
        let env = self.st.env;
        let mut bindings = bindings;
        let mut values = self.st.args;
        while let (Some((binding, more)), Some((value, rest_values))) =
            (self.pair(bindings), self.pair(values))
        {
            let (name, _) = self.binding_parts(binding, "letrec")?;
            self.frame_mut(env)?.define(name, value);
            bindings = more;
            values = rest_values;
        }
        self.st.code = body;
        self.goto(Op::Begin)
    }

    /// Rewrites `do` into a named `let` loop and evaluates that.
    pub(crate) fn op_do(&mut self) -> Result<Step> {
        let (clauses, rest) = self.split(self.st.code, "do")?;
        let (exit, body) = self.split(rest, "do")?;
        let (test, results) = self.split(exit, "do")?;

        let base = self.st.scratch.len();
        let name = self.gensym()?;

        let mut bindings = Vec::new();
        let mut steps = vec![name];
        for clause in self.list_to_vec(clauses)? {
            let (var, after) = self.split(clause, "do")?;
            let var = self.expect_symbol(var, "do")?;
            let (init, step) = self.split(after, "do")?;
            let binding = self.list_from(&[var, init])?;
            bindings.push(self.protect(binding));
            steps.push(self.pair(step).map_or(var, |(step, _)| step));
        }
        let bindings = self.list_from(&bindings)?;
        self.protect(bindings);
        let recur = self.list_from(&steps)?;
        self.protect(recur);

        let mut loop_body = vec![self.st.sym.begin];
        loop_body.extend(self.list_to_vec(body)?);
        loop_body.push(recur);
        let loop_body = self.list_from(&loop_body)?;
        self.protect(loop_body);
        let finish = self.cons(self.st.sym.begin, results)?;
        self.protect(finish);
        let branch = self.list_from(&[self.st.sym.if_, test, finish, loop_body])?;
        self.protect(branch);
        let expanded = self.list_from(&[self.st.sym.let_, name, bindings, branch])?;

        self.st.scratch.truncate(base);
        self.st.code = expanded;
        self.goto(Op::Eval)
    }

    // ── quasiquote ────────────────────────────────────────────────────

    pub(crate) fn op_quasiquote(&mut self) -> Result<Step> {
        let (template, _) = self.split(self.st.code, "quasiquote")?;
        let base = self.st.scratch.len();
        let expanded = self.quasi(template);
        self.st.scratch.truncate(base);
        self.st.code = expanded?;
        self.goto(Op::Eval)
    }

    /// Expands a template into construction code. Works from an explicit
    /// task stack so that neither long nor deeply nested templates grow the
    /// native stack. Every intermediate result stays rooted on scratch.
    fn quasi(&mut self, template: CellRef) -> Result<CellRef> {
        let sym = self.st.sym;
        let builtins = self.st.builtins;
        let mut tasks = vec![Quasi::Expand(template, 0)];
        let mut results: Vec<CellRef> = Vec::new();
        while let Some(task) = tasks.pop() {
            let value = match task {
                Quasi::Expand(template, depth) => match *self.payload(template) {
                    Payload::Pair(head, tail) => {
                        self.quasi_pair(&mut tasks, head, tail, depth)?;
                        continue;
                    }
                    Payload::Vector(ref items) => {
                        let items = items.clone();
                        let list = self.list_from(&items)?;
                        self.protect(list);
                        tasks.push(Quasi::Vector);
                        tasks.push(Quasi::Expand(list, depth));
                        continue;
                    }
                    Payload::Symbol(_) | Payload::Nil => self.list_from(&[sym.quote, template])?,
                    _ => template,
                },
                Quasi::Literal(cell) => cell,
                Quasi::Cons => {
                    let cdr = pop_result(&mut results)?;
                    let car = pop_result(&mut results)?;
                    self.list_from(&[builtins.cons, car, cdr])?
                }
                Quasi::Append(arg) => {
                    let rest = pop_result(&mut results)?;
                    self.list_from(&[builtins.append, arg, rest])?
                }
                Quasi::Tag(tag) => {
                    let inner = pop_result(&mut results)?;
                    self.quasi_tagged(tag, inner)?
                }
                Quasi::Vector => {
                    let inner = pop_result(&mut results)?;
                    self.list_from(&[builtins.list_to_vector, inner])?
                }
            };
            self.protect(value);
            results.push(value);
        }
        pop_result(&mut results)
    }

    /// Schedules the expansion of one pair of a template, or pushes the
    /// unquoted expression straight onto the task stack as a literal.
    fn quasi_pair(&mut self, tasks: &mut Vec<Quasi>, head: CellRef, tail: CellRef, depth: usize) -> Result<()> {
        let sym = self.st.sym;
        if head == sym.unquote {
            let (arg, _) = self.split(tail, "unquote")?;
            if depth == 0 {
                tasks.push(Quasi::Literal(arg));
            } else {
                tasks.push(Quasi::Tag(sym.unquote));
                tasks.push(Quasi::Expand(arg, depth - 1));
            }
            return Ok(());
        }
        if head == sym.quasiquote {
            let (arg, _) = self.split(tail, "quasiquote")?;
            tasks.push(Quasi::Tag(sym.quasiquote));
            tasks.push(Quasi::Expand(arg, depth + 1));
            return Ok(());
        }
        if let Some((marker, spliced)) = self.pair(head) {
            if marker == sym.unquote_splicing {
                let (arg, _) = self.split(spliced, "unquote-splicing")?;
                if depth == 0 {
                    tasks.push(Quasi::Append(arg));
                    tasks.push(Quasi::Expand(tail, depth));
                } else {
                    tasks.push(Quasi::Cons);
                    tasks.push(Quasi::Expand(tail, depth));
                    tasks.push(Quasi::Tag(sym.unquote_splicing));
                    tasks.push(Quasi::Expand(arg, depth - 1));
                }
                return Ok(());
            }
        }
        tasks.push(Quasi::Cons);
        tasks.push(Quasi::Expand(tail, depth));
        tasks.push(Quasi::Expand(head, depth));
        Ok(())
    }

    /// `(list 'tag inner)`
    fn quasi_tagged(&mut self, tag: CellRef, inner: CellRef) -> Result<CellRef> {
        self.protect(inner);
        let quoted = self.list_from(&[self.st.sym.quote, tag])?;
        self.protect(quoted);
        self.list_from(&[self.st.builtins.list, quoted, inner])
    }

    // ── promises ──────────────────────────────────────────────────────

    pub(crate) fn op_delay(&mut self) -> Result<Step> {
        let (expr, _) = self.split(self.st.code, "delay")?;
        let promise = self.alloc(Payload::Promise(Promise {
            expr,
            env: Some(self.st.env),
            forced: false,
        }))?;
        self.s_return(promise)
    }

    /// `(cons-stream a b)` is `(cons a (delay b))`.
    pub(crate) fn op_cons_stream0(&mut self) -> Result<Step> {
        let (head, rest) = self.split(self.st.code, "cons-stream")?;
        let (tail, _) = self.split(rest, "cons-stream")?;
        self.push_frame(Op::ConsStream1, self.st.sp.nil, tail)?;
        self.st.code = head;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_cons_stream1(&mut self) -> Result<Step> {
        let promise = self.alloc(Payload::Promise(Promise {
            expr: self.st.code,
            env: Some(self.st.env),
            forced: false,
        }))?;
        let stream = self.cons(self.st.value, promise)?;
        self.s_return(stream)
    }
}
