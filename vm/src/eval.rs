//! The evaluator loop.
//!
//! Evaluation is a single trampoline over [`Op`] states. Nothing recurses on
//! the Rust stack: pending work is pushed onto the heap-resident dump, so
//! tail calls run in constant space and `call/cc` captures the dump by
//! reference.

use heap::CellRef;

use crate::{
    cell::{Closure, Payload},
    dump::Step,
    interpreter::{Interpreter, Registers},
    op::Op,
    port::{Port, PortFlags},
    primitives::PrimitiveKind,
    Error, Result,
};

impl Interpreter {
    // ── Entry points ──────────────────────────────────────────────────

    /// Evaluates `expr` in the global environment.
    ///
    /// The result stays rooted until the next top-level evaluation; pin it
    /// to keep it longer. May be called from inside a foreign function.
    pub fn evaluate(&mut self, expr: CellRef) -> Result<CellRef> {
        self.execute(|interp| {
            interp.st.code = expr;
            interp.goto(Op::Eval)
        })
    }

    /// Reads and evaluates every datum in `source`, returning the last value.
    pub fn eval_str(&mut self, source: &str) -> Result<CellRef> {
        self.load_str(source)
    }

    pub fn load_str(&mut self, source: &str) -> Result<CellRef> {
        self.load_port(Port::input_string(source))
    }

    /// Evaluates every datum read from `port`. While it runs, `port` is
    /// the current input port.
    pub fn load_port(&mut self, port: Port) -> Result<CellRef> {
        let port = self.make_port(port)?;
        self.execute(|interp| interp.begin_load(port))
    }

    /// Applies `procedure` to `args` (a list).
    pub fn call(&mut self, procedure: CellRef, args: CellRef) -> Result<CellRef> {
        self.execute(|interp| {
            interp.st.code = procedure;
            interp.st.args = args;
            interp.goto(Op::Apply)
        })
    }

    /// Calls the global procedure `name` with no arguments.
    pub fn apply0(&mut self, name: &str) -> Result<CellRef> {
        let procedure = self
            .lookup_global(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))?;
        self.call(procedure, self.st.sp.nil)
    }

    /// Runs the trampoline from a clean dump, saving the caller's registers
    /// so that nested evaluations leave the outer one intact.
    fn execute(&mut self, entry: impl FnOnce(&mut Self) -> Result<Step>) -> Result<CellRef> {
        self.st.saved.push(Registers {
            op: self.st.op,
            code: self.st.code,
            env: self.st.env,
            args: self.st.args,
            value: self.st.value,
            dump: self.st.dump,
            winders: self.st.winders,
            inport: self.st.inport,
            load_depth: self.st.load_stack.len(),
            scratch_depth: self.st.scratch.len(),
        });
        let nil = self.st.sp.nil;
        self.st.op = Op::Eval;
        self.st.code = nil;
        self.st.args = nil;
        self.st.env = self.st.global_env;
        self.st.value = self.st.sp.unspecified;
        self.st.dump = nil;
        self.st.winders = nil;

        let first = entry(self);
        let result = self.run(first);

        let Some(saved) = self.st.saved.pop() else {
            return result;
        };
        self.st.op = saved.op;
        self.st.code = saved.code;
        self.st.env = saved.env;
        self.st.args = saved.args;
        self.st.value = saved.value;
        self.st.dump = saved.dump;
        self.st.winders = saved.winders;
        self.st.inport = saved.inport;
        self.st.scratch.truncate(saved.scratch_depth);
        if let Ok(value) = result {
            if self.st.saved.is_empty() {
                self.st.value = value;
            } else {
                self.st.scratch.push(value);
            }
        }
        result
    }

    fn run(&mut self, first: Result<Step>) -> Result<CellRef> {
        let mut step = first;
        loop {
            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Halt) => return Ok(self.st.value),
                Err(err) => self.signal(err)?,
            }
            step = self.step();
        }
    }

    fn step(&mut self) -> Result<Step> {
        match self.st.op {
            Op::Eval => self.op_eval(),
            Op::E0Args => self.op_e0args(),
            Op::E1Args => {
                self.st.args = self.cons(self.st.value, self.st.args)?;
                self.eval_operands()
            }
            Op::Apply => self.op_apply(),
            Op::DoMacro => {
                self.st.code = self.st.value;
                self.goto(Op::Eval)
            }

            Op::Quote => self.op_quote(),
            Op::Lambda => self.op_lambda(),
            Op::Define0 => self.op_define0(),
            Op::Define1 => {
                self.define(self.st.env, self.st.code, self.st.value)?;
                self.s_return(self.st.code)
            }
            Op::DefineMacro => self.op_define_macro(),
            Op::Set0 => self.op_set0(),
            Op::Set1 => {
                self.assign(self.st.env, self.st.code, self.st.value)?;
                self.s_return(self.st.sp.unspecified)
            }
            Op::If0 => self.op_if0(),
            Op::If1 => self.op_if1(),
            Op::Begin => self.op_begin(),
            Op::Cond0 => self.cond_next(self.st.code),
            Op::Cond1 => self.op_cond1(),
            Op::Case0 => self.op_case0(),
            Op::Case1 => self.op_case1(),
            Op::And0 => {
                if self.is_nil(self.st.code) {
                    return self.s_return(self.st.sp.t);
                }
                self.and_or_next(Op::And1)
            }
            Op::And1 => {
                if !self.is_true(self.st.value) {
                    return self.s_return(self.st.value);
                }
                self.and_or_next(Op::And1)
            }
            Op::Or0 => {
                if self.is_nil(self.st.code) {
                    return self.s_return(self.st.sp.f);
                }
                self.and_or_next(Op::Or1)
            }
            Op::Or1 => {
                if self.is_true(self.st.value) {
                    return self.s_return(self.st.value);
                }
                self.and_or_next(Op::Or1)
            }
            Op::Let0 => self.op_let0(),
            Op::Let1 => self.collect_bindings(Op::Let1, Op::Let2, "let"),
            Op::Let2 => self.op_let2(),
            Op::LetStar0 => self.op_let_star0(),
            Op::LetStar1 => self.op_let_star1(),
            Op::LetRec0 => self.op_letrec0(),
            Op::LetRec1 => self.collect_bindings(Op::LetRec1, Op::LetRec2, "letrec"),
            Op::LetRec2 => self.op_letrec2(),
            Op::Do => self.op_do(),
            Op::Quasiquote => self.op_quasiquote(),
            Op::Delay => self.op_delay(),
            Op::ConsStream0 => self.op_cons_stream0(),
            Op::ConsStream1 => self.op_cons_stream1(),

            Op::CallCC => self.op_call_cc(),
            Op::ContinuationReturn => self.s_return(self.st.args),
            Op::DynamicWind => self.op_dynamic_wind(),
            Op::Wind1 => self.op_wind1(),
            Op::Wind2 => self.op_wind2(),
            Op::Wind3 => self.s_return(self.st.args),
            Op::WindInvoke => self.op_wind_invoke(),
            Op::WindSet => {
                self.st.winders = self.st.args;
                self.s_return(self.st.value)
            }
            Op::ApplyProc => self.op_apply_proc(),
            Op::EvalProc => self.op_eval_proc(),
            Op::Force => self.op_force(),
            Op::SaveForced => self.op_save_forced(),
            Op::Load => self.op_load(),
            Op::LoadRead => self.op_load_read(),
            Op::ErrorHookDone => self.s_return(self.st.value),
        }
    }

    // ── Errors ────────────────────────────────────────────────────────

    /// Routes a failed step to `*error-hook*` when one is installed, or
    /// unwinds the whole evaluation.
    fn signal(&mut self, err: Error) -> Result<()> {
        let irritants = std::mem::replace(&mut self.st.irritants, self.st.sp.nil);
        if err.is_recoverable() && !self.dump_contains(Op::ErrorHookDone) {
            let hook = self.lookup(self.st.global_env, self.st.sym.error_hook);
            if let Some(hook) = hook.filter(|hook| self.is_procedure(*hook)) {
                let irritants = match err {
                    Error::User { .. } => irritants,
                    _ => self.st.sp.nil,
                };
                match self.invoke_error_hook(hook, &err, irritants) {
                    Ok(()) => return Ok(()),
                    Err(hook_err) => log::warn!("error hook could not run: {hook_err}"),
                }
            }
        }
        Err(self.abort(err))
    }

    fn invoke_error_hook(&mut self, hook: CellRef, err: &Error, irritants: CellRef) -> Result<()> {
        let message = match err {
            Error::User { message, .. } => message.clone(),
            other => other.to_string(),
        };
        self.st.args = irritants;
        let message = self.make_string(message)?;
        self.st.args = self.cons(message, self.st.args)?;
        self.st.code = hook;
        self.push_frame(Op::ErrorHookDone, self.st.sp.nil, self.st.sp.nil)?;
        self.st.op = Op::Apply;
        Ok(())
    }

    fn abort(&mut self, err: Error) -> Error {
        log::debug!("evaluation aborted: {err}");
        let base = self.st.saved.last().map_or(0, |saved| saved.load_depth);
        let mut innermost = true;
        while self.st.load_stack.len() > base {
            if let Some(port) = self.st.load_stack.pop() {
                if let Ok(port) = self.port_mut(port, "load") {
                    if innermost && port.name() != "<string>" {
                        log::warn!("{}:{}: {err}", port.name(), port.line());
                    }
                    innermost = false;
                    let _ = port.close(PortFlags::INPUT);
                }
            }
        }
        self.st.dump = self.st.sp.nil;
        err
    }

    // ── Eval / apply ──────────────────────────────────────────────────

    fn trace(&mut self, prefix: &str, cell: CellRef) -> Result<()> {
        let line = format!("{prefix}{}\n", self.write_to_string(cell));
        self.write_output(&line)
    }

    fn op_eval(&mut self) -> Result<Step> {
        let code = self.st.code;
        if self.st.tracing {
            self.trace("eval: ", code)?;
        }
        match *self.payload(code) {
            Payload::Symbol(_) => match self.lookup(self.st.env, code) {
                Some(value) => self.s_return(value),
                None => Err(self.unbound(code)),
            },
            Payload::Pair(head, tail) => {
                if let Some(&op) = self.st.syntax.get(&head) {
                    self.st.code = tail;
                    return self.goto(op);
                }
                self.push_frame(Op::E0Args, self.st.sp.nil, code)?;
                self.st.code = head;
                self.goto(Op::Eval)
            }
            _ => self.s_return(code),
        }
    }

    fn unbound(&self, symbol: CellRef) -> Error {
        Error::UnboundVariable(self.symbol_name(symbol).unwrap_or("?").to_owned())
    }

    fn op_e0args(&mut self) -> Result<Step> {
        let operator = self.st.value;
        let operands = self.cdr(self.st.code)?;
        if matches!(self.payload(operator), Payload::Macro(_)) {
            self.push_frame(Op::DoMacro, self.st.sp.nil, self.st.sp.nil)?;
            self.st.code = operator;
            self.st.args = operands;
            return self.goto(Op::Apply);
        }
        self.st.args = self.cons(operator, self.st.sp.nil)?;
        self.st.code = operands;
        self.eval_operands()
    }

    /// Evaluates the remaining operands in `code`, accumulating values in
    /// reverse in `args`. Literals and variables are evaluated in place.
    fn eval_operands(&mut self) -> Result<Step> {
        loop {
            let code = self.st.code;
            let Some((operand, rest)) = self.pair(code) else {
                if !self.is_nil(code) {
                    return Err(Error::syntax("improper argument list"));
                }
                let call = self.reverse(self.st.args)?;
                let Some((procedure, args)) = self.pair(call) else {
                    return Err(Error::syntax("empty application"));
                };
                self.st.code = procedure;
                self.st.args = args;
                return self.goto(Op::Apply);
            };
            if !self.st.tracing {
                let immediate = match self.payload(operand) {
                    Payload::Symbol(_) => Some(
                        self.lookup(self.st.env, operand)
                            .ok_or_else(|| self.unbound(operand))?,
                    ),
                    Payload::Pair(..) => None,
                    _ => Some(operand),
                };
                if let Some(value) = immediate {
                    self.st.args = self.cons(value, self.st.args)?;
                    self.st.code = rest;
                    continue;
                }
            }
            self.push_frame(Op::E1Args, self.st.args, rest)?;
            self.st.code = operand;
            self.st.args = self.st.sp.nil;
            return self.goto(Op::Eval);
        }
    }

    fn op_apply(&mut self) -> Result<Step> {
        let procedure = self.st.code;
        if self.st.tracing {
            let call = self.cons(procedure, self.st.args)?;
            self.trace("apply: ", call)?;
        }
        match *self.payload(procedure) {
            Payload::Primitive(index) => {
                let desc = self.primitives[index];
                let args = self.list_to_vec(self.st.args)?;
                desc.arity.check(desc.name, args.len())?;
                match desc.kind {
                    PrimitiveKind::Native(function) => {
                        let value = function(self, &args)?;
                        self.s_return(value)
                    }
                    PrimitiveKind::Control(op) => self.goto(op),
                }
            }
            Payload::Foreign(function) => {
                let args = self.st.args;
                let value = function(self, args)?;
                self.s_return(value)
            }
            Payload::Closure(Closure { code, env }) | Payload::Macro(Closure { code, env }) => {
                let (formals, body) = self.pair(code).ok_or_else(|| Error::syntax("bad closure"))?;
                let frame = self.new_frame(Some(env))?;
                self.bind_formals(frame, formals, self.st.args)?;
                self.st.env = frame;
                self.st.code = body;
                self.goto(Op::Begin)
            }
            Payload::Continuation(k) => self.throw(k),
            _ => Err(Error::NotApplicable(self.write_to_string(procedure))),
        }
    }

    fn bind_formals(&mut self, frame: CellRef, formals: CellRef, args: CellRef) -> Result<()> {
        let (mut names, mut values) = (formals, args);
        loop {
            match *self.payload(names) {
                Payload::Pair(name, rest) => {
                    let Some((value, more)) = self.pair(values) else {
                        return Err(self.closure_arity(formals, args));
                    };
                    if !self.is_symbol(name) {
                        return Err(Error::syntax("lambda: formal is not a symbol"));
                    }
                    self.frame_mut(frame)?.define(name, value);
                    names = rest;
                    values = more;
                }
                Payload::Nil if self.is_nil(values) => return Ok(()),
                Payload::Nil => return Err(self.closure_arity(formals, args)),
                Payload::Symbol(_) => {
                    self.frame_mut(frame)?.define(names, values);
                    return Ok(());
                }
                _ => return Err(Error::syntax("lambda: malformed formals")),
            }
        }
    }

    fn closure_arity(&self, formals: CellRef, args: CellRef) -> Error {
        let mut required = 0;
        let mut names = formals;
        while let Some((_, rest)) = self.pair(names) {
            required += 1;
            names = rest;
        }
        let expected = if self.is_symbol(names) {
            format!("at least {required}")
        } else {
            required.to_string()
        };
        Error::Arity {
            procedure: "#<closure>".into(),
            expected,
            got: self.list_length(args).unwrap_or(0),
        }
    }

    // ── Loading ───────────────────────────────────────────────────────

    /// Makes `port` the current input port and starts evaluating its data.
    pub(crate) fn begin_load(&mut self, port: CellRef) -> Result<Step> {
        let limit = self.settings.max_load_depth;
        if self.st.load_stack.len() >= limit {
            self.port_mut(port, "load")?.close(PortFlags::INPUT)?;
            return Err(Error::NestingTooDeep(format!(
                "load: more than {limit} nested files"
            )));
        }
        self.st.load_stack.push(port);
        self.st.args = self.st.inport;
        self.st.inport = port;
        self.st.value = self.st.sp.unspecified;
        self.goto(Op::LoadRead)
    }

    /// `args` holds the input port to restore once the file is done.
    fn op_load_read(&mut self) -> Result<Step> {
        let Some(&port) = self.st.load_stack.last() else {
            return self.s_return(self.st.value);
        };
        let datum = self.read_datum(port)?;
        if datum == self.st.sp.eof {
            self.st.load_stack.pop();
            self.port_mut(port, "load")?.close(PortFlags::INPUT)?;
            self.st.inport = self.st.args;
            return self.s_return(self.st.value);
        }
        self.st.code = datum;
        self.st.env = self.st.global_env;
        self.push_frame(Op::LoadRead, self.st.args, self.st.sp.nil)?;
        self.goto(Op::Eval)
    }
}
