//! Procedures that take over the evaluator instead of returning a value:
//! continuations, dynamic-wind, apply/eval, force, and load.

use std::fs::File;

use heap::CellRef;

use crate::{
    cell::{Continuation, Payload},
    dump::Step,
    interpreter::Interpreter,
    op::Op,
    port::Port,
    Error, Result,
};

impl Interpreter {
    fn expect_procedure(&self, cell: CellRef, procedure: &str) -> Result<CellRef> {
        if self.is_procedure(cell) {
            Ok(cell)
        } else {
            Err(self.wrong_type(procedure, "procedure", cell))
        }
    }

    pub(crate) fn op_call_cc(&mut self) -> Result<Step> {
        let receiver = self.expect_procedure(self.car(self.st.args)?, "call/cc")?;
        let k = self.alloc(Payload::Continuation(Continuation {
            dump: self.st.dump,
            winders: self.st.winders,
        }))?;
        self.st.args = self.cons(k, self.st.sp.nil)?;
        self.st.code = receiver;
        self.goto(Op::Apply)
    }

    /// Invokes a continuation. The continuation itself is in `code`.
    pub(crate) fn throw(&mut self, k: Continuation) -> Result<Step> {
        let value = self
            .pair(self.st.args)
            .map_or(self.st.sp.unspecified, |(value, _)| value);
        if k.winders == self.st.winders {
            self.st.dump = k.dump;
            return self.s_return(value);
        }
        self.rewind(k, value)
    }

    fn winder_nodes(&self, mut list: CellRef) -> Vec<CellRef> {
        let mut nodes = Vec::new();
        while let Some((_, parent)) = self.pair(list) {
            nodes.push(list);
            list = parent;
        }
        nodes
    }

    /// Schedules the `after` thunks being left (innermost first) and the
    /// `before` thunks being entered (outermost first), then delivers
    /// `value` to the continuation's dump.
    fn rewind(&mut self, k: Continuation, value: CellRef) -> Result<Step> {
        let leaving = self.winder_nodes(self.st.winders);
        let entering = self.winder_nodes(k.winders);
        let (mut i, mut j) = (leaving.len(), entering.len());
        while i > 0 && j > 0 && leaving[i - 1] == entering[j - 1] {
            i -= 1;
            j -= 1;
        }

        // (thunk, winders while it runs, winders afterwards)
        let mut steps = Vec::with_capacity(i + j);
        for node in &leaving[..i] {
            let (entry, parent) = self.car_cdr(*node)?;
            steps.push((self.cdr(entry)?, parent, parent));
        }
        for node in entering[..j].iter().rev() {
            let (entry, parent) = self.car_cdr(*node)?;
            steps.push((self.car(entry)?, parent, *node));
        }

        self.st.dump = k.dump;
        self.push_frame(Op::ContinuationReturn, value, self.st.sp.nil)?;
        for (thunk, during, after) in steps.into_iter().rev() {
            let winders = self.cons(during, after)?;
            self.push_frame(Op::WindInvoke, winders, thunk)?;
        }
        self.s_return(self.st.sp.unspecified)
    }

    fn car_cdr(&self, cell: CellRef) -> Result<(CellRef, CellRef)> {
        self.pair(cell)
            .ok_or_else(|| self.wrong_type("dynamic-wind", "pair", cell))
    }

    /// `code` is the thunk, `args` is `(during . after)`.
    pub(crate) fn op_wind_invoke(&mut self) -> Result<Step> {
        let (during, after) = self.car_cdr(self.st.args)?;
        self.st.winders = during;
        self.push_frame(Op::WindSet, after, self.st.sp.nil)?;
        self.st.args = self.st.sp.nil;
        self.goto(Op::Apply)
    }

    /// `(dynamic-wind before thunk after)`; the three stay in `args`
    /// across every stage.
    pub(crate) fn op_dynamic_wind(&mut self) -> Result<Step> {
        let [before, thunk, after] = self.wind_args()?;
        self.expect_procedure(before, "dynamic-wind")?;
        self.expect_procedure(thunk, "dynamic-wind")?;
        self.expect_procedure(after, "dynamic-wind")?;
        self.push_frame(Op::Wind1, self.st.args, self.st.sp.nil)?;
        self.st.code = before;
        self.st.args = self.st.sp.nil;
        self.goto(Op::Apply)
    }

    fn wind_args(&self) -> Result<[CellRef; 3]> {
        let items = self.list_to_vec(self.st.args)?;
        <[CellRef; 3]>::try_from(items).map_err(|items| Error::Arity {
            procedure: "dynamic-wind".into(),
            expected: "3".into(),
            got: items.len(),
        })
    }

    pub(crate) fn op_wind1(&mut self) -> Result<Step> {
        let [before, thunk, after] = self.wind_args()?;
        let entry = self.cons(before, after)?;
        self.st.winders = self.cons(entry, self.st.winders)?;
        self.push_frame(Op::Wind2, self.st.args, self.st.sp.nil)?;
        self.st.code = thunk;
        self.st.args = self.st.sp.nil;
        self.goto(Op::Apply)
    }

    pub(crate) fn op_wind2(&mut self) -> Result<Step> {
        let [_, _, after] = self.wind_args()?;
        if let Some((_, outer)) = self.pair(self.st.winders) {
            self.st.winders = outer;
        }
        self.push_frame(Op::Wind3, self.st.value, self.st.sp.nil)?;
        self.st.code = after;
        self.st.args = self.st.sp.nil;
        self.goto(Op::Apply)
    }

    /// `(apply proc arg ... list)`
    pub(crate) fn op_apply_proc(&mut self) -> Result<Step> {
        let items = self.list_to_vec(self.st.args)?;
        let (procedure, spread) = match items.as_slice() {
            [procedure, middle @ .., last] => {
                if self.list_length(*last).is_none() {
                    return Err(self.wrong_type("apply", "proper list", *last));
                }
                (*procedure, self.list_with_tail(middle, *last)?)
            }
            _ => {
                return Err(Error::Arity {
                    procedure: "apply".into(),
                    expected: "at least 2".into(),
                    got: items.len(),
                });
            }
        };
        self.st.code = procedure;
        self.st.args = spread;
        self.goto(Op::Apply)
    }

    /// `(eval expr [environment])`
    pub(crate) fn op_eval_proc(&mut self) -> Result<Step> {
        let (expr, rest) = self.car_cdr(self.st.args)?;
        let env = match self.pair(rest) {
            Some((env, _)) => {
                self.frame(env)?;
                env
            }
            None => self.st.global_env,
        };
        self.st.code = expr;
        self.st.env = env;
        self.goto(Op::Eval)
    }

    pub(crate) fn op_force(&mut self) -> Result<Step> {
        let target = self.car(self.st.args)?;
        let Payload::Promise(promise) = *self.payload(target) else {
            return self.s_return(target);
        };
        if promise.forced {
            return self.s_return(promise.expr);
        }
        self.push_frame(Op::SaveForced, self.st.sp.nil, target)?;
        self.st.code = promise.expr;
        self.st.env = promise.env.unwrap_or(self.st.global_env);
        self.goto(Op::Eval)
    }

    /// Memoises the forced value. A promise forced again while it was
    /// running keeps the first value delivered.
    pub(crate) fn op_save_forced(&mut self) -> Result<Step> {
        let value = self.st.value;
        let result = match self.payload_mut(self.st.code) {
            Payload::Promise(promise) => {
                if !promise.forced {
                    promise.forced = true;
                    promise.expr = value;
                    promise.env = None;
                }
                promise.expr
            }
            _ => value,
        };
        self.s_return(result)
    }

    /// `(load filename)`
    pub(crate) fn op_load(&mut self) -> Result<Step> {
        let name = self.car(self.st.args)?;
        let Some(path) = self.string_value(name).map(str::to_owned) else {
            return Err(self.wrong_type("load", "string", name));
        };
        let file = File::open(&path).map_err(|err| {
            Error::Io(std::io::Error::new(err.kind(), format!("load: {path}: {err}")))
        })?;
        log::debug!("loading {path}");
        let port = self.make_port(Port::input_file(file, path))?;
        self.begin_load(port)
    }
}
