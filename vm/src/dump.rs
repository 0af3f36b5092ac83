//! The dump: the evaluator's control stack, kept in the heap as a list of
//! frame cells so that `call/cc` can capture it by reference.

use heap::CellRef;

use crate::{cell::Payload, interpreter::Interpreter, op::Op, Result};

/// A saved evaluator state. Frames are never mutated after they are pushed,
/// so captured continuations can share them.
#[derive(Debug, Clone, Copy)]
pub struct DumpFrame {
    pub op: Op,
    pub args: CellRef,
    pub env: CellRef,
    pub code: CellRef,
    /// Number of frames below and including this one.
    pub depth: usize,
}

impl DumpFrame {
    pub fn trace(&self, visitor: &mut dyn FnMut(CellRef)) {
        visitor(self.args);
        visitor(self.env);
        visitor(self.code);
    }
}

/// What the trampoline should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    Halt,
}

impl Interpreter {
    pub(crate) fn frame_at(&self, dump: CellRef) -> Option<(DumpFrame, CellRef)> {
        let Payload::Pair(frame, rest) = *self.payload(dump) else {
            return None;
        };
        match self.payload(frame) {
            Payload::Frame(frame) => Some((*frame, rest)),
            _ => None,
        }
    }

    pub(crate) fn dump_depth(&self) -> usize {
        self.frame_at(self.st.dump).map_or(0, |(frame, _)| frame.depth)
    }

    /// Saves `op` with the current environment so that a later
    /// [`Interpreter::s_return`] resumes it.
    pub(crate) fn push_frame(&mut self, op: Op, args: CellRef, code: CellRef) -> Result<()> {
        let depth = self.dump_depth() + 1;
        let frame = self.alloc(Payload::Frame(DumpFrame {
            op,
            args,
            env: self.st.env,
            code,
            depth,
        }))?;
        self.st.dump = self.alloc(Payload::Pair(frame, self.st.dump))?;
        if depth > self.st.peak_dump_depth {
            self.st.peak_dump_depth = depth;
        }
        Ok(())
    }

    /// Delivers `value` to the innermost saved frame, or halts when the dump
    /// is empty.
    pub(crate) fn s_return(&mut self, value: CellRef) -> Result<Step> {
        self.st.value = value;
        let Some((frame, rest)) = self.frame_at(self.st.dump) else {
            return Ok(Step::Halt);
        };
        self.st.op = frame.op;
        self.st.args = frame.args;
        self.st.env = frame.env;
        self.st.code = frame.code;
        self.st.dump = rest;
        Ok(Step::Continue)
    }

    /// Transfers control to `op` without touching the dump.
    #[inline]
    pub(crate) fn goto(&mut self, op: Op) -> Result<Step> {
        self.st.op = op;
        Ok(Step::Continue)
    }

    pub(crate) fn dump_contains(&self, op: Op) -> bool {
        let mut dump = self.st.dump;
        while let Some((frame, rest)) = self.frame_at(dump) {
            if frame.op == op {
                return true;
            }
            dump = rest;
        }
        false
    }
}
