//! Environment frames and variable lookup.
//!
//! An environment is a chain of frames. Each frame owns its bindings; small
//! frames are scanned linearly and large ones (the global frame in practice)
//! grow a hash index keyed by symbol identity.

use ahash::AHashMap;
use heap::CellRef;

use crate::{cell::Payload, interpreter::Interpreter, Error, Result};

const INDEX_THRESHOLD: usize = 16;

#[derive(Debug, Default)]
pub struct Frame {
    parent: Option<CellRef>,
    bindings: Vec<(CellRef, CellRef)>,
    index: Option<AHashMap<CellRef, usize>>,
}

impl Frame {
    pub fn new(parent: Option<CellRef>) -> Self {
        Self {
            parent,
            bindings: Vec::new(),
            index: None,
        }
    }

    #[inline]
    pub fn parent(&self) -> Option<CellRef> {
        self.parent
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn position(&self, symbol: CellRef) -> Option<usize> {
        match &self.index {
            Some(index) => index.get(&symbol).copied(),
            None => self.bindings.iter().position(|(s, _)| *s == symbol),
        }
    }

    pub fn get(&self, symbol: CellRef) -> Option<CellRef> {
        self.position(symbol).map(|i| self.bindings[i].1)
    }

    /// Overwrites an existing binding. Returns false if `symbol` is not
    /// bound in this frame.
    pub fn set(&mut self, symbol: CellRef, value: CellRef) -> bool {
        match self.position(symbol) {
            Some(i) => {
                self.bindings[i].1 = value;
                true
            }
            None => false,
        }
    }

    pub fn define(&mut self, symbol: CellRef, value: CellRef) {
        if self.set(symbol, value) {
            return;
        }
        self.bindings.push((symbol, value));
        let slot = self.bindings.len() - 1;
        match &mut self.index {
            Some(index) => {
                index.insert(symbol, slot);
            }
            None if self.bindings.len() > INDEX_THRESHOLD => {
                let index = self
                    .bindings
                    .iter()
                    .enumerate()
                    .map(|(i, (s, _))| (*s, i))
                    .collect();
                self.index = Some(index);
            }
            None => {}
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.bindings.iter().map(|(s, _)| *s)
    }

    pub fn trace(&self, visitor: &mut dyn FnMut(CellRef)) {
        if let Some(parent) = self.parent {
            visitor(parent);
        }
        for (symbol, value) in &self.bindings {
            visitor(*symbol);
            visitor(*value);
        }
    }
}

impl Interpreter {
    pub(crate) fn new_frame(&mut self, parent: Option<CellRef>) -> Result<CellRef> {
        self.alloc(Payload::Environment(Box::new(Frame::new(parent))))
    }

    pub(crate) fn frame(&self, env: CellRef) -> Result<&Frame> {
        match self.payload(env) {
            Payload::Environment(frame) => Ok(frame),
            other => Err(Error::WrongType {
                procedure: "environment".into(),
                expected: "environment",
                got: other.kind_name().into(),
            }),
        }
    }

    pub(crate) fn frame_mut(&mut self, env: CellRef) -> Result<&mut Frame> {
        match self.heap.get_mut(env).payload_mut() {
            Payload::Environment(frame) => Ok(frame),
            other => Err(Error::WrongType {
                procedure: "environment".into(),
                expected: "environment",
                got: other.kind_name().into(),
            }),
        }
    }

    /// Finds the innermost binding of `symbol` starting at `env`.
    pub fn lookup(&self, env: CellRef, symbol: CellRef) -> Option<CellRef> {
        let mut current = Some(env);
        while let Some(env) = current {
            let Ok(frame) = self.frame(env) else {
                return None;
            };
            if let Some(value) = frame.get(symbol) {
                return Some(value);
            }
            current = frame.parent();
        }
        None
    }

    /// Binds `symbol` in the frame `env` itself, replacing any binding there.
    pub fn define(&mut self, env: CellRef, symbol: CellRef, value: CellRef) -> Result<()> {
        if !matches!(self.payload(symbol), Payload::Symbol(_)) {
            return Err(self.wrong_type("define", "symbol", symbol));
        }
        self.frame_mut(env)?.define(symbol, value);
        Ok(())
    }

    /// Updates the innermost existing binding of `symbol`.
    pub(crate) fn assign(&mut self, env: CellRef, symbol: CellRef, value: CellRef) -> Result<()> {
        let mut current = Some(env);
        while let Some(env) = current {
            let frame = self.frame_mut(env)?;
            if frame.set(symbol, value) {
                return Ok(());
            }
            current = frame.parent();
        }
        Err(Error::UnboundVariable(self.symbol_name(symbol).unwrap_or("?").to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_switch_to_an_index_when_large() {
        let mut interp = Interpreter::new().unwrap();
        let env = interp.new_frame(None).unwrap();
        interp.pin(env);
        let mut symbols = Vec::new();
        for i in 0..40 {
            let symbol = interp.intern(&format!("v{i}")).unwrap();
            let value = interp.make_integer(i).unwrap();
            interp.define(env, symbol, value).unwrap();
            symbols.push(symbol);
        }
        let frame = interp.frame(env).unwrap();
        assert!(frame.index.is_some());
        assert_eq!(frame.len(), 40);
        for (i, symbol) in symbols.iter().enumerate() {
            let value = interp.lookup(env, *symbol).unwrap();
            assert_eq!(interp.integer_value(value), Some(i as i64));
        }
    }

    #[test]
    fn lookup_walks_parents_and_assign_hits_innermost() {
        let mut interp = Interpreter::new().unwrap();
        let outer = interp.new_frame(None).unwrap();
        interp.pin(outer);
        let inner = interp.new_frame(Some(outer)).unwrap();
        interp.pin(inner);

        let x = interp.intern("x").unwrap();
        let one = interp.make_integer(1).unwrap();
        interp.define(outer, x, one).unwrap();
        assert_eq!(interp.lookup(inner, x), Some(one));

        let two = interp.make_integer(2).unwrap();
        interp.assign(inner, x, two).unwrap();
        assert_eq!(interp.lookup(outer, x), Some(two));

        let y = interp.intern("y").unwrap();
        assert!(matches!(
            interp.assign(inner, y, two),
            Err(Error::UnboundVariable(name)) if name == "y"
        ));
    }
}
