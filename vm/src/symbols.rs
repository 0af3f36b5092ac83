use ahash::AHashMap;
use heap::CellRef;

use crate::{cell::{Cell, Payload}, interpreter::Interpreter, Result};

/// Name → symbol cell. Two symbols are the same exactly when their cells are.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: AHashMap<Box<str>, CellRef>,
}

impl SymbolTable {
    #[inline]
    pub fn get(&self, name: &str) -> Option<CellRef> {
        self.by_name.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, cell: CellRef) {
        self.by_name.insert(name.into(), cell);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|name| &**name)
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        self.by_name.values().copied()
    }
}

impl Interpreter {
    /// Returns the unique symbol called `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> Result<CellRef> {
        if let Some(symbol) = self.st.symbols.get(name) {
            return Ok(symbol);
        }
        let symbol = self.alloc_cell(Cell::immutable(Payload::Symbol(name.into())))?;
        self.st.symbols.insert(name, symbol);
        Ok(symbol)
    }

    /// A fresh symbol, unique by identity. It is never entered in the
    /// table, so it is collected once nothing refers to it. Its name avoids
    /// every name interned so far.
    pub fn gensym(&mut self) -> Result<CellRef> {
        loop {
            self.st.gensym_counter += 1;
            let name = format!("gensym-{}", self.st.gensym_counter);
            if self.st.symbols.get(&name).is_none() {
                return self.alloc_cell(Cell::immutable(Payload::Symbol(name.into())));
            }
        }
    }

    /// Every interned name, sorted. Used for completion and `oblist`.
    pub fn symbol_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.st.symbols.names().map(str::to_owned).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_identity() {
        let mut interp = Interpreter::new().unwrap();
        let a = interp.intern("foo").unwrap();
        let b = interp.intern("foo").unwrap();
        let c = interp.intern("Foo").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interp.symbol_name(a), Some("foo"));
    }

    #[test]
    fn gensym_skips_taken_names() {
        let mut interp = Interpreter::new().unwrap();
        let taken = interp.intern("gensym-1").unwrap();
        let fresh = interp.gensym().unwrap();
        assert_ne!(taken, fresh);
        let name = interp.symbol_name(fresh).unwrap();
        assert!(name.starts_with("gensym-"));
        assert_ne!(name, "gensym-1");
    }

    #[test]
    fn gensyms_stay_out_of_the_table() {
        let mut interp = Interpreter::new().unwrap();
        interp
            .eval_str("(define (count-to n) (do ((i 0 (+ i 1))) ((= i n) i)))")
            .unwrap();
        let before = interp.symbol_names().len();
        for _ in 0..3 {
            let value = interp.eval_str("(count-to 3)").unwrap();
            assert_eq!(interp.integer_value(value), Some(3));
        }
        let fresh = interp.gensym().unwrap();
        assert_eq!(interp.symbol_names().len(), before);
        assert!(interp.is_symbol(fresh));
    }
}
