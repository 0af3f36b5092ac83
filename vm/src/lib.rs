//! Lax: a small embeddable Scheme interpreter.
//!
//! Values live in a garbage-collected cell heap. The evaluator is a
//! trampoline over an explicit, heap-resident dump, so tail calls run in
//! constant space and `call/cc` captures a continuation by reference.
//!
//! ```no_run
//! let mut interp = vm::Interpreter::new()?;
//! let value = interp.eval_str("(+ 1 2)")?;
//! assert_eq!(interp.write_to_string(value), "3");
//! # Ok::<(), vm::Error>(())
//! ```

pub mod cell;
mod control;
pub mod dump;
pub mod env;
pub mod error;
mod eval;
pub mod interpreter;
pub mod number;
pub mod op;
pub mod port;
pub mod primitives;
mod printer;
mod reader;
mod symbols;
mod syntax;

pub use cell::{ForeignFn, Payload};
pub use error::{Error, ReadError, Result};
pub use heap::{CellRef, GcStats, HeapSettings, SegmentAllocator, SystemAllocator};
pub use interpreter::{Interpreter, Settings, Stats};
pub use number::Number;
pub use port::{Port, PortFlags};
pub use symbols::SymbolTable;
