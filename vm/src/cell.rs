//! The tagged cell every Scheme value lives in.

use heap::{CellFlags, CellRef, HeapCell};

use crate::{dump::DumpFrame, env::Frame, interpreter::Interpreter, port::Port, Result};

/// Host function callable from Scheme. Receives the argument list.
pub type ForeignFn = fn(&mut Interpreter, CellRef) -> Result<CellRef>;

/// Code plus the environment it closes over. Shared by lambdas and macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Closure {
    /// `(formals . body)`
    pub code: CellRef,
    pub env: CellRef,
}

/// A captured dump together with the dynamic-wind list active at capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    pub dump: CellRef,
    pub winders: CellRef,
}

/// A delayed expression. Once forced, `expr` holds the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Promise {
    pub expr: CellRef,
    pub env: Option<CellRef>,
    pub forced: bool,
}

#[derive(Debug)]
pub enum Payload {
    /// A free-list slot.
    Free(Option<CellRef>),
    Nil,
    True,
    False,
    Eof,
    Unspecified,
    Pair(CellRef, CellRef),
    Integer(i64),
    Real(f64),
    Character(char),
    String(String),
    Vector(Vec<CellRef>),
    Symbol(Box<str>),
    Port(Box<Port>),
    Closure(Closure),
    Macro(Closure),
    Continuation(Continuation),
    /// Index into the interpreter's primitive table.
    Primitive(usize),
    Foreign(ForeignFn),
    Promise(Promise),
    Environment(Box<Frame>),
    Frame(DumpFrame),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Free(_) => "free cell",
            Payload::Nil => "empty list",
            Payload::True | Payload::False => "boolean",
            Payload::Eof => "eof object",
            Payload::Unspecified => "unspecified",
            Payload::Pair(..) => "pair",
            Payload::Integer(_) => "integer",
            Payload::Real(_) => "real",
            Payload::Character(_) => "character",
            Payload::String(_) => "string",
            Payload::Vector(_) => "vector",
            Payload::Symbol(_) => "symbol",
            Payload::Port(_) => "port",
            Payload::Closure(_) => "closure",
            Payload::Macro(_) => "macro",
            Payload::Continuation(_) => "continuation",
            Payload::Primitive(_) | Payload::Foreign(_) => "procedure",
            Payload::Promise(_) => "promise",
            Payload::Environment(_) => "environment",
            Payload::Frame(_) => "frame",
        }
    }

    #[inline]
    pub fn is_procedure(&self) -> bool {
        matches!(
            self,
            Payload::Closure(_)
                | Payload::Continuation(_)
                | Payload::Primitive(_)
                | Payload::Foreign(_)
        )
    }

    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Payload::Integer(_) | Payload::Real(_))
    }
}

#[derive(Debug)]
pub struct Cell {
    flags: CellFlags,
    payload: Payload,
}

impl Cell {
    #[inline]
    pub fn new(payload: Payload) -> Self {
        Self {
            flags: CellFlags::NONE,
            payload,
        }
    }

    #[inline]
    pub fn immutable(payload: Payload) -> Self {
        Self {
            flags: CellFlags::IMMUTABLE,
            payload,
        }
    }

    #[inline(always)]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[inline(always)]
    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    #[inline]
    pub fn is_immutable(&self) -> bool {
        self.flags.contains(CellFlags::IMMUTABLE)
    }

    #[inline]
    pub fn set_immutable(&mut self) {
        self.flags = self.flags.with(CellFlags::IMMUTABLE);
    }
}

impl HeapCell for Cell {
    fn vacant(next: Option<CellRef>) -> Self {
        Self::new(Payload::Free(next))
    }

    fn next_vacant(&self) -> Option<CellRef> {
        match self.payload {
            Payload::Free(next) => next,
            _ => None,
        }
    }

    fn is_vacant(&self) -> bool {
        matches!(self.payload, Payload::Free(_))
    }

    fn flags(&self) -> CellFlags {
        self.flags
    }

    fn set_flags(&mut self, flags: CellFlags) {
        self.flags = flags;
    }

    fn trace(&self, visitor: &mut dyn FnMut(CellRef)) {
        match &self.payload {
            Payload::Pair(car, cdr) => {
                visitor(*car);
                visitor(*cdr);
            }
            Payload::Vector(items) => items.iter().copied().for_each(visitor),
            Payload::Closure(closure) | Payload::Macro(closure) => {
                visitor(closure.code);
                visitor(closure.env);
            }
            Payload::Continuation(k) => {
                visitor(k.dump);
                visitor(k.winders);
            }
            Payload::Promise(promise) => {
                visitor(promise.expr);
                if let Some(env) = promise.env {
                    visitor(env);
                }
            }
            Payload::Environment(frame) => frame.trace(visitor),
            Payload::Frame(frame) => frame.trace(visitor),
            Payload::Free(_)
            | Payload::Nil
            | Payload::True
            | Payload::False
            | Payload::Eof
            | Payload::Unspecified
            | Payload::Integer(_)
            | Payload::Real(_)
            | Payload::Character(_)
            | Payload::String(_)
            | Payload::Symbol(_)
            | Payload::Port(_)
            | Payload::Primitive(_)
            | Payload::Foreign(_) => {}
        }
    }
}
