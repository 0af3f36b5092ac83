use std::io;

use heap::HeapError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Why the reader gave up on its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// Input ended inside a datum. The REPL uses this to ask for more lines.
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected ')'")]
    UnexpectedClose,
    #[error("misplaced '.'")]
    BadDot,
    #[error("bad character name #\\{0}")]
    BadCharacter(String),
    #[error("bad syntax #{0}")]
    BadHash(String),
    #[error("bad escape in string: \\{0}")]
    BadEscape(String),
}

/// Everything that can stop an evaluation.
///
/// Messages are rendered eagerly so that an error stays meaningful after the
/// cells it talks about have been collected.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    OutOfMemory(#[from] HeapError),
    #[error("{procedure}: expected {expected}, got {got}")]
    WrongType {
        procedure: String,
        expected: &'static str,
        got: String,
    },
    #[error("attempt to apply non-procedure {0}")]
    NotApplicable(String),
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("{0}: cannot mutate an immutable object")]
    MutateImmutable(String),
    #[error("{procedure}: expected {expected} arguments, got {got}")]
    Arity {
        procedure: String,
        expected: String,
        got: usize,
    },
    #[error("{0}: division by zero")]
    DivisionByZero(&'static str),
    #[error("{0}: integer overflow")]
    Overflow(&'static str),
    #[error("{0}")]
    NestingTooDeep(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("read error: {0}")]
    Read(#[from] ReadError),
    /// Raised by the `error` procedure. `irritants` is pre-rendered, each
    /// one preceded by a space.
    #[error("{message}{irritants}")]
    User { message: String, irritants: String },
    /// Raised by `exit`. Never routed to the error hook.
    #[error("exit {0}")]
    Exit(i32),
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    /// Errors the `*error-hook*` may intercept.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::OutOfMemory(_) | Self::Exit(_))
    }

    /// True when the reader ran out of input in the middle of a datum.
    pub fn is_incomplete_input(&self) -> bool {
        matches!(self, Self::Read(ReadError::UnexpectedEof))
    }
}
