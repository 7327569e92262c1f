use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use script_lang::CompileFailure;

/// Runtime error kinds a script can raise and catch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    KeyError,
    AttributeError,
    ImportError,
    SyntaxError,
    KernelError,
    RuntimeError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::NameError,
        ErrorKind::TypeError,
        ErrorKind::ValueError,
        ErrorKind::ZeroDivisionError,
        ErrorKind::IndexError,
        ErrorKind::KeyError,
        ErrorKind::AttributeError,
        ErrorKind::ImportError,
        ErrorKind::SyntaxError,
        ErrorKind::KernelError,
        ErrorKind::RuntimeError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::KeyError => "KeyError",
            ErrorKind::AttributeError => "AttributeError",
            ErrorKind::ImportError => "ImportError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::KernelError => "KernelError",
            ErrorKind::RuntimeError => "RuntimeError",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Whether an `except <handler>` clause catches this kind.
    /// `Exception` catches everything.
    pub fn caught_by(self, handler: &str) -> bool {
        handler == "Exception" || handler == self.name()
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One frame of an unwinding error, as recorded by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Source identity of the frame's code.
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Source text of `line`, when the frame had it at hand.
    pub code: Option<String>,
}

/// A script-level failure with its frame chain, outermost frame first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub frames: Vec<FrameRecord>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: Vec::new(),
        }
    }
}

/// Abnormal completion of a statement or expression.
///
/// `Cancelled` is injected at a debug pause and is never catchable by
/// script `except` clauses; `finally` blocks still run while it unwinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    Error(ScriptError),
    Cancelled,
}

impl From<ScriptError> for Interrupt {
    fn from(e: ScriptError) -> Self {
        Interrupt::Error(e)
    }
}

/// Shorthand for raising a script error.
pub(crate) fn raise<T>(kind: ErrorKind, message: impl Into<String>) -> Result<T, Interrupt> {
    Err(Interrupt::Error(ScriptError::new(kind, message)))
}

/// Why a run did not finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type")]
pub enum RunFailure {
    #[error("SyntaxError: {0}")]
    Compile(CompileFailure),

    #[error("{0}")]
    Runtime(ScriptError),
}

impl From<CompileFailure> for RunFailure {
    fn from(e: CompileFailure) -> Self {
        RunFailure::Compile(e)
    }
}

impl From<ScriptError> for RunFailure {
    fn from(e: ScriptError) -> Self {
        RunFailure::Runtime(e)
    }
}

/// A scoped-resource step around a run could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("cannot read the current working directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("cannot change working directory to {path}: {source}")]
    ChangeDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from driving a debug session.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("a debug session is already active")]
    SessionActive,

    #[error("no debug session is active")]
    NoSession,

    #[error("the debug session is not paused")]
    NotPaused,

    #[error("the debug worker exited unexpectedly")]
    WorkerGone,

    #[error("failed to start the debug worker: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Isolation(#[from] IsolationError),
}
