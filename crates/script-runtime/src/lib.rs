//! Script execution: isolation, publication, run and debug, tracebacks.
//!
//! [`execute`] runs a compiled unit straight through on the calling thread.
//! [`DebugSession`] runs it on a worker thread under a statement-level
//! tracer and reports pauses over a channel. Both hand back a [`RunReport`]
//! holding only plain data.

pub mod builtins;
pub mod console;
pub mod debug;
pub mod error;
pub mod interp;
pub mod isolation;
pub mod modules;
pub mod publish;
pub mod runner;
pub mod traceback;
pub mod value;

pub use console::{Console, ConsoleOutcome};
pub use debug::{DebugCommand, DebugEvent, DebugMode, DebugSession, PauseSnapshot};
pub use error::{EngineError, ErrorKind, FrameRecord, Interrupt, IsolationError, RunFailure, ScriptError};
pub use interp::{Interpreter, LogSink, TraceEvent, Tracer, MAX_CALL_DEPTH};
pub use isolation::{IsolationOptions, IsolationScope, Namespace, INJECTED_NAMES};
pub use modules::{ModuleError, ModuleRegistry, SharedModules, MODULE_EXTENSION};
pub use publish::{discover, PublicationRegistry};
pub use runner::{execute, execute_source, Execution, RunOptions, RunReport, RunStatus};
pub use traceback::report;
pub use value::Value;
