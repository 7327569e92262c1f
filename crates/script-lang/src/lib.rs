//! Script Compiler: turns CAD script text into an executable unit.
//!
//! - [`lexer`]: `logos` tokens plus the indentation layout pass
//! - [`ast`]: statement and expression tree
//! - [`parser`]: recursive-descent parser
//! - [`unit`]: [`CompiledUnit`] bound to a source identity, and [`compile`]

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod unit;

pub use error::CompileFailure;
pub use unit::{compile, compile_module, line_of, CompiledUnit, SCRIPT_SOURCE_ID};
