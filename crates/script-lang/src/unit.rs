use std::sync::Arc;

use tracing::debug;

use crate::ast::Block;
use crate::error::CompileFailure;
use crate::parser::parse;

/// Source identity bound to user-script text. Never a real filesystem path,
/// so frames running script code can be told apart from imported modules.
pub const SCRIPT_SOURCE_ID: &str = "<script>";

/// Parsed, immutable executable form of one source text.
///
/// Cheap to clone; the body and source are shared.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    origin: Arc<str>,
    source: Arc<str>,
    body: Arc<Block>,
}

impl CompiledUnit {
    /// The source identity frames of this unit report.
    pub fn origin(&self) -> &Arc<str> {
        &self.origin
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn body(&self) -> &Arc<Block> {
        &self.body
    }

    /// True for units compiled from user-script text.
    pub fn is_script(&self) -> bool {
        &*self.origin == SCRIPT_SOURCE_ID
    }

    /// Text of a 1-based source line, without its line terminator.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        line_of(&self.source, line)
    }
}

/// Text of a 1-based line of `source`.
pub fn line_of(source: &str, line: u32) -> Option<&str> {
    let index = (line as usize).checked_sub(1)?;
    source.lines().nth(index)
}

/// Compile user-script text under [`SCRIPT_SOURCE_ID`].
pub fn compile(source: &str) -> Result<CompiledUnit, CompileFailure> {
    compile_module(source, SCRIPT_SOURCE_ID)
}

/// Compile text loaded from `origin` (a module path, or the script identity).
pub fn compile_module(source: &str, origin: &str) -> Result<CompiledUnit, CompileFailure> {
    let body = parse(source, origin)?;
    debug!(origin, statements = body.len(), "compiled unit");
    Ok(CompiledUnit {
        origin: Arc::from(origin),
        source: Arc::from(source),
        body: Arc::new(body),
    })
}
