use serde::{Deserialize, Serialize};

/// A syntax-level failure. Carries no frame chain, only the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} ({file}, line {line}, column {column})")]
pub struct CompileFailure {
    pub message: String,
    /// Source identity of the text being compiled.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
    /// The offending physical line, when it exists.
    pub text: Option<String>,
}
