use std::fmt;

use serde::{Deserialize, Serialize};

/// One displayable frame of a failure trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLine {
    pub file: String,
    pub line: u32,
    pub code: String,
}

/// One-line summary of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSummary {
    pub kind: String,
    pub message: String,
}

/// A failure ready for display: script frames outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredTrace {
    pub summary: FailureSummary,
    pub frames: Vec<TraceLine>,
    /// Set for compile-time failures, whose single frame is synthesized.
    pub syntax: bool,
}

impl StructuredTrace {
    /// The line the user should look at: the innermost script frame.
    pub fn failing_line(&self) -> Option<u32> {
        self.frames.last().map(|f| f.line)
    }
}

impl fmt::Display for StructuredTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Traceback (most recent call last):")?;
        for frame in &self.frames {
            writeln!(f, "  File \"{}\", line {}", frame.file, frame.line)?;
            if !frame.code.is_empty() {
                writeln!(f, "    {}", frame.code)?;
            }
        }
        write!(f, "{}: {}", self.summary.kind, self.summary.message)
    }
}
