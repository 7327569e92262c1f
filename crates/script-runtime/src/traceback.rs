//! Failure → displayable trace.

use cad_types::{FailureSummary, StructuredTrace, TraceLine};
use script_lang::{line_of, CompileFailure, SCRIPT_SOURCE_ID};

use crate::error::{RunFailure, ScriptError};

/// Build the user-facing trace for `failure`, resolving missing line text
/// from `source`.
pub fn report(failure: &RunFailure, source: &str) -> StructuredTrace {
    match failure {
        RunFailure::Compile(f) => syntax_trace(f, source),
        RunFailure::Runtime(e) => runtime_trace(e, source),
    }
}

fn code_at(source: &str, line: u32) -> String {
    line_of(source, line)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

fn syntax_trace(failure: &CompileFailure, source: &str) -> StructuredTrace {
    let code = match &failure.text {
        Some(text) => text.trim().to_string(),
        None if failure.file == SCRIPT_SOURCE_ID => code_at(source, failure.line),
        None => String::new(),
    };
    StructuredTrace {
        summary: FailureSummary {
            kind: "SyntaxError".to_string(),
            message: failure.message.clone(),
        },
        frames: vec![TraceLine {
            file: failure.file.clone(),
            line: failure.line,
            code,
        }],
        syntax: true,
    }
}

fn runtime_trace(error: &ScriptError, source: &str) -> StructuredTrace {
    // Frames of imported modules and the engine are hidden.
    let frames = error
        .frames
        .iter()
        .filter(|frame| frame.file == SCRIPT_SOURCE_ID)
        .map(|frame| TraceLine {
            file: frame.file.clone(),
            line: frame.line,
            code: frame
                .code
                .clone()
                .unwrap_or_else(|| code_at(source, frame.line)),
        })
        .collect();
    StructuredTrace {
        summary: FailureSummary {
            kind: error.kind.name().to_string(),
            message: error.message.clone(),
        },
        frames,
        syntax: false,
    }
}
