//! Event filters, script builders and the harness error type.

use cad_types::StructuredTrace;
use editor_bridge::EngineEvent;

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("dispatch error: {message}")]
    DispatchError { message: String },

    #[error("display entry not found: {name}")]
    EntryNotFound { name: String },

    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("expected a pause, got: {events}")]
    NotPaused { events: String },
}

/// Join lines into a script with a trailing newline.
pub fn script(lines: &[&str]) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

/// Line of the last pause in `events`.
pub fn last_pause(events: &[EngineEvent]) -> Option<u32> {
    events.iter().rev().find_map(|e| match e {
        EngineEvent::PausedAtLine { line, .. } => Some(*line),
        _ => None,
    })
}

pub fn pause_count(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::PausedAtLine { .. }))
        .count()
}

/// Status carried by the first `debug-session-ended` in `events`.
pub fn session_end(events: &[EngineEvent]) -> Option<&str> {
    events.iter().find_map(|e| match e {
        EngineEvent::DebugSessionEnded { status } => Some(status.as_str()),
        _ => None,
    })
}

pub fn last_failure(events: &[EngineEvent]) -> Option<&StructuredTrace> {
    events.iter().rev().find_map(|e| match e {
        EngineEvent::Failed { trace } => Some(trace),
        _ => None,
    })
}

pub fn log_lines(events: &[EngineEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::ScriptLog { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

/// One-line rendering of events for diagnostics.
pub fn describe_events(events: &[EngineEvent]) -> String {
    let tags: Vec<String> = events
        .iter()
        .map(|e| match serde_json::to_value(e) {
            Ok(value) => value["type"].as_str().unwrap_or("?").to_string(),
            Err(_) => "?".to_string(),
        })
        .collect();
    format!("[{}]", tags.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_lines() {
        assert_eq!(script(&["a = 1", "b = 2"]), "a = 1\nb = 2\n");
    }

    #[test]
    fn event_filters() {
        let events = vec![
            EngineEvent::ScriptLog {
                text: "hi".to_string(),
            },
            EngineEvent::PausedAtLine {
                line: 2,
                function: "<module>".to_string(),
                depth: 1,
                variables: Vec::new(),
                ephemeral: Vec::new(),
            },
            EngineEvent::DebugSessionEnded {
                status: "finished".to_string(),
            },
        ];
        assert_eq!(last_pause(&events), Some(2));
        assert_eq!(pause_count(&events), 1);
        assert_eq!(session_end(&events), Some("finished"));
        assert_eq!(log_lines(&events), vec!["hi"]);
        assert!(last_failure(&events).is_none());
        assert_eq!(
            describe_events(&events),
            "[script-log, paused-at-line, debug-session-ended]"
        );
    }
}
