use serde::{Deserialize, Serialize};

use cad_types::{StructuredTrace, VariableView};
use display_tree::DisplayDelta;
use script_runtime::DebugMode;

/// Commands from the editor UI to the engine.
/// Serialized as JSON with a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EditorCommand {
    Run,
    StartDebug {
        #[serde(default)]
        mode: DebugMode,
    },
    StepOver,
    StepIn,
    Continue,
    StopDebug,
    ConsoleEval {
        source: String,
    },
    SetVisible {
        name: String,
        visible: bool,
    },
    /// `color` is a colour name, `#rrggbb` or `#rrggbbaa`.
    SetColor {
        name: String,
        color: String,
    },
    SetAlpha {
        name: String,
        alpha: f64,
    },
    Rename {
        name: String,
        new_name: String,
    },
    Remove {
        names: Vec<String>,
    },
    ClearAll,
}

/// Notifications from the engine to the editor UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// The persistent model tree changed.
    ObjectsPublished { delta: DisplayDelta },

    /// Bindings for the variables view.
    Variables { variables: Vec<VariableView> },

    /// A run or console snippet failed.
    Failed { trace: StructuredTrace },

    /// The last run succeeded; any shown trace is stale.
    TraceCleared,

    /// A debug session stopped before executing `line`.
    PausedAtLine {
        line: u32,
        function: String,
        depth: usize,
        variables: Vec<VariableView>,
        /// Names of the per-pause shapes now shown.
        ephemeral: Vec<String>,
    },

    ScriptLog { text: String },

    /// `repr` of a console expression.
    ConsoleOutput { echo: String },

    VisibilityChanged { name: String, visible: bool },

    /// `status` is `finished`, `failed`, `cancelled` or `aborted`.
    DebugSessionEnded { status: String },

    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_json() {
        let cmd: EditorCommand = serde_json::from_str(r#"{"type":"StartDebug"}"#).unwrap();
        assert_eq!(
            cmd,
            EditorCommand::StartDebug {
                mode: DebugMode::Step
            }
        );
        let cmd: EditorCommand =
            serde_json::from_str(r#"{"type":"StartDebug","mode":"Continue"}"#).unwrap();
        assert_eq!(
            cmd,
            EditorCommand::StartDebug {
                mode: DebugMode::Continue
            }
        );
        let cmd: EditorCommand =
            serde_json::from_str(r#"{"type":"SetVisible","name":"x","visible":false}"#).unwrap();
        assert!(matches!(cmd, EditorCommand::SetVisible { visible: false, .. }));
    }

    #[test]
    fn events_use_kebab_case_tags() {
        let json = serde_json::to_value(EngineEvent::PausedAtLine {
            line: 3,
            function: "<module>".to_string(),
            depth: 1,
            variables: Vec::new(),
            ephemeral: vec!["a".to_string()],
        })
        .unwrap();
        assert_eq!(json["type"], "paused-at-line");
        assert_eq!(json["line"], 3);

        let json = serde_json::to_value(EngineEvent::DebugSessionEnded {
            status: "finished".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "debug-session-ended");
        assert_eq!(
            serde_json::to_value(EngineEvent::TraceCleared).unwrap()["type"],
            "trace-cleared"
        );
    }
}
