use cad_types::Rgba;
use display_tree::Viewer;

use crate::editor::Editor;
use crate::engine::{BridgeError, ScriptEngine};
use crate::messages::{EditorCommand, EngineEvent};

/// Apply one editor command and return the events it produced.
///
/// Errors are reported as a trailing [`EngineEvent::Error`] after whatever
/// the command managed to emit before failing.
pub fn dispatch<V: Viewer, E: Editor>(
    engine: &mut ScriptEngine<V, E>,
    command: EditorCommand,
) -> Vec<EngineEvent> {
    let result = handle_command(engine, command);
    let mut events = engine.take_events();
    if let Err(e) = result {
        events.push(EngineEvent::Error {
            message: e.to_string(),
        });
    }
    events
}

/// [`dispatch`] over JSON text: one command in, an array of events out.
pub fn dispatch_json<V: Viewer, E: Editor>(
    engine: &mut ScriptEngine<V, E>,
    json: &str,
) -> Result<String, BridgeError> {
    let command: EditorCommand =
        serde_json::from_str(json).map_err(|e| BridgeError::Serialization {
            reason: e.to_string(),
        })?;
    let events = dispatch(engine, command);
    serde_json::to_string(&events).map_err(|e| BridgeError::Serialization {
        reason: e.to_string(),
    })
}

fn handle_command<V: Viewer, E: Editor>(
    engine: &mut ScriptEngine<V, E>,
    command: EditorCommand,
) -> Result<(), BridgeError> {
    match command {
        EditorCommand::Run => engine.run().map(|_| ()),
        EditorCommand::StartDebug { mode } => engine.start_debug_with(mode),
        EditorCommand::StepOver => engine.step_over(),
        EditorCommand::StepIn => engine.step_in(),
        EditorCommand::Continue => engine.continue_(),
        EditorCommand::StopDebug => engine.stop_debug().map(|_| ()),
        EditorCommand::ConsoleEval { source } => engine.console_eval(&source).map(|_| ()),
        EditorCommand::SetVisible { name, visible } => engine.set_visible(&name, visible),
        EditorCommand::SetColor { name, color } => {
            let color = Rgba::parse(&color)?;
            engine.set_color(&name, color)
        }
        EditorCommand::SetAlpha { name, alpha } => engine.set_alpha(&name, alpha),
        EditorCommand::Rename { name, new_name } => engine.rename(&name, &new_name),
        EditorCommand::Remove { names } => engine.remove(&names),
        EditorCommand::ClearAll => engine.clear_all(),
    }
}
