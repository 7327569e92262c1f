//! ScriptSession — fluent API for scripting editor workflows in tests.
//!
//! Wraps `editor_bridge::dispatch()` to test the real command path, not a
//! simulation. Every event the engine emits is kept in a history for later
//! inspection.

use std::path::PathBuf;

use display_tree::{DisplayEntry, Reconciler};
use editor_bridge::{dispatch, EditorCommand, EngineConfig, EngineEvent, ScriptEngine};
use script_runtime::DebugMode;
use shape_kernel::{shared, MockKernel, SharedKernel};

use crate::fakes::{RecordingViewer, ScriptEditor};
use crate::helpers::{describe_events, last_pause, HarnessError};

/// A scripted editor session over a [`ScriptEngine`] with a mock kernel.
pub struct ScriptSession {
    engine: ScriptEngine<RecordingViewer, ScriptEditor>,
    kernel: SharedKernel,
    /// Events of every command so far.
    history: Vec<EngineEvent>,
    /// Events of the most recent command.
    last: Vec<EngineEvent>,
}

impl ScriptSession {
    /// Session with default configuration and an empty script.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let kernel = shared(MockKernel::new());
        let engine = ScriptEngine::new(
            config,
            kernel.clone(),
            RecordingViewer::new(),
            ScriptEditor::default(),
        );
        Self {
            engine,
            kernel,
            history: Vec::new(),
            last: Vec::new(),
        }
    }

    /// Session that keeps visual properties across re-runs.
    pub fn preserving() -> Self {
        let mut config = EngineConfig::default();
        config.display.preserve_properties = true;
        Self::with_config(config)
    }

    // ── Editor ──────────────────────────────────────────────────────────

    pub fn source(&mut self, text: &str) -> &mut Self {
        self.engine.editor_mut().source = text.to_string();
        self
    }

    pub fn saved_at(&mut self, path: PathBuf) -> &mut Self {
        self.engine.editor_mut().path = Some(path);
        self
    }

    pub fn breakpoint(&mut self, line: u32) -> &mut Self {
        self.engine.editor_mut().breakpoints.insert(line);
        self
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Dispatch `command`; an `Error` event becomes a [`HarnessError`].
    pub fn send(&mut self, command: EditorCommand) -> Result<&mut Self, HarnessError> {
        let events = dispatch(&mut self.engine, command);
        self.history.extend(events.iter().cloned());
        self.last = events;
        if let Some(EngineEvent::Error { message }) = self
            .last
            .iter()
            .find(|e| matches!(e, EngineEvent::Error { .. }))
        {
            return Err(HarnessError::DispatchError {
                message: message.clone(),
            });
        }
        Ok(self)
    }

    pub fn run(&mut self) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::Run)
    }

    pub fn start_debug(&mut self, mode: DebugMode) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::StartDebug { mode })
    }

    pub fn step_over(&mut self) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::StepOver)
    }

    pub fn step_in(&mut self) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::StepIn)
    }

    pub fn continue_(&mut self) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::Continue)
    }

    pub fn stop_debug(&mut self) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::StopDebug)
    }

    pub fn console(&mut self, source: &str) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::ConsoleEval {
            source: source.to_string(),
        })
    }

    pub fn set_visible(&mut self, name: &str, visible: bool) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::SetVisible {
            name: name.to_string(),
            visible,
        })
    }

    pub fn clear_all(&mut self) -> Result<&mut Self, HarnessError> {
        self.send(EditorCommand::ClearAll)
    }

    // ── Inspection ──────────────────────────────────────────────────────

    pub fn engine(&self) -> &ScriptEngine<RecordingViewer, ScriptEditor> {
        &self.engine
    }

    /// Direct access for edits with no command, like colour changes.
    pub fn engine_mut(&mut self) -> &mut ScriptEngine<RecordingViewer, ScriptEditor> {
        &mut self.engine
    }

    pub fn kernel(&self) -> &SharedKernel {
        &self.kernel
    }

    pub fn reconciler(&self) -> &Reconciler {
        self.engine.reconciler()
    }

    pub fn viewer(&self) -> &RecordingViewer {
        self.engine.viewer()
    }

    /// Forget viewer calls recorded so far.
    pub fn reset_viewer(&mut self) -> &mut Self {
        self.engine.viewer_mut().clear_calls();
        self
    }

    pub fn tree_names(&self) -> Vec<String> {
        self.reconciler().tree().names()
    }

    pub fn entry(&self, name: &str) -> Result<&DisplayEntry, HarnessError> {
        self.reconciler()
            .tree()
            .get(name)
            .ok_or_else(|| HarnessError::EntryNotFound {
                name: name.to_string(),
            })
    }

    pub fn last_events(&self) -> &[EngineEvent] {
        &self.last
    }

    pub fn history(&self) -> &[EngineEvent] {
        &self.history
    }

    /// Line the last command left the session paused at.
    pub fn paused_line(&self) -> Result<u32, HarnessError> {
        last_pause(&self.last).ok_or_else(|| HarnessError::NotPaused {
            events: describe_events(&self.last),
        })
    }
}

impl Default for ScriptSession {
    fn default() -> Self {
        Self::new()
    }
}
