use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info, instrument, warn};

use cad_types::{ColorError, PublicationEntry, Rgba};
use display_tree::{DisplayDelta, ReconcileError, Reconciler, Viewer};
use script_lang::compile;
use script_runtime::{
    execute_source, report, Console, DebugCommand, DebugEvent, DebugMode, DebugSession,
    EngineError, IsolationError, ModuleRegistry, RunFailure, RunReport, RunStatus, SharedModules,
};
use shape_kernel::SharedKernel;

use crate::config::{ConfigError, EngineConfig};
use crate::editor::Editor;
use crate::messages::EngineEvent;

/// Errors from the bridge layer.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error(transparent)]
    Display(#[from] ReconcileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Color(#[from] ColorError),

    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

/// A debug session plus the source it was started from.
struct ActiveDebug {
    session: DebugSession,
    source: String,
}

/// Whether event handling should keep waiting on the worker.
enum Flow {
    Wait,
    Stop,
}

/// Controller that ties the editor, the script runtime, the display tree and
/// the viewer together.
///
/// Every notification is queued on an outbox; hosts drain it with
/// [`ScriptEngine::take_events`] after each call.
pub struct ScriptEngine<V: Viewer, E: Editor> {
    config: EngineConfig,
    kernel: SharedKernel,
    modules: SharedModules,
    viewer: V,
    editor: E,
    reconciler: Reconciler,
    console: Console,
    debug: Option<ActiveDebug>,
    outbox: Vec<EngineEvent>,
}

impl<V: Viewer, E: Editor> ScriptEngine<V, E> {
    pub fn new(config: EngineConfig, kernel: SharedKernel, viewer: V, editor: E) -> Self {
        let modules = ModuleRegistry::new(config.run.extra_module_paths.clone()).shared();
        let console = Console::new(
            kernel.clone(),
            modules.clone(),
            config.display.publishable_kinds.clone(),
        );
        let reconciler = Reconciler::new(config.reconcile_options());
        Self {
            config,
            kernel,
            modules,
            viewer,
            editor,
            reconciler,
            console,
            debug: None,
            outbox: Vec::new(),
        }
    }

    /// Build an engine from the TOML config at `path`.
    pub fn from_config_file(
        path: &std::path::Path,
        kernel: SharedKernel,
        viewer: V,
        editor: E,
    ) -> Result<Self, BridgeError> {
        let config = EngineConfig::load(path)?;
        Ok(Self::new(config, kernel, viewer, editor))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn viewer_mut(&mut self) -> &mut V {
        &mut self.viewer
    }

    pub fn editor(&self) -> &E {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut E {
        &mut self.editor
    }

    pub fn modules(&self) -> &SharedModules {
        &self.modules
    }

    pub fn is_debugging(&self) -> bool {
        self.debug.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.debug
            .as_ref()
            .map(|d| d.session.is_paused())
            .unwrap_or(false)
    }

    /// Drain queued notifications, oldest first.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&mut self, event: EngineEvent) {
        self.outbox.push(event);
    }

    fn ensure_idle(&self) -> Result<(), BridgeError> {
        if self.debug.is_some() {
            return Err(EngineError::SessionActive.into());
        }
        Ok(())
    }

    // ── Run ─────────────────────────────────────────────────────────────

    /// Execute the editor's script straight through and show its results.
    #[instrument(skip_all)]
    pub fn run(&mut self) -> Result<RunStatus, BridgeError> {
        self.ensure_idle()?;
        let source = self.editor.current_source_text();
        let options = self.config.run_options(self.editor.current_source_path());

        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink = lines.clone();
        let execution = execute_source(
            &source,
            &options,
            self.kernel.clone(),
            self.modules.clone(),
            Box::new(move |line: &str| sink.borrow_mut().push(line.to_string())),
        )?;
        let logged = std::mem::take(&mut *lines.borrow_mut());
        for text in logged {
            self.emit(EngineEvent::ScriptLog { text });
        }

        let status = execution.report.status.clone();
        if status == RunStatus::Finished {
            self.console.seed(&execution.bindings);
        }
        self.conclude(execution.report, &source, false)?;
        info!(status = status.label(), "run finished");
        Ok(status)
    }

    /// Show a finished run's results, or its failure. A debug run that
    /// published nothing leaves the restored tree alone.
    fn conclude(
        &mut self,
        report: RunReport,
        source: &str,
        after_debug: bool,
    ) -> Result<(), BridgeError> {
        let RunReport {
            status,
            publications,
            variables,
            ..
        } = report;
        match status {
            RunStatus::Finished => {
                if !(after_debug && publications.is_empty()) {
                    let delta = self.reconcile(&publications)?;
                    self.emit(EngineEvent::ObjectsPublished { delta });
                }
                self.emit(EngineEvent::Variables { variables });
                self.emit(EngineEvent::TraceCleared);
            }
            RunStatus::Failed(failure) => {
                if self.config.run.partial_results_on_failure && !publications.is_empty() {
                    let delta = self.reconcile(&publications)?;
                    self.emit(EngineEvent::ObjectsPublished { delta });
                }
                if !variables.is_empty() {
                    self.emit(EngineEvent::Variables { variables });
                }
                self.fail(&failure, source);
            }
            RunStatus::Cancelled => {}
        }
        Ok(())
    }

    fn reconcile(&mut self, publications: &[PublicationEntry]) -> Result<DisplayDelta, BridgeError> {
        let kernel = self.kernel.lock();
        Ok(self
            .reconciler
            .apply(publications, &*kernel, &mut self.viewer)?)
    }

    fn fail(&mut self, failure: &RunFailure, source: &str) {
        let trace = report(failure, source);
        warn!(kind = %trace.summary.kind, line = ?trace.failing_line(), "script failed");
        self.emit(EngineEvent::Failed { trace });
    }

    // ── Debug ───────────────────────────────────────────────────────────

    pub fn start_debug(&mut self) -> Result<(), BridgeError> {
        self.start_debug_with(DebugMode::Step)
    }

    /// Stash the model tree and run the script under the debugger, returning
    /// at the first pause or when the run ends.
    #[instrument(skip(self))]
    pub fn start_debug_with(&mut self, mode: DebugMode) -> Result<(), BridgeError> {
        self.ensure_idle()?;
        let source = self.editor.current_source_text();
        let unit = match compile(&source) {
            Ok(unit) => unit,
            Err(failure) => {
                self.fail(&RunFailure::Compile(failure), &source);
                self.emit(EngineEvent::DebugSessionEnded {
                    status: "failed".to_string(),
                });
                return Ok(());
            }
        };
        let options = self.config.run_options(self.editor.current_source_path());
        let breakpoints = self.editor.breakpoint_lines();

        let delta = self.reconciler.stash(&mut self.viewer)?;
        if !delta.is_empty() {
            self.emit(EngineEvent::ObjectsPublished { delta });
        }
        let session = match DebugSession::start(
            unit,
            options,
            breakpoints,
            mode,
            self.kernel.clone(),
            self.modules.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                self.restore_tree()?;
                return Err(e.into());
            }
        };
        self.debug = Some(ActiveDebug { session, source });
        self.pump()
    }

    pub fn step_over(&mut self) -> Result<(), BridgeError> {
        self.resume(DebugCommand::Step)
    }

    pub fn step_in(&mut self) -> Result<(), BridgeError> {
        self.resume(DebugCommand::StepIn)
    }

    pub fn continue_(&mut self) -> Result<(), BridgeError> {
        self.resume(DebugCommand::Continue)
    }

    /// Cancel a paused session and wait for it to unwind. Returns whether
    /// there was anything to cancel.
    pub fn stop_debug(&mut self) -> Result<bool, BridgeError> {
        let Some(active) = self.debug.as_mut() else {
            return Ok(false);
        };
        if !active.session.cancel()? {
            return Ok(false);
        }
        self.pump()?;
        Ok(true)
    }

    fn resume(&mut self, command: DebugCommand) -> Result<(), BridgeError> {
        let active = self.debug.as_mut().ok_or(EngineError::NoSession)?;
        active.session.send(command)?;
        self.pump()
    }

    /// Handle worker events until the next pause or the end of the session.
    fn pump(&mut self) -> Result<(), BridgeError> {
        loop {
            let Some(active) = self.debug.as_mut() else {
                return Ok(());
            };
            let event = match active.session.next_event() {
                Ok(event) => event,
                Err(e) => {
                    self.abandon("aborted")?;
                    return Err(e.into());
                }
            };
            if let Flow::Stop = self.handle(event)? {
                return Ok(());
            }
        }
    }

    /// Handle whatever worker events are ready, without blocking. Returns
    /// how many were handled.
    pub fn poll(&mut self) -> Result<usize, BridgeError> {
        let mut handled = 0;
        loop {
            let Some(active) = self.debug.as_mut() else {
                return Ok(handled);
            };
            let event = match active.session.try_next_event() {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(handled),
                Err(e) => {
                    self.abandon("aborted")?;
                    return Err(e.into());
                }
            };
            handled += 1;
            if let Flow::Stop = self.handle(event)? {
                return Ok(handled);
            }
        }
    }

    fn handle(&mut self, event: DebugEvent) -> Result<Flow, BridgeError> {
        match event {
            DebugEvent::Paused(snapshot) => {
                let delta = {
                    let kernel = self.kernel.lock();
                    self.reconciler
                        .show_ephemeral(&snapshot.ephemeral, &*kernel, &mut self.viewer)
                };
                self.emit(EngineEvent::PausedAtLine {
                    line: snapshot.line,
                    function: snapshot.function,
                    depth: snapshot.depth,
                    variables: snapshot.variables,
                    ephemeral: delta.added,
                });
                Ok(Flow::Stop)
            }
            DebugEvent::Locals { function, variables } => {
                debug!(%function, "frame returning");
                self.emit(EngineEvent::Variables { variables });
                Ok(Flow::Wait)
            }
            DebugEvent::Log(text) => {
                self.emit(EngineEvent::ScriptLog { text });
                Ok(Flow::Wait)
            }
            DebugEvent::Ended(report) => {
                let source = self
                    .debug
                    .take()
                    .map(|active| active.source)
                    .unwrap_or_default();
                let status = report.status.label();
                self.restore_tree()?;
                self.conclude(report, &source, true)?;
                info!(status, "debug session ended");
                self.emit(EngineEvent::DebugSessionEnded {
                    status: status.to_string(),
                });
                Ok(Flow::Stop)
            }
            DebugEvent::Aborted(message) => {
                self.emit(EngineEvent::Error { message });
                self.abandon("aborted")?;
                Ok(Flow::Stop)
            }
        }
    }

    /// End the session without results.
    fn abandon(&mut self, status: &str) -> Result<(), BridgeError> {
        self.debug = None;
        self.restore_tree()?;
        self.emit(EngineEvent::DebugSessionEnded {
            status: status.to_string(),
        });
        Ok(())
    }

    /// Drop the ephemeral set and put the stashed tree back.
    fn restore_tree(&mut self) -> Result<(), BridgeError> {
        if !self.reconciler.is_stashed() {
            return Ok(());
        }
        let delta = self.reconciler.unstash(&mut self.viewer)?;
        if !delta.is_empty() {
            self.emit(EngineEvent::ObjectsPublished { delta });
        }
        Ok(())
    }

    // ── Console and tree edits ──────────────────────────────────────────

    /// Evaluate a console snippet; its publications land in the model tree.
    pub fn console_eval(&mut self, source: &str) -> Result<Option<String>, BridgeError> {
        self.ensure_idle()?;
        let outcome = self.console.eval(source);
        for text in outcome.log {
            self.emit(EngineEvent::ScriptLog { text });
        }
        for publication in &outcome.publications {
            let delta = {
                let kernel = self.kernel.lock();
                self.reconciler
                    .add_object(publication, &*kernel, &mut self.viewer)?
            };
            if !delta.is_empty() {
                self.emit(EngineEvent::ObjectsPublished { delta });
            }
        }
        if let Some(failure) = &outcome.failure {
            self.fail(failure, source);
        }
        if let Some(echo) = &outcome.echo {
            self.emit(EngineEvent::ConsoleOutput { echo: echo.clone() });
        }
        Ok(outcome.echo)
    }

    pub fn set_visible(&mut self, name: &str, visible: bool) -> Result<(), BridgeError> {
        self.reconciler.set_visible(name, visible, &mut self.viewer)?;
        self.emit(EngineEvent::VisibilityChanged {
            name: name.to_string(),
            visible,
        });
        Ok(())
    }

    pub fn set_color(&mut self, name: &str, color: Rgba) -> Result<(), BridgeError> {
        Ok(self.reconciler.set_color(name, color, &mut self.viewer)?)
    }

    /// Set transparency, 0 opaque to 1 invisible.
    pub fn set_alpha(&mut self, name: &str, transparency: f64) -> Result<(), BridgeError> {
        Ok(self
            .reconciler
            .set_alpha(name, transparency, &mut self.viewer)?)
    }

    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), BridgeError> {
        let delta = self.reconciler.rename(old, new, &mut self.viewer)?;
        if !delta.is_empty() {
            self.emit(EngineEvent::ObjectsPublished { delta });
        }
        Ok(())
    }

    pub fn remove(&mut self, names: &[String]) -> Result<(), BridgeError> {
        let delta = self.reconciler.remove(names, &mut self.viewer)?;
        self.emit(EngineEvent::ObjectsPublished { delta });
        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<(), BridgeError> {
        self.ensure_idle()?;
        let delta = self.reconciler.clear(&mut self.viewer);
        self.emit(EngineEvent::ObjectsPublished { delta });
        Ok(())
    }
}
