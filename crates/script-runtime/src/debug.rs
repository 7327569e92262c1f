//! Debug sessions.
//!
//! The script runs on a dedicated worker thread with a [`Stepper`] installed
//! as tracer. At a pause the worker sends a [`DebugEvent::Paused`] snapshot
//! and blocks on the command channel; the controller stays free to do other
//! work and resumes it with a [`DebugCommand`]. Cancelling injects
//! [`Interrupt::Cancelled`] at the paused statement so the script stack
//! unwinds normally, running its `finally` blocks.

use std::collections::BTreeSet;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cad_types::{PublicationEntry, VariableView};
use script_lang::CompiledUnit;
use shape_kernel::SharedKernel;

use crate::error::{EngineError, Interrupt};
use crate::interp::{Interpreter, LogSink, TraceEvent, Tracer};
use crate::modules::SharedModules;
use crate::publish::discover;
use crate::runner::{execute, RunOptions, RunReport};

/// Stack size of the debug worker; the interpreter recurses per script call.
const WORKER_STACK: usize = 32 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugMode {
    /// Pause at the next statement of the current frame.
    #[default]
    Step,
    /// Like `Step`, but a call into script code pauses inside it.
    StepIn,
    /// Pause only at breakpoints.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Step,
    StepIn,
    Continue,
    Cancel,
}

/// What the controller sees at a pause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseSnapshot {
    pub line: u32,
    pub function: String,
    /// Script call depth, 1 at module level.
    pub depth: usize,
    pub variables: Vec<VariableView>,
    /// Publishable shapes bound in the paused frame.
    pub ephemeral: Vec<PublicationEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugEvent {
    Paused(PauseSnapshot),
    /// Bindings of a script frame that is about to return.
    Locals {
        function: String,
        variables: Vec<VariableView>,
    },
    Log(String),
    Ended(RunReport),
    /// The run could not be set up; nothing was executed.
    Aborted(String),
}

/// The debugger state machine, driven by trace events on the worker.
struct Stepper {
    mode: DebugMode,
    breakpoints: BTreeSet<u32>,
    /// Ids of the frames stepping is scoped to, innermost last.
    stack: Vec<u64>,
    commands: Receiver<DebugCommand>,
    events: Sender<DebugEvent>,
    cancelled: bool,
}

impl Stepper {
    fn pause(&mut self, interp: &Interpreter, line: u32) -> Result<(), Interrupt> {
        let Some(frame) = interp.current_frame() else {
            return Ok(());
        };
        let ephemeral = {
            let bindings = frame.bindings().borrow();
            discover(bindings.iter(), interp.publishable_kinds())
        };
        let snapshot = PauseSnapshot {
            line,
            function: frame.function.clone(),
            depth: self.stack.len(),
            variables: interp.frame_variables(),
            ephemeral,
        };
        debug!(line, function = %snapshot.function, "paused");
        if self.events.send(DebugEvent::Paused(snapshot)).is_err() {
            return self.cancel();
        }

        // A dropped controller counts as a cancel.
        match self.commands.recv() {
            Ok(DebugCommand::Step) => self.mode = DebugMode::Step,
            Ok(DebugCommand::StepIn) => self.mode = DebugMode::StepIn,
            Ok(DebugCommand::Continue) => self.mode = DebugMode::Continue,
            Ok(DebugCommand::Cancel) | Err(_) => return self.cancel(),
        }
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), Interrupt> {
        info!("debug session cancelled");
        self.cancelled = true;
        Err(Interrupt::Cancelled)
    }
}

impl Tracer for Stepper {
    fn trace(&mut self, interp: &Interpreter, event: TraceEvent) -> Result<(), Interrupt> {
        if self.cancelled {
            return Ok(());
        }
        let Some(frame) = interp.current_frame() else {
            return Ok(());
        };
        let on_top = self.stack.last() == Some(&frame.id);

        match event {
            TraceEvent::Call => {
                if self.stack.is_empty() {
                    self.stack.push(frame.id);
                } else if self.mode == DebugMode::StepIn {
                    self.stack.push(frame.id);
                    self.mode = DebugMode::Step;
                }
                Ok(())
            }
            TraceEvent::Line(line) => {
                if self.breakpoints.contains(&line) {
                    if !on_top {
                        self.stack.push(frame.id);
                    }
                    return self.pause(interp, line);
                }
                if on_top && self.mode != DebugMode::Continue {
                    return self.pause(interp, line);
                }
                Ok(())
            }
            TraceEvent::Return => {
                // Only a stepped frame returning into a stepped caller is
                // followed by a pause that will show the snapshot.
                if on_top && self.stack.len() > 1 && self.mode != DebugMode::Continue {
                    let _ = self.events.send(DebugEvent::Locals {
                        function: frame.function.clone(),
                        variables: interp.frame_variables(),
                    });
                }
                if on_top {
                    self.stack.pop();
                }
                if self.stack.is_empty() {
                    debug!("script frame stack empty");
                }
                Ok(())
            }
        }
    }
}

/// Controller-side handle to a running debug worker.
pub struct DebugSession {
    id: Uuid,
    commands: Option<Sender<DebugCommand>>,
    events: Receiver<DebugEvent>,
    worker: Option<JoinHandle<()>>,
    paused: bool,
    ended: bool,
}

impl DebugSession {
    /// Spawn the worker and start executing `unit` in `mode`.
    pub fn start(
        unit: CompiledUnit,
        options: RunOptions,
        breakpoints: BTreeSet<u32>,
        mode: DebugMode,
        kernel: SharedKernel,
        modules: SharedModules,
    ) -> Result<Self, EngineError> {
        let id = Uuid::new_v4();
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let stepper = Stepper {
            mode,
            breakpoints,
            stack: Vec::new(),
            commands: command_rx,
            events: event_tx.clone(),
            cancelled: false,
        };
        info!(session = %id, ?mode, breakpoints = ?stepper.breakpoints, "starting debug session");

        let worker = thread::Builder::new()
            .name(format!("script-debug-{id}"))
            .stack_size(WORKER_STACK)
            .spawn(move || run_worker(unit, options, kernel, modules, stepper, event_tx))
            .map_err(EngineError::Spawn)?;

        Ok(Self {
            id,
            commands: Some(command_tx),
            events: event_rx,
            worker: Some(worker),
            paused: false,
            ended: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Block for the next event from the worker.
    pub fn next_event(&mut self) -> Result<DebugEvent, EngineError> {
        if self.ended {
            return Err(EngineError::NoSession);
        }
        match self.events.recv() {
            Ok(event) => Ok(self.observe(event)),
            Err(_) => self.worker_gone(),
        }
    }

    /// The next event if one is ready.
    pub fn try_next_event(&mut self) -> Result<Option<DebugEvent>, EngineError> {
        if self.ended {
            return Ok(None);
        }
        match self.events.try_recv() {
            Ok(event) => Ok(Some(self.observe(event))),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => self.worker_gone(),
        }
    }

    /// Resume a paused worker.
    pub fn send(&mut self, command: DebugCommand) -> Result<(), EngineError> {
        if !self.paused {
            return Err(EngineError::NotPaused);
        }
        let sender = self.commands.as_ref().ok_or(EngineError::WorkerGone)?;
        sender.send(command).map_err(|_| EngineError::WorkerGone)?;
        debug!(session = %self.id, ?command, "command sent");
        self.paused = false;
        Ok(())
    }

    /// Cancel if paused. Returns whether a cancel was delivered; before the
    /// first pause this does nothing.
    pub fn cancel(&mut self) -> Result<bool, EngineError> {
        if !self.paused {
            debug!(session = %self.id, "cancel ignored, session not paused");
            return Ok(false);
        }
        self.send(DebugCommand::Cancel)?;
        Ok(true)
    }

    fn observe(&mut self, event: DebugEvent) -> DebugEvent {
        match &event {
            DebugEvent::Paused(_) => self.paused = true,
            DebugEvent::Ended(_) | DebugEvent::Aborted(_) => {
                self.paused = false;
                self.ended = true;
                self.commands = None;
                if let Some(worker) = self.worker.take() {
                    if worker.join().is_err() {
                        warn!(session = %self.id, "debug worker panicked after finishing");
                    }
                }
            }
            DebugEvent::Locals { .. } | DebugEvent::Log(_) => {}
        }
        event
    }

    fn worker_gone<T>(&mut self) -> Result<T, EngineError> {
        self.ended = true;
        self.paused = false;
        self.commands = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        warn!(session = %self.id, "debug worker exited without reporting");
        Err(EngineError::WorkerGone)
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        // Disconnecting makes a paused worker unwind as cancelled.
        self.commands = None;
        if self.worker.is_some() {
            debug!(session = %self.id, "debug session dropped while running");
        }
    }
}

fn run_worker(
    unit: CompiledUnit,
    options: RunOptions,
    kernel: SharedKernel,
    modules: SharedModules,
    stepper: Stepper,
    events: Sender<DebugEvent>,
) {
    let log_events = events.clone();
    let log: LogSink = Box::new(move |line| {
        let _ = log_events.send(DebugEvent::Log(line.to_string()));
    });
    let event = match execute(&unit, &options, kernel, modules, log, Some(Box::new(stepper))) {
        Ok(execution) => DebugEvent::Ended(execution.report),
        Err(e) => DebugEvent::Aborted(e.to_string()),
    };
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleRegistry;
    use crate::runner::RunStatus;
    use script_lang::compile;
    use shape_kernel::{shared, MockKernel};

    fn start(source: &str, breakpoints: &[u32], mode: DebugMode) -> DebugSession {
        DebugSession::start(
            compile(source).unwrap(),
            RunOptions::default(),
            breakpoints.iter().copied().collect(),
            mode,
            shared(MockKernel::new()),
            ModuleRegistry::default().shared(),
        )
        .unwrap()
    }

    /// Next pause or end, skipping locals and log events.
    fn next_stop(session: &mut DebugSession) -> DebugEvent {
        loop {
            match session.next_event().unwrap() {
                DebugEvent::Locals { .. } | DebugEvent::Log(_) => continue,
                other => return other,
            }
        }
    }

    fn paused_line(event: &DebugEvent) -> u32 {
        match event {
            DebugEvent::Paused(p) => p.line,
            other => panic!("expected a pause, got {other:?}"),
        }
    }

    #[test]
    fn stepping_visits_each_top_level_statement() {
        let mut s = start("a = 1\nb = 2\nc = 3\n", &[], DebugMode::Step);
        let mut lines = Vec::new();
        loop {
            match next_stop(&mut s) {
                DebugEvent::Paused(p) => {
                    lines.push(p.line);
                    s.send(DebugCommand::Step).unwrap();
                }
                DebugEvent::Ended(report) => {
                    assert_eq!(report.status, RunStatus::Finished);
                    break;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn step_over_skips_function_bodies_and_step_in_enters_them() {
        let source = "def f(x):\n    y = x + 1\n    return y\nv = f(1)\nw = v\n";

        let mut s = start(source, &[], DebugMode::Step);
        assert_eq!(paused_line(&next_stop(&mut s)), 1);
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 4);
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 5);
        s.send(DebugCommand::Continue).unwrap();
        assert!(matches!(next_stop(&mut s), DebugEvent::Ended(_)));

        let mut s = start(source, &[], DebugMode::Step);
        assert_eq!(paused_line(&next_stop(&mut s)), 1);
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 4);
        s.send(DebugCommand::StepIn).unwrap();
        match next_stop(&mut s) {
            DebugEvent::Paused(p) => {
                assert_eq!(p.line, 2);
                assert_eq!(p.function, "f");
                assert_eq!(p.depth, 2);
                assert_eq!(p.variables[0].name, "x");
            }
            other => panic!("unexpected {other:?}"),
        }
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 3);
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 5);
        s.send(DebugCommand::Continue).unwrap();
        assert!(matches!(next_stop(&mut s), DebugEvent::Ended(_)));
    }

    #[test]
    fn breakpoints_pause_in_continue_mode_and_inside_functions() {
        let source = "def f():\n    q = 2\n    return q\na = 1\nb = f()\nc = 3\n";
        let mut s = start(source, &[2, 6], DebugMode::Continue);

        let first = next_stop(&mut s);
        assert_eq!(paused_line(&first), 2);
        // Stepping from a breakpoint stays scoped to that frame.
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 3);
        s.send(DebugCommand::Continue).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 6);
        s.send(DebugCommand::Continue).unwrap();
        assert!(matches!(next_stop(&mut s), DebugEvent::Ended(_)));
    }

    #[test]
    fn locals_are_sent_only_for_stepped_returns() {
        let source = "def f(x):\n    return x\ntotal = 0\nfor i in range(50):\n    total = total + f(i)\n";
        let locals = |s: &mut DebugSession| {
            let mut count = 0;
            loop {
                match s.next_event().unwrap() {
                    DebugEvent::Locals { .. } => count += 1,
                    DebugEvent::Log(_) => {}
                    DebugEvent::Paused(_) => {
                        s.send(DebugCommand::Continue).unwrap();
                    }
                    DebugEvent::Ended(report) => {
                        assert_eq!(report.status, RunStatus::Finished);
                        return count;
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
        };

        let mut s = start(source, &[], DebugMode::Continue);
        assert_eq!(locals(&mut s), 0);

        let mut s = start(source, &[], DebugMode::Step);
        assert_eq!(locals(&mut s), 0);

        let mut s = start("def f(x):\n    return x\nv = f(1)\nw = v\n", &[], DebugMode::Step);
        assert_eq!(paused_line(&next_stop(&mut s)), 1);
        s.send(DebugCommand::Step).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 3);
        s.send(DebugCommand::StepIn).unwrap();
        assert_eq!(paused_line(&next_stop(&mut s)), 2);
        s.send(DebugCommand::Step).unwrap();
        match s.next_event().unwrap() {
            DebugEvent::Locals { function, variables } => {
                assert_eq!(function, "f");
                assert_eq!(variables[0].name, "x");
            }
            other => panic!("expected the returning frame's locals, got {other:?}"),
        }
        assert_eq!(paused_line(&next_stop(&mut s)), 4);
        s.send(DebugCommand::Continue).unwrap();
        assert!(matches!(next_stop(&mut s), DebugEvent::Ended(_)));
    }

    #[test]
    fn cancel_unwinds_through_finally_and_is_not_a_failure() {
        let source = "try:\n    a = 1\n    b = 2\nfinally:\n    log('cleanup')\n";
        let mut s = start(source, &[3], DebugMode::Continue);
        assert_eq!(paused_line(&next_stop(&mut s)), 3);
        assert!(s.cancel().unwrap());

        let mut logged = Vec::new();
        let report = loop {
            match s.next_event().unwrap() {
                DebugEvent::Log(line) => logged.push(line),
                DebugEvent::Ended(report) => break report,
                DebugEvent::Locals { .. } => {}
                other => panic!("unexpected {other:?}"),
            }
        };
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(logged, vec!["cleanup".to_string()]);
        assert!(s.is_ended());
    }

    #[test]
    fn cancel_before_first_pause_is_a_no_op() {
        let mut s = start("a = 1\n", &[], DebugMode::Continue);
        assert!(!s.cancel().unwrap());
        match next_stop(&mut s) {
            DebugEvent::Ended(report) => assert_eq!(report.status, RunStatus::Finished),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(s.send(DebugCommand::Step), Err(EngineError::NotPaused)));
    }

    #[test]
    fn pauses_carry_ephemeral_shapes_of_the_frame() {
        let mut s = start("part = box(1, 1, 1)\nn = 1\n", &[], DebugMode::Step);
        match next_stop(&mut s) {
            DebugEvent::Paused(p) => assert!(p.ephemeral.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        s.send(DebugCommand::Step).unwrap();
        match next_stop(&mut s) {
            DebugEvent::Paused(p) => {
                assert_eq!(p.ephemeral.len(), 1);
                assert_eq!(p.ephemeral[0].name, "part");
            }
            other => panic!("unexpected {other:?}"),
        }
        s.send(DebugCommand::Continue).unwrap();
        assert!(matches!(next_stop(&mut s), DebugEvent::Ended(_)));
    }

    #[test]
    fn dropping_a_paused_session_cancels_the_worker() {
        let mut s = start("a = 1\nb = 2\n", &[], DebugMode::Step);
        assert_eq!(paused_line(&next_stop(&mut s)), 1);
        drop(s);
    }
}
