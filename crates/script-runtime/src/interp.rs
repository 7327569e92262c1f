//! Tree-walking interpreter.
//!
//! Frames whose unit carries the script source identity report CALL, LINE
//! and RETURN events to an optional [`Tracer`]; frames of imported modules
//! never do. A tracer stops execution by returning an [`Interrupt`], which
//! unwinds through the script exactly like a raised error (minus `except`).

use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, info};

use cad_types::{PublishableKinds, VariableView};
use script_lang::ast::*;
use script_lang::CompiledUnit;
use shape_kernel::SharedKernel;

use crate::builtins;
use crate::error::{raise, ErrorKind, FrameRecord, Interrupt, ScriptError};
use crate::isolation::INJECTED_NAMES;
use crate::modules::{ModuleError, SharedModules};
use crate::publish::PublicationRegistry;
use crate::value::*;

/// Script call depth at which `RuntimeError` is raised.
pub const MAX_CALL_DEPTH: usize = 64;

/// Longest value rendering shown in the Variables pane.
const VIEW_LIMIT: usize = 200;
/// Longest string (in bytes) or list a `*` repetition may build.
const REPEAT_LIMIT: usize = 10_000_000;

/// Receives script output from `print` and `log`.
pub type LogSink = Box<dyn FnMut(&str)>;

/// One active activation record.
pub struct Frame {
    /// Unique for the lifetime of the interpreter.
    pub id: u64,
    pub unit: CompiledUnit,
    pub function: String,
    /// Line currently executing.
    pub line: u32,
    /// Function locals; `None` for module-level frames.
    pub locals: Option<Scope>,
    pub globals: Scope,
}

impl Frame {
    pub fn is_script(&self) -> bool {
        self.unit.is_script()
    }

    /// The scope assignments in this frame write to.
    pub fn bindings(&self) -> &Scope {
        self.locals.as_ref().unwrap_or(&self.globals)
    }

    fn record(&self) -> FrameRecord {
        FrameRecord {
            file: self.unit.origin().to_string(),
            line: self.line,
            function: self.function.clone(),
            code: self
                .unit
                .line_text(self.line)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A script frame was entered; the frame is already on top.
    Call,
    /// A statement in the top frame is about to execute.
    Line(u32),
    /// The top frame is about to be popped.
    Return,
}

/// Statement-level instrumentation hook.
pub trait Tracer {
    fn trace(&mut self, interp: &Interpreter, event: TraceEvent) -> Result<(), Interrupt>;
}

/// How a statement completed.
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

pub struct Interpreter {
    kernel: SharedKernel,
    modules: SharedModules,
    /// Modules imported during this interpreter's lifetime.
    loaded: HashMap<String, Rc<Module>>,
    importing: Vec<String>,
    frames: Vec<Frame>,
    next_frame_id: u64,
    publications: PublicationRegistry,
    publishable: PublishableKinds,
    tracer: Option<Box<dyn Tracer>>,
    log: LogSink,
}

impl Interpreter {
    pub fn new(kernel: SharedKernel, modules: SharedModules) -> Self {
        Self {
            kernel,
            modules,
            loaded: HashMap::new(),
            importing: Vec::new(),
            frames: Vec::new(),
            next_frame_id: 1,
            publications: PublicationRegistry::default(),
            publishable: PublishableKinds::default(),
            tracer: None,
            log: Box::new(|_| {}),
        }
    }

    pub fn set_log(&mut self, sink: LogSink) {
        self.log = sink;
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer>) {
        self.tracer = Some(tracer);
    }

    pub fn take_tracer(&mut self) -> Option<Box<dyn Tracer>> {
        self.tracer.take()
    }

    pub fn set_publishable_kinds(&mut self, kinds: PublishableKinds) {
        self.publishable = kinds;
    }

    pub fn publishable_kinds(&self) -> &PublishableKinds {
        &self.publishable
    }

    pub fn kernel(&self) -> &SharedKernel {
        &self.kernel
    }

    pub fn publications(&self) -> &PublicationRegistry {
        &self.publications
    }

    pub fn publications_mut(&mut self) -> &mut PublicationRegistry {
        &mut self.publications
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Forward one line of script output.
    pub fn emit_log(&mut self, text: &str) {
        info!(target: "script", "{text}");
        (self.log)(text);
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Execute a whole unit as a module-level frame over `globals`.
    pub fn run_unit(&mut self, unit: &CompiledUnit, globals: Scope) -> Result<(), Interrupt> {
        let body = unit.body().clone();
        self.in_module_frame(unit, globals, |interp| {
            interp.exec_block(&body)?;
            Ok(())
        })
    }

    /// Like [`run_unit`](Self::run_unit), but when the last statement is a
    /// bare expression its value is returned (console echo).
    pub fn run_interactive(
        &mut self,
        unit: &CompiledUnit,
        globals: Scope,
    ) -> Result<Option<Value>, Interrupt> {
        let body = unit.body().clone();
        self.in_module_frame(unit, globals, |interp| match body.split_last() {
            Some((
                Stmt {
                    line,
                    kind: StmtKind::Expr(expr),
                },
                init,
            )) => {
                interp.exec_block(init)?;
                interp.enter_line(*line)?;
                interp.eval(expr).map(Some)
            }
            _ => {
                interp.exec_block(&body)?;
                Ok(None)
            }
        })
    }

    fn in_module_frame<R>(
        &mut self,
        unit: &CompiledUnit,
        globals: Scope,
        body: impl FnOnce(&mut Self) -> Result<R, Interrupt>,
    ) -> Result<R, Interrupt> {
        self.push_frame(unit.clone(), "<module>".to_string(), 1, None, globals);
        let result = self.fire(TraceEvent::Call).and_then(|_| body(self));
        self.leave_frame(result)
    }

    fn push_frame(
        &mut self,
        unit: CompiledUnit,
        function: String,
        line: u32,
        locals: Option<Scope>,
        globals: Scope,
    ) {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.frames.push(Frame {
            id,
            unit,
            function,
            line,
            locals,
            globals,
        });
    }

    /// Record the frame on an unwinding error, report RETURN, pop.
    fn leave_frame<R>(&mut self, result: Result<R, Interrupt>) -> Result<R, Interrupt> {
        let result = result.map_err(|e| self.annotate(e));
        let fired = match result {
            Err(Interrupt::Cancelled) => Ok(()),
            _ => self.fire(TraceEvent::Return),
        };
        self.frames.pop();
        let value = result?;
        fired?;
        Ok(value)
    }

    fn annotate(&self, interrupt: Interrupt) -> Interrupt {
        match (interrupt, self.frames.last()) {
            (Interrupt::Error(mut err), Some(frame)) => {
                err.frames.insert(0, frame.record());
                Interrupt::Error(err)
            }
            (other, _) => other,
        }
    }

    fn fire(&mut self, event: TraceEvent) -> Result<(), Interrupt> {
        if !self.frames.last().map(Frame::is_script).unwrap_or(false) {
            return Ok(());
        }
        match self.tracer.take() {
            Some(mut tracer) => {
                let result = tracer.trace(self, event);
                self.tracer = Some(tracer);
                result
            }
            None => Ok(()),
        }
    }

    fn enter_line(&mut self, line: u32) -> Result<(), Interrupt> {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
        self.fire(TraceEvent::Line(line))
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn exec_block(&mut self, block: &[Stmt]) -> Result<Flow, Interrupt> {
        for stmt in block {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, Interrupt> {
        self.enter_line(stmt.line)?;

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    if branch.line != stmt.line {
                        self.enter_line(branch.line)?;
                    }
                    if self.eval(&branch.cond)?.truthy() {
                        return self.exec_block(&branch.body);
                    }
                }
                if let Some(body) = orelse {
                    return self.exec_block(body);
                }
            }
            StmtKind::While { cond, body } => {
                let mut first = true;
                loop {
                    if !first {
                        self.enter_line(stmt.line)?;
                    }
                    first = false;
                    if !self.eval(cond)?.truthy() {
                        break;
                    }
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For { var, iter, body } => {
                let iterable = self.eval(iter)?;
                let items = self.iterate(iterable)?;
                for (i, item) in items.into_iter().enumerate() {
                    if i > 0 {
                        self.enter_line(stmt.line)?;
                    }
                    self.store(var, item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::Def(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    defaults.push(match &param.default {
                        Some(expr) => Some(self.eval(expr)?),
                        None => None,
                    });
                }
                let (unit, globals) = match self.frames.last() {
                    Some(frame) => (frame.unit.clone(), frame.globals.clone()),
                    None => return raise(ErrorKind::RuntimeError, "no active frame"),
                };
                let closure = Closure {
                    def: def.clone(),
                    unit,
                    globals,
                    defaults,
                };
                self.store(&def.name, Value::Function(Rc::new(closure)));
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(e) => self.eval(e)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import { module, alias } => {
                let m = self.import_module(module)?;
                self.store(alias.as_deref().unwrap_or(module), Value::Module(m));
            }
            StmtKind::FromImport { module, names } => {
                let m = self.import_module(module)?;
                for name in names {
                    let value = m.globals.borrow().get(name).cloned();
                    match value {
                        Some(v) => self.store(name, v),
                        None => {
                            return raise(
                                ErrorKind::ImportError,
                                format!("cannot import name '{name}' from '{module}'"),
                            )
                        }
                    }
                }
            }
            StmtKind::Raise(expr) => {
                return match self.eval(expr)? {
                    Value::Error(e) => raise(e.kind, e.message.clone()),
                    Value::Str(s) => raise(ErrorKind::RuntimeError, s.to_string()),
                    other => raise(
                        ErrorKind::TypeError,
                        format!(
                            "exceptions must be error values or strings, not {}",
                            other.type_name()
                        ),
                    ),
                };
            }
            StmtKind::Try {
                body,
                handlers,
                finally,
            } => return self.exec_try(body, handlers, finally.as_deref()),
            StmtKind::Pass => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        finally: Option<&[Stmt]>,
    ) -> Result<Flow, Interrupt> {
        let outcome = match self.exec_block(body) {
            Err(Interrupt::Error(err)) => self.handle(err, handlers),
            other => other,
        };
        let Some(finally) = finally else {
            return outcome;
        };

        let cancelled = matches!(outcome, Err(Interrupt::Cancelled));
        match self.exec_block(finally) {
            // A cancellation keeps unwinding whatever the finally block does.
            _ if cancelled => outcome,
            Ok(Flow::Normal) => outcome,
            other => other,
        }
    }

    fn handle(&mut self, err: ScriptError, handlers: &[Handler]) -> Result<Flow, Interrupt> {
        for handler in handlers {
            let matched = match &handler.kind {
                None => true,
                Some(kind) => {
                    if kind != "Exception" && ErrorKind::from_name(kind).is_none() {
                        return raise(
                            ErrorKind::NameError,
                            format!("name '{kind}' is not defined"),
                        );
                    }
                    err.kind.caught_by(kind)
                }
            };
            if !matched {
                continue;
            }
            debug!(kind = %err.kind, line = handler.line, "script error caught");
            if let Some(name) = &handler.binding {
                let value = Value::Error(Rc::new(ErrorValue {
                    kind: err.kind,
                    message: err.message.clone(),
                }));
                self.store(name, value);
            }
            return self.exec_block(&handler.body);
        }
        Err(Interrupt::Error(err))
    }

    fn assign(&mut self, target: &Target, value: Value) -> Result<(), Interrupt> {
        match target {
            Target::Name(name) => {
                self.store(name, value);
                Ok(())
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                set_item(&object, index, value)
            }
        }
    }

    fn aug_assign(&mut self, target: &Target, op: BinOp, value: &Expr) -> Result<(), Interrupt> {
        match target {
            Target::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = binary(op, &current, &rhs)?;
                self.store(name, updated);
            }
            Target::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                let current = get_item(&object, &index)?;
                let rhs = self.eval(value)?;
                let updated = binary(op, &current, &rhs)?;
                set_item(&object, index, updated)?;
            }
        }
        Ok(())
    }

    /// Bind `name` in the current frame's scope.
    pub fn store(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last() {
            frame.bindings().borrow_mut().insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, Interrupt> {
        if let Some(frame) = self.frames.last() {
            if let Some(locals) = &frame.locals {
                if let Some(v) = locals.borrow().get(name) {
                    return Ok(v.clone());
                }
            }
            if let Some(v) = frame.globals.borrow().get(name) {
                return Ok(v.clone());
            }
        }
        match builtins::lookup(name) {
            Some(b) => Ok(Value::Builtin(b)),
            None => raise(ErrorKind::NameError, format!("name '{name}' is not defined")),
        }
    }

    fn iterate(&self, value: Value) -> Result<Vec<Value>, Interrupt> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(&c.to_string())).collect()),
            Value::Dict(entries) => Ok(entries.borrow().keys().map(|k| Value::str(k)).collect()),
            other => raise(
                ErrorKind::TypeError,
                format!("'{}' object is not iterable", other.type_name()),
            ),
        }
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, Interrupt> {
        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(x) => Ok(Value::Float(*x)),
            Expr::Str(s) => Ok(Value::str(s)),
            Expr::Name(name) => self.lookup(name),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::list(values))
            }
            Expr::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match self.eval(k)? {
                        Value::Str(s) => s.to_string(),
                        other => {
                            return raise(
                                ErrorKind::TypeError,
                                format!("dict keys must be strings, not {}", other.type_name()),
                            )
                        }
                    };
                    let value = self.eval(v)?;
                    map.insert(key, value);
                }
                Ok(Value::dict(map))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                unary(*op, &v)
            }
            Expr::Binary { op, left, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                binary(*op, &l, &r)
            }
            Expr::BoolOp { op, left, right } => {
                let l = self.eval(left)?;
                match (op, l.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(l),
                    _ => self.eval(right),
                }
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, operand) in rest {
                    let right = self.eval(operand)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func)?;
                let mut call_args = Args::default();
                for a in args {
                    call_args.positional.push(self.eval(a)?);
                }
                for (k, v) in kwargs {
                    let value = self.eval(v)?;
                    call_args.keywords.push((k.clone(), value));
                }
                self.call_value(callee, call_args)
            }
            Expr::Attribute { object, name } => {
                let object = self.eval(object)?;
                get_attr(object, name)
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                get_item(&object, &index)
            }
        }
    }

    pub fn call_value(&mut self, callee: Value, args: Args) -> Result<Value, Interrupt> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Builtin(b) => (b.func)(self, args),
            Value::Method(m) => builtins::call_method(self, &m, args),
            other => raise(
                ErrorKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, args: Args) -> Result<Value, Interrupt> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return raise(ErrorKind::RuntimeError, "maximum recursion depth exceeded");
        }
        let locals = bind_params(&closure, args)?;
        self.push_frame(
            closure.unit.clone(),
            closure.def.name.clone(),
            closure.def.line,
            Some(locals),
            closure.globals.clone(),
        );
        let result = self
            .fire(TraceEvent::Call)
            .and_then(|_| self.exec_block(&closure.def.body))
            .map(|flow| match flow {
                Flow::Return(v) => v,
                _ => Value::None,
            });
        self.leave_frame(result)
    }

    // ── Imports ─────────────────────────────────────────────────────────

    fn import_module(&mut self, name: &str) -> Result<Rc<Module>, Interrupt> {
        if let Some(m) = self.loaded.get(name) {
            return Ok(m.clone());
        }
        if let Some(m) = builtins::builtin_module(name) {
            let m = Rc::new(m);
            self.loaded.insert(name.to_string(), m.clone());
            return Ok(m);
        }
        if self.importing.iter().any(|n| n == name) {
            return raise(
                ErrorKind::ImportError,
                format!("cannot import '{name}' while it is still being imported (circular import)"),
            );
        }

        // Release the registry before running module code, which may import.
        let resolved = self.modules.lock().resolve(name);
        let unit = match resolved {
            Ok(unit) => unit,
            Err(ModuleError::NotFound { .. }) => {
                return raise(ErrorKind::ImportError, format!("No module named '{name}'"))
            }
            Err(ModuleError::Read { path, source }) => {
                return raise(
                    ErrorKind::ImportError,
                    format!("cannot read module '{name}' from {}: {source}", path.display()),
                )
            }
            Err(ModuleError::Compile(failure)) => {
                return raise(ErrorKind::SyntaxError, failure.to_string());
            }
        };

        debug!(module = name, origin = %unit.origin(), "executing module");
        let globals = new_scope();
        globals
            .borrow_mut()
            .insert("__name__".to_string(), Value::str(name));
        self.importing.push(name.to_string());
        let result = self.run_unit(&unit, globals.clone());
        self.importing.pop();
        result?;

        let module = Rc::new(Module {
            name: name.to_string(),
            globals,
        });
        self.loaded.insert(name.to_string(), module.clone());
        Ok(module)
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    /// Render one binding for the Variables pane.
    pub fn view(&self, name: &str, value: &Value) -> VariableView {
        let rendered = match value {
            Value::Shape(s) => self.kernel.lock().describe(s),
            other => other.repr(),
        };
        VariableView {
            name: name.to_string(),
            type_name: value.type_name().to_string(),
            value: truncate(rendered),
        }
    }

    /// Visible user bindings: no private names, no injected helpers.
    pub fn variables(&self, bindings: &IndexMap<String, Value>) -> Vec<VariableView> {
        bindings
            .iter()
            .filter(|(name, _)| is_user_name(name))
            .map(|(name, value)| self.view(name, value))
            .collect()
    }

    /// Visible bindings of the top frame.
    pub fn frame_variables(&self) -> Vec<VariableView> {
        match self.frames.last() {
            Some(frame) => self.variables(&frame.bindings().borrow()),
            None => Vec::new(),
        }
    }
}

/// Names shown to the user and scanned by implicit discovery.
pub fn is_user_name(name: &str) -> bool {
    VariableView::is_visible_name(name) && !INJECTED_NAMES.contains(&name)
}

fn truncate(mut text: String) -> String {
    if text.chars().count() > VIEW_LIMIT {
        text = text.chars().take(VIEW_LIMIT).collect();
        text.push_str("...");
    }
    text
}

fn bind_params(closure: &Closure, args: Args) -> Result<Scope, Interrupt> {
    let def = &closure.def;
    let params = &def.params;
    if args.positional.len() > params.len() {
        return raise(
            ErrorKind::TypeError,
            format!(
                "{}() takes {} positional arguments but {} were given",
                def.name,
                params.len(),
                args.positional.len()
            ),
        );
    }

    let mut slots: Vec<Option<Value>> = args.positional.into_iter().map(Some).collect();
    slots.resize(params.len(), None);
    for (key, value) in args.keywords {
        match params.iter().position(|p| p.name == key) {
            Some(i) if slots[i].is_some() => {
                return raise(
                    ErrorKind::TypeError,
                    format!("{}() got multiple values for argument '{key}'", def.name),
                )
            }
            Some(i) => slots[i] = Some(value),
            None => {
                return raise(
                    ErrorKind::TypeError,
                    format!("{}() got an unexpected keyword argument '{key}'", def.name),
                )
            }
        }
    }

    let scope = new_scope();
    {
        let mut locals = scope.borrow_mut();
        for (i, (param, slot)) in params.iter().zip(slots).enumerate() {
            let value = match slot.or_else(|| closure.defaults.get(i).cloned().flatten()) {
                Some(v) => v,
                None => {
                    return raise(
                        ErrorKind::TypeError,
                        format!(
                            "{}() missing required argument '{}'",
                            def.name, param.name
                        ),
                    )
                }
            };
            locals.insert(param.name.clone(), value);
        }
    }
    Ok(scope)
}

// ── Operators ───────────────────────────────────────────────────────────

enum Num {
    I(i64),
    F(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(n) => Some(Num::I(*n)),
        Value::Bool(b) => Some(Num::I(*b as i64)),
        Value::Float(x) => Some(Num::F(*x)),
        _ => None,
    }
}

fn unary(op: UnaryOp, v: &Value) -> Result<Value, Interrupt> {
    match (op, num(v)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Some(Num::I(n))) => match n.checked_neg() {
            Some(n) => Ok(Value::Int(n)),
            None => raise(ErrorKind::ValueError, "integer overflow"),
        },
        (UnaryOp::Neg, Some(Num::F(x))) => Ok(Value::Float(-x)),
        (UnaryOp::Pos, Some(Num::I(n))) => Ok(Value::Int(n)),
        (UnaryOp::Pos, Some(Num::F(x))) => Ok(Value::Float(x)),
        (_, None) => raise(
            ErrorKind::TypeError,
            format!("bad operand type for unary operator: '{}'", v.type_name()),
        ),
    }
}

pub(crate) fn binary(op: BinOp, l: &Value, r: &Value) -> Result<Value, Interrupt> {
    match (op, l, r) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::str(&format!("{a}{b}"))),
        (BinOp::Mul, Value::Str(s), Value::Int(n)) | (BinOp::Mul, Value::Int(n), Value::Str(s)) => {
            let times = repeat_count(s.len(), *n)?;
            return Ok(Value::str(&s.repeat(times)));
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            return Ok(Value::list(items));
        }
        (BinOp::Mul, Value::List(a), Value::Int(n)) => {
            let items = a.borrow();
            let times = repeat_count(items.len(), *n)?;
            let mut out = Vec::with_capacity(items.len() * times);
            for _ in 0..times {
                out.extend(items.iter().cloned());
            }
            return Ok(Value::list(out));
        }
        _ => {}
    }

    match (num(l), num(r)) {
        (Some(Num::I(a)), Some(Num::I(b))) => int_op(op, a, b),
        (Some(a), Some(b)) => {
            let a = match a {
                Num::I(n) => n as f64,
                Num::F(x) => x,
            };
            let b = match b {
                Num::I(n) => n as f64,
                Num::F(x) => x,
            };
            float_op(op, a, b)
        }
        _ => raise(
            ErrorKind::TypeError,
            format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op.symbol(),
                l.type_name(),
                r.type_name()
            ),
        ),
    }
}

/// Checked repetition count for a sequence of `len` items repeated `n` times.
fn repeat_count(len: usize, n: i64) -> Result<usize, Interrupt> {
    let times = usize::try_from(n.max(0)).unwrap_or(usize::MAX);
    match len.checked_mul(times) {
        Some(total) if total <= REPEAT_LIMIT => Ok(if len == 0 { 0 } else { times }),
        _ => raise(ErrorKind::ValueError, "repeated sequence too large"),
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> Result<Value, Interrupt> {
    let overflow = || Interrupt::Error(ScriptError::new(ErrorKind::ValueError, "integer overflow"));
    let by_zero = || {
        Interrupt::Error(ScriptError::new(
            ErrorKind::ZeroDivisionError,
            "integer division or modulo by zero",
        ))
    };
    let v = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(overflow)?,
        BinOp::Div => {
            if b == 0 {
                return raise(ErrorKind::ZeroDivisionError, "division by zero");
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(by_zero());
            }
            let q = a.checked_div(b).ok_or_else(overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(by_zero());
            }
            let m = a.checked_rem(b).ok_or_else(overflow)?;
            if m != 0 && ((m < 0) != (b < 0)) {
                m + b
            } else {
                m
            }
        }
        BinOp::Pow => {
            if b < 0 {
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            a.checked_pow(exp).ok_or_else(overflow)?
        }
    };
    Ok(Value::Int(v))
}

fn float_op(op: BinOp, a: f64, b: f64) -> Result<Value, Interrupt> {
    if b == 0.0 && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
        return raise(ErrorKind::ZeroDivisionError, "float division by zero");
    }
    let v = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => a - b * (a / b).floor(),
        BinOp::Pow => a.powf(b),
    };
    Ok(Value::Float(v))
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, Interrupt> {
    use std::cmp::Ordering;

    match op {
        CmpOp::Eq => return Ok(l.equals(r)),
        CmpOp::NotEq => return Ok(!l.equals(r)),
        CmpOp::In => return contains(r, l),
        CmpOp::NotIn => return contains(r, l).map(|b| !b),
        _ => {}
    }

    let ordering = match (l, r) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return raise(
                    ErrorKind::TypeError,
                    format!(
                        "'{}' not supported between instances of '{}' and '{}'",
                        op.symbol(),
                        l.type_name(),
                        r.type_name()
                    ),
                )
            }
        },
    };
    let Some(ordering) = ordering else {
        // NaN compares false with everything.
        return Ok(false);
    };
    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::LtEq => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn contains(container: &Value, item: &Value) -> Result<bool, Interrupt> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.borrow().iter().any(|v| v.equals(item))),
        (Value::Dict(entries), Value::Str(key)) => Ok(entries.borrow().contains_key(&**key)),
        (Value::Dict(_), _) => Ok(false),
        (Value::Str(hay), Value::Str(needle)) => Ok(hay.contains(&**needle)),
        (Value::Str(_), other) => raise(
            ErrorKind::TypeError,
            format!("'in <string>' requires string as left operand, not {}", other.type_name()),
        ),
        _ => raise(
            ErrorKind::TypeError,
            format!("argument of type '{}' is not iterable", container.type_name()),
        ),
    }
}

fn list_index(len: usize, index: &Value, what: &str) -> Result<usize, Interrupt> {
    let i = match index {
        Value::Int(i) => *i,
        Value::Bool(b) => *b as i64,
        other => {
            return raise(
                ErrorKind::TypeError,
                format!("{what} indices must be integers, not {}", other.type_name()),
            )
        }
    };
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return raise(ErrorKind::IndexError, format!("{what} index out of range"));
    }
    Ok(resolved as usize)
}

fn get_item(object: &Value, index: &Value) -> Result<Value, Interrupt> {
    match object {
        Value::List(items) => {
            let items = items.borrow();
            let i = list_index(items.len(), index, "list")?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = list_index(chars.len(), index, "string")?;
            Ok(Value::str(&chars[i].to_string()))
        }
        Value::Dict(entries) => {
            let Value::Str(key) = index else {
                return raise(ErrorKind::KeyError, index.repr());
            };
            match entries.borrow().get(&**key) {
                Some(v) => Ok(v.clone()),
                None => raise(ErrorKind::KeyError, index.repr()),
            }
        }
        other => raise(
            ErrorKind::TypeError,
            format!("'{}' object is not subscriptable", other.type_name()),
        ),
    }
}

fn set_item(object: &Value, index: Value, value: Value) -> Result<(), Interrupt> {
    match object {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = list_index(items.len(), &index, "list")?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(entries) => match index {
            Value::Str(key) => {
                entries.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            other => raise(
                ErrorKind::TypeError,
                format!("dict keys must be strings, not {}", other.type_name()),
            ),
        },
        other => raise(
            ErrorKind::TypeError,
            format!("'{}' object does not support item assignment", other.type_name()),
        ),
    }
}

fn get_attr(object: Value, name: &str) -> Result<Value, Interrupt> {
    match &object {
        Value::Module(m) => match m.globals.borrow().get(name) {
            Some(v) => Ok(v.clone()),
            None => raise(
                ErrorKind::AttributeError,
                format!("module '{}' has no attribute '{name}'", m.name),
            ),
        },
        Value::Error(e) => match name {
            "message" => Ok(Value::str(&e.message)),
            "kind" => Ok(Value::str(e.kind.name())),
            _ => raise(
                ErrorKind::AttributeError,
                format!("'{}' object has no attribute '{name}'", e.kind.name()),
            ),
        },
        _ => match builtins::method_name(&object, name) {
            Some(method) => Ok(Value::Method(Rc::new(Method {
                receiver: object,
                name: method,
            }))),
            None => raise(
                ErrorKind::AttributeError,
                format!("'{}' object has no attribute '{name}'", object.type_name()),
            ),
        },
    }
}
