//! One complete run: isolate, execute, harvest.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use cad_types::{PublicationEntry, PublishableKinds, VariableView};
use script_lang::{compile, CompiledUnit};
use shape_kernel::SharedKernel;

use crate::error::{Interrupt, IsolationError, RunFailure};
use crate::interp::{Interpreter, LogSink, Tracer};
use crate::isolation::{IsolationOptions, IsolationScope, Namespace};
use crate::modules::SharedModules;
use crate::publish::discover;
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub isolation: IsolationOptions,
    pub publishable_kinds: PublishableKinds,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "failure")]
pub enum RunStatus {
    Finished,
    Failed(RunFailure),
    Cancelled,
}

impl RunStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Finished => "finished",
            RunStatus::Failed(_) => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        match self {
            RunStatus::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Everything a run leaves behind that outlives its namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    /// Explicit publications in first-publication order, or the implicit
    /// discovery result when nothing was published explicitly.
    pub publications: Vec<PublicationEntry>,
    /// Whether `publications` came from explicit calls.
    pub explicit: bool,
    /// Final user bindings of the script namespace.
    pub variables: Vec<VariableView>,
}

impl RunReport {
    /// A run that never started because the source did not compile.
    pub fn compile_failed(failure: script_lang::CompileFailure) -> Self {
        Self {
            status: RunStatus::Failed(RunFailure::Compile(failure)),
            publications: Vec::new(),
            explicit: false,
            variables: Vec::new(),
        }
    }
}

/// A report plus the live bindings, which stay on the executing thread.
pub struct Execution {
    pub report: RunReport,
    pub bindings: IndexMap<String, Value>,
}

/// Execute `unit` in a fresh namespace inside an isolation scope.
///
/// Scoped process state is restored before this returns, whatever the
/// outcome of the script.
#[instrument(skip_all, fields(origin = %unit.origin()))]
pub fn execute(
    unit: &CompiledUnit,
    options: &RunOptions,
    kernel: SharedKernel,
    modules: SharedModules,
    log: LogSink,
    tracer: Option<Box<dyn Tracer>>,
) -> Result<Execution, IsolationError> {
    let _scope = IsolationScope::enter(&options.isolation, modules.clone())?;

    let mut interp = Interpreter::new(kernel, modules);
    interp.set_log(log);
    interp.set_publishable_kinds(options.publishable_kinds.clone());
    if let Some(tracer) = tracer {
        interp.set_tracer(tracer);
    }

    let namespace = Namespace::prepare();
    let status = match interp.run_unit(unit, namespace.scope().clone()) {
        Ok(()) => RunStatus::Finished,
        Err(Interrupt::Error(e)) => {
            warn!(error = %e, "script failed");
            RunStatus::Failed(RunFailure::Runtime(e))
        }
        Err(Interrupt::Cancelled) => RunStatus::Cancelled,
    };
    interp.take_tracer();

    let bindings = namespace.finalize();
    let explicit = interp.publications().explicit_count() > 0;
    let publications = if explicit {
        interp.publications_mut().take()
    } else {
        discover(&bindings, &options.publishable_kinds)
    };
    let variables = interp.variables(&bindings);

    info!(
        status = status.label(),
        publications = publications.len(),
        explicit,
        "run complete"
    );
    Ok(Execution {
        report: RunReport {
            status,
            publications,
            explicit,
            variables,
        },
        bindings,
    })
}

/// Compile and execute source text. Compile failures become a failed
/// report; only isolation problems are errors.
pub fn execute_source(
    source: &str,
    options: &RunOptions,
    kernel: SharedKernel,
    modules: SharedModules,
    log: LogSink,
) -> Result<Execution, IsolationError> {
    match compile(source) {
        Ok(unit) => execute(&unit, options, kernel, modules, log, None),
        Err(failure) => Ok(Execution {
            report: RunReport::compile_failed(failure),
            bindings: IndexMap::new(),
        }),
    }
}
