//! Interactive console over a persistent namespace.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use cad_types::{PublicationEntry, PublishableKinds};
use script_lang::compile;
use shape_kernel::SharedKernel;

use crate::error::{Interrupt, RunFailure};
use crate::interp::Interpreter;
use crate::isolation::Namespace;
use crate::modules::SharedModules;
use crate::value::Value;

/// Result of evaluating one console snippet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleOutcome {
    /// `repr` of a trailing expression statement, unless it was `None`.
    pub echo: Option<String>,
    pub log: Vec<String>,
    /// Objects the snippet published, in order.
    pub publications: Vec<PublicationEntry>,
    pub failure: Option<RunFailure>,
}

pub struct Console {
    interp: Interpreter,
    namespace: Namespace,
    output: Rc<RefCell<Vec<String>>>,
}

impl Console {
    pub fn new(kernel: SharedKernel, modules: SharedModules, kinds: PublishableKinds) -> Self {
        let output = Rc::new(RefCell::new(Vec::new()));
        let mut interp = Interpreter::new(kernel, modules);
        interp.set_publishable_kinds(kinds);
        let sink = output.clone();
        interp.set_log(Box::new(move |line| sink.borrow_mut().push(line.to_string())));
        Self {
            interp,
            namespace: Namespace::prepare(),
            output,
        }
    }

    /// Start over from the bindings a script run left behind.
    pub fn seed(&mut self, bindings: &IndexMap<String, Value>) {
        self.namespace = Namespace::prepare();
        let mut scope = self.namespace.scope().borrow_mut();
        for (name, value) in bindings {
            scope.insert(name.clone(), value.clone());
        }
        debug!(bindings = bindings.len(), "console seeded");
    }

    /// Current user bindings.
    pub fn bindings(&self) -> IndexMap<String, Value> {
        self.namespace.finalize()
    }

    pub fn eval(&mut self, source: &str) -> ConsoleOutcome {
        let unit = match compile(source) {
            Ok(unit) => unit,
            Err(failure) => {
                return ConsoleOutcome {
                    failure: Some(RunFailure::Compile(failure)),
                    ..Default::default()
                }
            }
        };

        let result = self
            .interp
            .run_interactive(&unit, self.namespace.scope().clone());
        let mut outcome = ConsoleOutcome {
            log: std::mem::take(&mut *self.output.borrow_mut()),
            publications: self.interp.publications_mut().take(),
            ..Default::default()
        };
        match result {
            Ok(Some(Value::None)) | Ok(None) => {}
            Ok(Some(value)) => outcome.echo = Some(value.repr()),
            Err(Interrupt::Error(e)) => outcome.failure = Some(RunFailure::Runtime(e)),
            Err(Interrupt::Cancelled) => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleRegistry;
    use shape_kernel::{shared, MockKernel};

    fn console() -> Console {
        Console::new(
            shared(MockKernel::new()),
            ModuleRegistry::default().shared(),
            PublishableKinds::default(),
        )
    }

    #[test]
    fn state_persists_between_snippets() {
        let mut c = console();
        assert_eq!(c.eval("x = 20").echo, None);
        assert_eq!(c.eval("x * 2 + 2").echo.as_deref(), Some("42"));
        assert!(c.bindings().contains_key("x"));
    }

    #[test]
    fn seeded_bindings_are_visible() {
        let mut c = console();
        let mut bindings = IndexMap::new();
        bindings.insert("width".to_string(), Value::Int(7));
        c.seed(&bindings);
        assert_eq!(c.eval("width").echo.as_deref(), Some("7"));
    }

    #[test]
    fn publications_and_output_are_reported_per_snippet() {
        let mut c = console();
        let out = c.eval("print('hi')\nshow_object(box(1, 2, 3), name='probe')");
        assert_eq!(out.log, vec!["hi".to_string()]);
        assert_eq!(out.publications.len(), 1);
        assert_eq!(out.publications[0].name, "probe");

        let again = c.eval("1");
        assert!(again.log.is_empty());
        assert!(again.publications.is_empty());
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let mut c = console();
        assert!(matches!(
            c.eval("missing").failure,
            Some(RunFailure::Runtime(_))
        ));
        assert!(matches!(
            c.eval("x = (").failure,
            Some(RunFailure::Compile(_))
        ));
    }
}
