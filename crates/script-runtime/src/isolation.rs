//! Per-run namespace and scoped process state.
//!
//! A [`Namespace`] is created fresh for every run with the publication
//! callbacks and the kernel module pre-bound; [`Namespace::finalize`] strips
//! them again so only user bindings remain. An [`IsolationScope`] guards the
//! search path, the working directory and the module cache for the duration
//! of a run and restores all three when dropped, on every exit path.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::builtins;
use crate::error::IsolationError;
use crate::modules::{ModuleSnapshot, SharedModules};
use crate::publish;
use crate::value::{new_scope, Builtin, Scope, Value};

/// Names bound into every run namespace by the engine.
pub const INJECTED_NAMES: [&str; 4] = ["show_object", "debug", "log", "cad"];

/// A fresh execution namespace for one run.
pub struct Namespace {
    scope: Scope,
}

impl Namespace {
    /// An empty namespace with the engine's helpers injected.
    pub fn prepare() -> Self {
        let scope = new_scope();
        {
            let mut s = scope.borrow_mut();
            s.insert("__name__".to_string(), Value::str("__main__"));
            s.insert(
                "show_object".to_string(),
                Value::Builtin(Builtin {
                    name: "show_object",
                    func: publish::show_object,
                }),
            );
            s.insert(
                "debug".to_string(),
                Value::Builtin(Builtin {
                    name: "debug",
                    func: publish::debug,
                }),
            );
            s.insert(
                "log".to_string(),
                Value::Builtin(Builtin {
                    name: "log",
                    func: publish::log,
                }),
            );
            s.insert(
                "cad".to_string(),
                Value::Module(Rc::new(builtins::kernel_module())),
            );
        }
        Self { scope }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// The bindings left once the injected helpers are removed.
    ///
    /// The underlying scope keeps the helpers, since functions defined by
    /// the script still resolve their globals through it.
    pub fn finalize(&self) -> IndexMap<String, Value> {
        self.scope
            .borrow()
            .iter()
            .filter(|(name, _)| !INJECTED_NAMES.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// Which scoped changes a run makes to process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IsolationOptions {
    /// Evict modules first imported during the run once it ends.
    pub reload_imported_modules: bool,
    /// Put the script's directory first on the module search path.
    pub add_script_dir_to_path: bool,
    /// Run with the script's directory as working directory.
    pub change_working_dir: bool,
    /// On-disk location of the script, if it has been saved.
    pub script_path: Option<PathBuf>,
}

impl IsolationOptions {
    fn script_dir(&self) -> Option<PathBuf> {
        let dir = self.script_path.as_deref()?.parent()?;
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        dir.is_dir().then(|| dir.to_path_buf())
    }
}

/// Restores search path, working directory and module cache on drop.
pub struct IsolationScope {
    modules: SharedModules,
    before: Option<ModuleSnapshot>,
    /// The prepended script directory and where it sat before.
    added_path: Option<(PathBuf, Option<usize>)>,
    previous_dir: Option<PathBuf>,
}

impl IsolationScope {
    pub fn enter(
        options: &IsolationOptions,
        modules: SharedModules,
    ) -> Result<Self, IsolationError> {
        let before = options
            .reload_imported_modules
            .then(|| modules.lock().snapshot());
        let mut scope = Self {
            modules,
            before,
            added_path: None,
            previous_dir: None,
        };

        let dir = options.script_dir();
        if options.add_script_dir_to_path {
            if let Some(dir) = &dir {
                let previous = scope.modules.lock().prepend_path(dir);
                debug!(dir = %dir.display(), ?previous, "script directory first on module path");
                scope.added_path = Some((dir.clone(), previous));
            }
        }

        // Any failure from here on drops `scope`, undoing the steps above.
        if options.change_working_dir {
            if let Some(dir) = &dir {
                let previous = std::env::current_dir().map_err(IsolationError::CurrentDir)?;
                std::env::set_current_dir(dir).map_err(|source| IsolationError::ChangeDir {
                    path: dir.clone(),
                    source,
                })?;
                debug!(dir = %dir.display(), "working directory changed");
                scope.previous_dir = Some(previous);
            }
        }

        Ok(scope)
    }
}

impl Drop for IsolationScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous_dir.take() {
            if let Err(e) = std::env::set_current_dir(&previous) {
                warn!(dir = %previous.display(), error = %e, "failed to restore working directory");
            }
        }
        let mut modules = self.modules.lock();
        if let Some((dir, previous)) = self.added_path.take() {
            modules.restore_path(&dir, previous);
        }
        if let Some(before) = self.before.take() {
            modules.evict_since(&before);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleRegistry;

    #[test]
    fn finalize_strips_injected_names_only() {
        let ns = Namespace::prepare();
        ns.scope()
            .borrow_mut()
            .insert("result".to_string(), Value::Int(1));
        // A user rebinding of an injected name is still stripped.
        ns.scope()
            .borrow_mut()
            .insert("log".to_string(), Value::Int(2));

        let bindings = ns.finalize();
        let names: Vec<&str> = bindings.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["__name__", "result"]);
    }

    #[test]
    fn search_path_is_restored_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("part.cad");
        std::fs::write(&script, "").unwrap();
        let modules = ModuleRegistry::default().shared();

        let options = IsolationOptions {
            add_script_dir_to_path: true,
            script_path: Some(script),
            ..Default::default()
        };
        {
            let _scope = IsolationScope::enter(&options, modules.clone()).unwrap();
            assert_eq!(modules.lock().search_paths(), &[dir.path().to_path_buf()]);
        }
        assert!(modules.lock().search_paths().is_empty());
    }

    #[test]
    fn listed_script_directory_goes_first_then_back() {
        let lib = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("part.cad");
        std::fs::write(&script, "").unwrap();
        let configured = vec![lib.path().to_path_buf(), dir.path().to_path_buf()];
        let modules = ModuleRegistry::new(configured.clone()).shared();

        let options = IsolationOptions {
            add_script_dir_to_path: true,
            script_path: Some(script),
            ..Default::default()
        };
        {
            let _scope = IsolationScope::enter(&options, modules.clone()).unwrap();
            assert_eq!(
                modules.lock().search_paths(),
                &[dir.path().to_path_buf(), lib.path().to_path_buf()]
            );
        }
        assert_eq!(modules.lock().search_paths(), configured.as_slice());
    }

    #[test]
    fn unsaved_script_changes_nothing() {
        let modules = ModuleRegistry::default().shared();
        let options = IsolationOptions {
            add_script_dir_to_path: true,
            change_working_dir: true,
            ..Default::default()
        };
        let cwd = std::env::current_dir().unwrap();
        let scope = IsolationScope::enter(&options, modules.clone()).unwrap();
        assert!(modules.lock().search_paths().is_empty());
        assert_eq!(std::env::current_dir().unwrap(), cwd);
        drop(scope);
    }

    #[test]
    fn reload_policy_evicts_modules_loaded_inside_the_scope() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("early.cad"), "A = 1\n").unwrap();
        std::fs::write(dir.path().join("late.cad"), "B = 1\n").unwrap();
        let modules = ModuleRegistry::new([dir.path().to_path_buf()]).shared();
        modules.lock().resolve("early").unwrap();

        let options = IsolationOptions {
            reload_imported_modules: true,
            ..Default::default()
        };
        {
            let _scope = IsolationScope::enter(&options, modules.clone()).unwrap();
            modules.lock().resolve("late").unwrap();
        }
        assert!(modules.lock().is_loaded("early"));
        assert!(!modules.lock().is_loaded("late"));
    }
}
