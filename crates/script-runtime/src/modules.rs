//! Caller-owned module registry.
//!
//! Resolves `import name` to a compiled unit read from the search path and
//! caches it. Eviction (see [`ModuleRegistry::evict_since`]) is how a re-run
//! picks up edits to helper modules: evicted names are read from disk again
//! on their next import.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

use script_lang::{compile_module, CompileFailure, CompiledUnit};

/// File extension of importable script modules.
pub const MODULE_EXTENSION: &str = "cad";

#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("no module named '{name}'")]
    NotFound { name: String },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileFailure),
}

/// Names loaded at some point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSnapshot(BTreeSet<String>);

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    search_paths: Vec<PathBuf>,
    units: IndexMap<String, Arc<CompiledUnit>>,
}

/// The registry as shared between the controller and script workers.
pub type SharedModules = Arc<Mutex<ModuleRegistry>>;

impl ModuleRegistry {
    pub fn new(search_paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            search_paths: search_paths.into_iter().collect(),
            units: IndexMap::new(),
        }
    }

    pub fn shared(self) -> SharedModules {
        Arc::new(Mutex::new(self))
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Put `dir` first on the search path, moving it if already present.
    /// Returns its previous position for [`ModuleRegistry::restore_path`].
    pub fn prepend_path(&mut self, dir: &Path) -> Option<usize> {
        let previous = self.search_paths.iter().position(|p| p == dir);
        let dir = match previous {
            Some(i) => self.search_paths.remove(i),
            None => dir.to_path_buf(),
        };
        self.search_paths.insert(0, dir);
        previous
    }

    /// Undo [`ModuleRegistry::prepend_path`]: drop `dir` again, or move it
    /// back to `previous` if it was on the path before.
    pub fn restore_path(&mut self, dir: &Path, previous: Option<usize>) {
        let Some(i) = self.search_paths.iter().position(|p| p == dir) else {
            return;
        };
        let dir = self.search_paths.remove(i);
        if let Some(at) = previous {
            let at = at.min(self.search_paths.len());
            self.search_paths.insert(at, dir);
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn loaded_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn snapshot(&self) -> ModuleSnapshot {
        ModuleSnapshot(self.units.keys().cloned().collect())
    }

    /// Evict every module loaded after `before` was taken. Returns the
    /// evicted names in load order.
    pub fn evict_since(&mut self, before: &ModuleSnapshot) -> Vec<String> {
        let fresh: Vec<String> = self
            .units
            .keys()
            .filter(|name| !before.0.contains(*name))
            .cloned()
            .collect();
        for name in &fresh {
            self.units.shift_remove(name);
        }
        if !fresh.is_empty() {
            debug!(modules = ?fresh, "evicted modules loaded during run");
        }
        fresh
    }

    pub fn evict(&mut self, name: &str) -> bool {
        self.units.shift_remove(name).is_some()
    }

    /// The cached unit for `name`, or the first `<dir>/<name>.cad` on the
    /// search path, compiled with its path as source identity.
    pub fn resolve(&mut self, name: &str) -> Result<Arc<CompiledUnit>, ModuleError> {
        if let Some(unit) = self.units.get(name) {
            return Ok(unit.clone());
        }

        let file_name = format!("{name}.{MODULE_EXTENSION}");
        let path = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ModuleError::NotFound {
                name: name.to_string(),
            })?;

        let source = std::fs::read_to_string(&path).map_err(|source| ModuleError::Read {
            path: path.clone(),
            source,
        })?;
        let unit = Arc::new(compile_module(&source, &path.display().to_string())?);
        debug!(module = name, path = %path.display(), "loaded module");
        self.units.insert(name.to_string(), unit.clone());
        Ok(unit)
    }
}
