use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cad_types::PublishableKinds;
use display_tree::ReconcileOptions;
use script_runtime::{IsolationOptions, RunOptions};

/// Engine settings, usually read from a TOML file.
///
/// ```toml
/// [run]
/// reload_imported_modules = true
/// partial_results_on_failure = false
///
/// [display]
/// preserve_properties = true
/// publishable_kinds = ["Solid", "Compound"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub run: RunConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Forget modules a run imported so the next run re-reads them.
    pub reload_imported_modules: bool,
    pub add_script_dir_to_path: bool,
    pub change_working_dir: bool,
    /// Show what a failed run published before it failed.
    pub partial_results_on_failure: bool,
    /// Searched for `import` after the script directory.
    pub extra_module_paths: Vec<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reload_imported_modules: true,
            add_script_dir_to_path: true,
            change_working_dir: false,
            partial_results_on_failure: false,
            extra_module_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub preserve_properties: bool,
    pub clear_before_run: bool,
    pub publishable_kinds: PublishableKinds,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let reconcile = ReconcileOptions::default();
        Self {
            preserve_properties: reconcile.preserve_properties,
            clear_before_run: reconcile.clear_before_run,
            publishable_kinds: PublishableKinds::default(),
        }
    }
}

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Options for one run of the script saved at `script_path`.
    pub fn run_options(&self, script_path: Option<PathBuf>) -> RunOptions {
        RunOptions {
            isolation: IsolationOptions {
                reload_imported_modules: self.run.reload_imported_modules,
                add_script_dir_to_path: self.run.add_script_dir_to_path,
                change_working_dir: self.run.change_working_dir,
                script_path,
            },
            publishable_kinds: self.display.publishable_kinds.clone(),
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            preserve_properties: self.display.preserve_properties,
            clear_before_run: self.display.clear_before_run,
        }
    }
}
