//! Controller wiring between the script editor, the script runtime, the
//! display tree and the 3-D viewer.

pub mod config;
pub mod dispatch;
pub mod editor;
pub mod engine;
pub mod logging;
pub mod messages;

pub use config::{ConfigError, DisplayConfig, EngineConfig, RunConfig};
pub use dispatch::{dispatch, dispatch_json};
pub use editor::Editor;
pub use engine::{BridgeError, ScriptEngine};
pub use messages::{EditorCommand, EngineEvent};
