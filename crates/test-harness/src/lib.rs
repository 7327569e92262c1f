//! Test harness for driving the script engine end to end.
//!
//! Provides programmatic tools for scripting edit/run/debug workflows,
//! checking the display tree and viewer traffic at every step, and
//! producing readable scene descriptions.
//!
//! # Key Components
//!
//! - [`ScriptSession`] — Fluent API over the real command dispatch path
//! - [`fakes`] — Recording viewer and in-memory editor
//! - [`report`] — Text descriptions of the scene
//! - [`assertions`] — Assertion helpers with diagnostics
//! - [`helpers`] — Event filters and the harness error type

pub mod assertions;
pub mod fakes;
pub mod helpers;
pub mod report;
pub mod workflow;

pub use fakes::{RecordingViewer, ScriptEditor, ViewerCall};
pub use helpers::HarnessError;
pub use report::SceneReport;
pub use workflow::ScriptSession;
