//! Collaborator doubles for the viewer and the editor.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use display_tree::{Renderable, Viewer};
use editor_bridge::Editor;
use uuid::Uuid;

/// One call received by a [`RecordingViewer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCall {
    Display { id: Uuid, name: String },
    Remove { id: Uuid },
    Redisplay { id: Uuid },
    AutoFit,
}

/// Viewer that records every call and tracks what is on screen.
#[derive(Debug, Default)]
pub struct RecordingViewer {
    calls: Vec<ViewerCall>,
    shown: HashMap<Uuid, Renderable>,
}

impl RecordingViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[ViewerCall] {
        &self.calls
    }

    /// Forget recorded calls; what is on screen stays.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn display_count(&self) -> usize {
        self.count(|c| matches!(c, ViewerCall::Display { .. }))
    }

    pub fn remove_count(&self) -> usize {
        self.count(|c| matches!(c, ViewerCall::Remove { .. }))
    }

    pub fn fit_count(&self) -> usize {
        self.count(|c| matches!(c, ViewerCall::AutoFit))
    }

    /// Names currently on screen, sorted.
    pub fn shown_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shown.values().map(|r| r.name.clone()).collect();
        names.sort();
        names
    }

    pub fn shown(&self, id: Uuid) -> Option<&Renderable> {
        self.shown.get(&id)
    }

    fn count(&self, pred: impl Fn(&ViewerCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl Viewer for RecordingViewer {
    fn display(&mut self, renderable: &Renderable) {
        self.calls.push(ViewerCall::Display {
            id: renderable.id,
            name: renderable.name.clone(),
        });
        self.shown.insert(renderable.id, renderable.clone());
    }

    fn remove(&mut self, id: Uuid) {
        self.calls.push(ViewerCall::Remove { id });
        self.shown.remove(&id);
    }

    fn redisplay(&mut self, renderable: &Renderable) {
        self.calls.push(ViewerCall::Redisplay { id: renderable.id });
        self.shown.insert(renderable.id, renderable.clone());
    }

    fn auto_fit(&mut self) {
        self.calls.push(ViewerCall::AutoFit);
    }
}

/// An editor holding one script in memory.
#[derive(Debug, Clone, Default)]
pub struct ScriptEditor {
    pub source: String,
    pub path: Option<PathBuf>,
    pub breakpoints: BTreeSet<u32>,
}

impl ScriptEditor {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }
}

impl Editor for ScriptEditor {
    fn current_source_text(&self) -> String {
        self.source.clone()
    }

    fn current_source_path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn breakpoint_lines(&self) -> BTreeSet<u32> {
        self.breakpoints.clone()
    }
}
