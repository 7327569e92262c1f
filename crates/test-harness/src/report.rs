//! Plain-text scene reports.
//!
//! Reports are text, not JSON, because they are meant to be read in a
//! failing test's output.

use std::fmt;

use display_tree::{DisplayEntry, DisplayTree};
use shape_kernel::Kernel;

use crate::workflow::ScriptSession;

/// Snapshot of everything the display side holds.
pub struct SceneReport {
    pub entries: Vec<EntryLine>,
    pub ephemeral: Vec<EntryLine>,
    /// Entries held aside while a debug session runs.
    pub stashed: Option<Vec<EntryLine>>,
    pub on_screen: usize,
}

pub struct EntryLine {
    pub name: String,
    pub shape: String,
    pub visible: bool,
    pub color: String,
    pub transparency: f64,
}

impl EntryLine {
    fn from_entry(entry: &DisplayEntry, describe: &dyn Fn(&DisplayEntry) -> String) -> Self {
        Self {
            name: entry.name.clone(),
            shape: describe(entry),
            visible: entry.visible,
            color: entry.color.to_hex(),
            transparency: entry.transparency,
        }
    }
}

impl SceneReport {
    pub fn capture(session: &ScriptSession) -> Self {
        let kernel = session.kernel().lock();
        let describe = |entry: &DisplayEntry| Kernel::describe(&*kernel, &entry.shape);
        let lines = |tree: &DisplayTree| {
            tree.entries()
                .map(|e| EntryLine::from_entry(e, &describe))
                .collect::<Vec<_>>()
        };
        let reconciler = session.reconciler();
        Self {
            entries: lines(reconciler.tree()),
            ephemeral: lines(reconciler.ephemeral()),
            stashed: reconciler.stashed().map(lines),
            on_screen: session.viewer().shown_names().len(),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Scene Report ===\n\n");
        out.push_str(&format!(
            "Model Tree ({} entries, {} on screen):\n",
            self.entries.len(),
            self.on_screen
        ));
        push_lines(&mut out, &self.entries);
        if !self.ephemeral.is_empty() {
            out.push_str(&format!("Debug Shapes ({}):\n", self.ephemeral.len()));
            push_lines(&mut out, &self.ephemeral);
        }
        if let Some(stashed) = &self.stashed {
            out.push_str(&format!("Stashed ({}):\n", stashed.len()));
            push_lines(&mut out, stashed);
        }
        out
    }
}

fn push_lines(out: &mut String, lines: &[EntryLine]) {
    if lines.is_empty() {
        out.push_str("  (empty)\n");
    }
    for line in lines {
        let hidden = if line.visible { "" } else { " [HIDDEN]" };
        out.push_str(&format!(
            "  \"{}\" {} color={} alpha={:.2}{}\n",
            line.name, line.shape, line.color, line.transparency, hidden
        ));
    }
}

impl fmt::Display for SceneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}
