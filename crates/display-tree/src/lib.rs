pub mod reconcile;
pub mod tree;
pub mod types;
pub mod viewer;

use tracing::{debug, info};

use cad_types::{PublicationEntry, Rgba};
use shape_kernel::Kernel;

pub use tree::DisplayTree;
pub use types::*;
pub use viewer::Viewer;

/// Owner of the persistent model tree, the debug stash and the per-pause
/// ephemeral set.
///
/// All mutation goes through `&mut self`, so calls are strictly serialized.
/// While the tree is stashed, calls that would publish into it are
/// rejected with [`ReconcileError::Stashed`].
#[derive(Debug, Default)]
pub struct Reconciler {
    tree: DisplayTree,
    stash: Option<DisplayTree>,
    ephemeral: DisplayTree,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ReconcileOptions) {
        self.options = options;
    }

    /// The persistent tree as currently shown.
    pub fn tree(&self) -> &DisplayTree {
        &self.tree
    }

    pub fn ephemeral(&self) -> &DisplayTree {
        &self.ephemeral
    }

    pub fn stashed(&self) -> Option<&DisplayTree> {
        self.stash.as_ref()
    }

    pub fn is_stashed(&self) -> bool {
        self.stash.is_some()
    }

    /// Reconcile a completed run's publications.
    pub fn apply(
        &mut self,
        publications: &[PublicationEntry],
        kernel: &dyn Kernel,
        viewer: &mut dyn Viewer,
    ) -> Result<DisplayDelta, ReconcileError> {
        if self.is_stashed() {
            return Err(ReconcileError::Stashed);
        }
        Ok(reconcile::apply(
            &mut self.tree,
            publications,
            &self.options,
            kernel,
            viewer,
        ))
    }

    /// Append or replace one entry without clearing (console publications).
    pub fn add_object(
        &mut self,
        publication: &PublicationEntry,
        kernel: &dyn Kernel,
        viewer: &mut dyn Viewer,
    ) -> Result<DisplayDelta, ReconcileError> {
        if self.is_stashed() {
            return Err(ReconcileError::Stashed);
        }
        Ok(reconcile::add_one(
            &mut self.tree,
            publication,
            &self.options,
            kernel,
            viewer,
        ))
    }

    /// Show the shapes of a debug pause, replacing the previous pause's.
    pub fn show_ephemeral(
        &mut self,
        publications: &[PublicationEntry],
        kernel: &dyn Kernel,
        viewer: &mut dyn Viewer,
    ) -> DisplayDelta {
        reconcile::replace_ephemeral(&mut self.ephemeral, publications, kernel, viewer)
    }

    pub fn clear_ephemeral(&mut self, viewer: &mut dyn Viewer) -> DisplayDelta {
        let removed = self
            .ephemeral
            .drain(viewer)
            .into_iter()
            .map(|e| e.name)
            .collect();
        DisplayDelta {
            removed,
            ..Default::default()
        }
    }

    /// Move the whole persistent tree aside for a debug session.
    pub fn stash(&mut self, viewer: &mut dyn Viewer) -> Result<DisplayDelta, ReconcileError> {
        if self.is_stashed() {
            return Err(ReconcileError::AlreadyStashed);
        }
        let entries = self.tree.drain(viewer);
        let removed = entries.iter().map(|e| e.name.clone()).collect();
        let stash = DisplayTree::hidden(entries);
        info!(entries = stash.len(), "display tree stashed");
        self.stash = Some(stash);
        Ok(DisplayDelta {
            removed,
            ..Default::default()
        })
    }

    /// Drop the ephemeral set and put the stashed tree back verbatim.
    pub fn unstash(&mut self, viewer: &mut dyn Viewer) -> Result<DisplayDelta, ReconcileError> {
        let stash = self.stash.take().ok_or(ReconcileError::NothingStashed)?;
        let mut delta = self.clear_ephemeral(viewer);
        delta.removed.extend(self.tree.drain(viewer).into_iter().map(|e| e.name));

        let entries = stash.into_entries();
        delta.added = entries.iter().map(|e| e.name.clone()).collect();
        self.tree.restore(entries, viewer);
        info!(entries = self.tree.len(), "display tree restored");
        Ok(delta)
    }

    pub fn set_visible(
        &mut self,
        name: &str,
        visible: bool,
        viewer: &mut dyn Viewer,
    ) -> Result<(), ReconcileError> {
        let entry = self.tree.get_mut(name)?;
        if entry.visible == visible {
            return Ok(());
        }
        entry.visible = visible;
        if visible {
            viewer.display(&entry.renderable());
        } else {
            viewer.remove(entry.renderable);
        }
        debug!(name, visible, "visibility changed");
        Ok(())
    }

    pub fn set_color(
        &mut self,
        name: &str,
        color: Rgba,
        viewer: &mut dyn Viewer,
    ) -> Result<(), ReconcileError> {
        let entry = self.tree.get_mut(name)?;
        entry.color = color.opaque();
        if entry.visible {
            viewer.redisplay(&entry.renderable());
        }
        Ok(())
    }

    pub fn set_alpha(
        &mut self,
        name: &str,
        transparency: f64,
        viewer: &mut dyn Viewer,
    ) -> Result<(), ReconcileError> {
        if !(0.0..=1.0).contains(&transparency) {
            return Err(ReconcileError::InvalidTransparency {
                value: transparency,
            });
        }
        let entry = self.tree.get_mut(name)?;
        entry.transparency = transparency;
        if entry.visible {
            viewer.redisplay(&entry.renderable());
        }
        Ok(())
    }

    pub fn rename(
        &mut self,
        old: &str,
        new: &str,
        viewer: &mut dyn Viewer,
    ) -> Result<DisplayDelta, ReconcileError> {
        let entry = self.tree.rename(old, new)?;
        if old == new {
            return Ok(DisplayDelta::default());
        }
        if entry.visible {
            viewer.redisplay(&entry.renderable());
        }
        Ok(DisplayDelta {
            added: vec![new.to_string()],
            removed: vec![old.to_string()],
            fit_view: false,
        })
    }

    /// Remove the named entries. Nothing is removed if any name is unknown.
    pub fn remove(
        &mut self,
        names: &[String],
        viewer: &mut dyn Viewer,
    ) -> Result<DisplayDelta, ReconcileError> {
        if let Some(missing) = names.iter().find(|n| !self.tree.contains(n)) {
            return Err(ReconcileError::EntryNotFound {
                name: missing.clone(),
            });
        }
        let removed = names
            .iter()
            .filter_map(|name| self.tree.take(name, viewer))
            .map(|e| e.name)
            .collect();
        Ok(DisplayDelta {
            removed,
            ..Default::default()
        })
    }

    pub fn clear(&mut self, viewer: &mut dyn Viewer) -> DisplayDelta {
        let removed = self.tree.drain(viewer).into_iter().map(|e| e.name).collect();
        DisplayDelta {
            removed,
            ..Default::default()
        }
    }
}
