//! Merging a run's publications into a display tree.

use indexmap::IndexMap;
use tracing::debug;

use cad_types::PublicationEntry;
use shape_kernel::Kernel;

use crate::tree::DisplayTree;
use crate::types::{DisplayDelta, DisplayEntry, ReconcileOptions};
use crate::viewer::Viewer;

/// Apply a completed run's publications to `tree`.
///
/// Empty shapes are never materialised. The camera is fitted only when an
/// empty tree gets its first entries.
pub(crate) fn apply(
    tree: &mut DisplayTree,
    publications: &[PublicationEntry],
    options: &ReconcileOptions,
    kernel: &dyn Kernel,
    viewer: &mut dyn Viewer,
) -> DisplayDelta {
    let before = tree.names();
    let was_empty = tree.is_empty();

    let prior: IndexMap<String, DisplayEntry> = if options.clears_tree() {
        tree.drain(viewer)
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect()
    } else {
        IndexMap::new()
    };

    let mut added = Vec::new();
    for publication in publications {
        if kernel.is_empty(&publication.shape) {
            debug!(name = %publication.name, "skipping empty publication");
            continue;
        }
        let mut entry = DisplayEntry::from_publication(publication);
        if options.preserve_properties {
            if let Some(old) = prior.get(&entry.name).or_else(|| tree.get(&entry.name)) {
                entry.inherit(old);
            }
        }
        added.push(entry.name.clone());
        tree.put(entry, viewer);
    }

    let fit_view = was_empty && !tree.is_empty();
    if fit_view {
        viewer.auto_fit();
    }
    let removed = before.into_iter().filter(|name| !tree.contains(name)).collect();
    debug!(added = added.len(), entries = tree.len(), fit_view, "publications applied");
    DisplayDelta {
        added,
        removed,
        fit_view,
    }
}

/// Add or replace a single entry without touching the rest of the tree.
pub(crate) fn add_one(
    tree: &mut DisplayTree,
    publication: &PublicationEntry,
    options: &ReconcileOptions,
    kernel: &dyn Kernel,
    viewer: &mut dyn Viewer,
) -> DisplayDelta {
    if kernel.is_empty(&publication.shape) {
        debug!(name = %publication.name, "skipping empty publication");
        return DisplayDelta::default();
    }
    let was_empty = tree.is_empty();
    let mut entry = DisplayEntry::from_publication(publication);
    if options.preserve_properties {
        if let Some(old) = tree.get(&entry.name) {
            entry.inherit(old);
        }
    }
    let name = entry.name.clone();
    tree.put(entry, viewer);

    let fit_view = was_empty;
    if fit_view {
        viewer.auto_fit();
    }
    DisplayDelta {
        added: vec![name],
        removed: Vec::new(),
        fit_view,
    }
}

/// Replace the ephemeral set wholesale.
pub(crate) fn replace_ephemeral(
    ephemeral: &mut DisplayTree,
    publications: &[PublicationEntry],
    kernel: &dyn Kernel,
    viewer: &mut dyn Viewer,
) -> DisplayDelta {
    let removed = ephemeral
        .drain(viewer)
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    let mut added = Vec::new();
    for publication in publications {
        if kernel.is_empty(&publication.shape) {
            continue;
        }
        let entry = DisplayEntry::from_publication(publication);
        added.push(entry.name.clone());
        ephemeral.put(entry, viewer);
    }
    DisplayDelta {
        added,
        removed,
        fit_view: false,
    }
}
