use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::{DisplayEntry, ReconcileError};
use crate::viewer::Viewer;

/// Ordered, name-unique set of display entries.
///
/// Every mutation keeps the viewer in step: a visible entry is displayed
/// exactly while it is in the tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayTree {
    entries: IndexMap<String, DisplayEntry>,
}

impl DisplayTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DisplayEntry> {
        self.entries.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &DisplayEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Result<&mut DisplayEntry, ReconcileError> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| ReconcileError::EntryNotFound {
                name: name.to_string(),
            })
    }

    /// Insert `entry`, replacing a same-named entry in place. The replaced
    /// entry's renderable is released before the new one is displayed.
    pub(crate) fn put(&mut self, entry: DisplayEntry, viewer: &mut dyn Viewer) -> Option<DisplayEntry> {
        if let Some(old) = self.entries.get(&entry.name) {
            release(old, viewer);
        }
        if entry.visible {
            viewer.display(&entry.renderable());
        }
        self.entries.insert(entry.name.clone(), entry)
    }

    pub(crate) fn take(&mut self, name: &str, viewer: &mut dyn Viewer) -> Option<DisplayEntry> {
        let entry = self.entries.shift_remove(name)?;
        release(&entry, viewer);
        Some(entry)
    }

    /// Remove everything, releasing renderables in tree order.
    pub(crate) fn drain(&mut self, viewer: &mut dyn Viewer) -> Vec<DisplayEntry> {
        let entries: Vec<DisplayEntry> = std::mem::take(&mut self.entries).into_values().collect();
        for entry in &entries {
            release(entry, viewer);
        }
        entries
    }

    /// Re-insert previously drained entries verbatim, ids included.
    pub(crate) fn restore(&mut self, entries: Vec<DisplayEntry>, viewer: &mut dyn Viewer) {
        for entry in entries {
            self.put(entry, viewer);
        }
    }

    /// Build a tree that holds `entries` without showing them.
    pub(crate) fn hidden(entries: Vec<DisplayEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        }
    }

    pub(crate) fn into_entries(self) -> Vec<DisplayEntry> {
        self.entries.into_values().collect()
    }

    /// Change the key of an entry without moving it.
    pub(crate) fn rename(&mut self, old: &str, new: &str) -> Result<&DisplayEntry, ReconcileError> {
        if !self.entries.contains_key(old) {
            return Err(ReconcileError::EntryNotFound {
                name: old.to_string(),
            });
        }
        if old != new && self.entries.contains_key(new) {
            return Err(ReconcileError::NameTaken {
                name: new.to_string(),
            });
        }
        self.entries = std::mem::take(&mut self.entries)
            .into_iter()
            .map(|(name, mut entry)| {
                if name == old {
                    entry.name = new.to_string();
                    (new.to_string(), entry)
                } else {
                    (name, entry)
                }
            })
            .collect();
        self.get_mut(new).map(|entry| &*entry)
    }
}

fn release(entry: &DisplayEntry, viewer: &mut dyn Viewer) {
    if entry.visible {
        viewer.remove(entry.renderable);
    }
}
