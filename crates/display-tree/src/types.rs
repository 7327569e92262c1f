use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cad_types::{PublicationEntry, Rgba, Shape};

/// What the viewer is asked to draw for one display entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renderable {
    /// Stable for the lifetime of the owning display entry.
    pub id: Uuid,
    pub name: String,
    pub shape: Shape,
    pub color: Rgba,
    /// 0 is opaque, 1 is invisible.
    pub transparency: f64,
    pub size: Option<f64>,
}

/// One node of the persistent model tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEntry {
    pub name: String,
    pub shape: Shape,
    /// Id of the renderable backing this entry, 1:1.
    pub renderable: Uuid,
    pub visible: bool,
    pub color: Rgba,
    pub transparency: f64,
    pub size: Option<f64>,
}

impl DisplayEntry {
    /// A fresh entry for `publication`, with defaults for unset options.
    pub fn from_publication(publication: &PublicationEntry) -> Self {
        let options = &publication.options;
        Self {
            name: publication.name.clone(),
            shape: publication.shape,
            renderable: Uuid::new_v4(),
            visible: true,
            color: options.color.unwrap_or_else(Rgba::default_face),
            transparency: options.alpha.unwrap_or(0.0),
            size: options.size,
        }
    }

    /// Take over the user-editable properties of a prior same-named entry.
    pub fn inherit(&mut self, prior: &DisplayEntry) {
        self.visible = prior.visible;
        self.color = prior.color;
        self.transparency = prior.transparency;
    }

    pub fn renderable(&self) -> Renderable {
        Renderable {
            id: self.renderable,
            name: self.name.clone(),
            shape: self.shape,
            color: self.color,
            transparency: self.transparency,
            size: self.size,
        }
    }
}

/// Net change to the persistent tree made by one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayDelta {
    /// Names created or replaced, in application order.
    pub added: Vec<String>,
    /// Names no longer present.
    pub removed: Vec<String>,
    /// Whether the viewer was asked to fit the camera.
    pub fit_view: bool,
}

impl DisplayDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.fit_view
    }
}

/// How a completed run's publications are merged into the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    /// Carry visibility, colour and transparency forward by name.
    pub preserve_properties: bool,
    /// Drop entries the new run did not publish. Only consulted when
    /// properties are preserved; otherwise the tree is always cleared.
    pub clear_before_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            preserve_properties: false,
            clear_before_run: true,
        }
    }
}

impl ReconcileOptions {
    pub fn clears_tree(&self) -> bool {
        !self.preserve_properties || self.clear_before_run
    }
}

/// Errors from display-tree edits.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReconcileError {
    #[error("no display entry named '{name}'")]
    EntryNotFound { name: String },

    #[error("a display entry named '{name}' already exists")]
    NameTaken { name: String },

    #[error("transparency must be within 0..=1, got {value}")]
    InvalidTransparency { value: f64 },

    #[error("the display tree is already stashed")]
    AlreadyStashed,

    #[error("no stashed display tree to restore")]
    NothingStashed,

    #[error("the display tree is stashed while a debug session runs")]
    Stashed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_types::{DisplayOptions, ShapeHandle, ShapeKind};

    fn publication(options: DisplayOptions) -> PublicationEntry {
        PublicationEntry {
            name: "part".to_string(),
            shape: Shape::new(ShapeHandle(1), ShapeKind::Solid),
            options,
        }
    }

    #[test]
    fn defaults_fill_unset_options() {
        let entry = DisplayEntry::from_publication(&publication(DisplayOptions::default()));
        assert!(entry.visible);
        assert_eq!(entry.color, Rgba::default_face());
        assert_eq!(entry.transparency, 0.0);
    }

    #[test]
    fn inherit_keeps_the_new_payload() {
        let mut prior = DisplayEntry::from_publication(&publication(DisplayOptions::default()));
        prior.visible = false;
        prior.transparency = 0.5;

        let mut next = DisplayEntry::from_publication(&publication(DisplayOptions::flagged()));
        next.shape = Shape::new(ShapeHandle(9), ShapeKind::Solid);
        next.inherit(&prior);

        assert!(!next.visible);
        assert_eq!(next.transparency, 0.5);
        assert_eq!(next.color, prior.color);
        assert_eq!(next.shape.handle, ShapeHandle(9));
        assert_ne!(next.renderable, prior.renderable);
    }

    #[test]
    fn clearing_rule() {
        let plain = ReconcileOptions::default();
        assert!(plain.clears_tree());
        let keep_all = ReconcileOptions {
            preserve_properties: true,
            clear_before_run: false,
        };
        assert!(!keep_all.clears_tree());
        let json = serde_json::to_string(&keep_all).unwrap();
        let back: ReconcileOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, keep_all);
    }
}
