use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle to a shape owned by the geometry kernel.
/// NEVER persisted. Valid only for the kernel instance that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeHandle(pub u64);

impl fmt::Display for ShapeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// The geometric container type of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShapeKind {
    Vertex,
    Edge,
    Face,
    Solid,
    Compound,
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Vertex => "Vertex",
            ShapeKind::Edge => "Edge",
            ShapeKind::Face => "Face",
            ShapeKind::Solid => "Solid",
            ShapeKind::Compound => "Compound",
        }
    }
}

/// A reference to kernel geometry as seen by scripts and the display tree.
///
/// Plain data: it can cross from the script worker to the controller without
/// dragging any interpreter state along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    pub handle: ShapeHandle,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(handle: ShapeHandle, kind: ShapeKind) -> Self {
        Self { handle, kind }
    }
}

/// The set of shape kinds that implicit discovery treats as results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublishableKinds(BTreeSet<ShapeKind>);

impl PublishableKinds {
    pub fn new(kinds: impl IntoIterator<Item = ShapeKind>) -> Self {
        Self(kinds.into_iter().collect())
    }

    pub fn contains(&self, kind: ShapeKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = ShapeKind> + '_ {
        self.0.iter().copied()
    }
}

impl Default for PublishableKinds {
    /// Solids and compounds: the kernel's container types.
    fn default() -> Self {
        Self::new([ShapeKind::Solid, ShapeKind::Compound])
    }
}
