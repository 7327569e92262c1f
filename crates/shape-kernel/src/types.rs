use serde::{Deserialize, Serialize};

// Re-export shared types from cad-types
pub use cad_types::{Shape, ShapeHandle, ShapeKind};

/// Boolean operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BooleanOp {
    Union,
    Cut,
    Intersect,
}

/// Axis-aligned bounds of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Bounds {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = out.min[i].min(other.min[i]);
            out.max[i] = out.max[i].max(other.max[i]);
        }
        out
    }

    /// Overlapping region, or None when the boxes are disjoint.
    pub fn intersection(&self, other: &Bounds) -> Option<Bounds> {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] = self.min[i].max(other.min[i]);
            out.max[i] = self.max[i].min(other.max[i]);
            if out.min[i] > out.max[i] {
                return None;
            }
        }
        Some(out)
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        (0..3).all(|i| self.min[i] <= other.min[i] && self.max[i] >= other.max[i])
    }

    pub fn volume(&self) -> f64 {
        (0..3).map(|i| (self.max[i] - self.min[i]).max(0.0)).product()
    }

    pub fn translated(&self, offset: [f64; 3]) -> Bounds {
        let mut out = *self;
        for i in 0..3 {
            out.min[i] += offset[i];
            out.max[i] += offset[i];
        }
        out
    }
}

/// Errors from kernel operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KernelError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("boolean operation failed: {reason}")]
    BooleanFailed { reason: String },

    #[error("shape not found: {handle}")]
    ShapeNotFound { handle: ShapeHandle },

    #[error("operation not supported: {operation}")]
    NotSupported { operation: String },
}
