//! MockKernel — deterministic test double implementing Kernel.
//!
//! Every shape is tracked as axis-aligned bounds plus a volume. Booleans are
//! approximated on the bounds, which is enough to make emptiness and
//! identity predictable for engine tests.

use std::collections::HashMap;
use std::f64::consts::PI;

use tracing::debug;

use crate::traits::Kernel;
use crate::types::*;

/// Volumes at or below this are treated as degenerate.
const EMPTY_VOLUME: f64 = 1e-12;

/// A synthetic shape with known bounds.
#[derive(Debug, Clone)]
struct MockShape {
    kind: ShapeKind,
    bounds: Bounds,
    volume: f64,
    /// Non-empty members, for compounds.
    parts: usize,
}

impl MockShape {
    fn is_empty(&self) -> bool {
        match self.kind {
            ShapeKind::Vertex => false,
            ShapeKind::Compound => self.parts == 0,
            _ => self.volume <= EMPTY_VOLUME,
        }
    }
}

/// Deterministic test double for the geometry kernel.
pub struct MockKernel {
    next_handle: u64,
    shapes: HashMap<u64, MockShape>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            shapes: HashMap::new(),
        }
    }

    /// Number of shapes created so far.
    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    fn insert(&mut self, shape: MockShape) -> Shape {
        let handle = ShapeHandle(self.next_handle);
        self.next_handle += 1;
        let kind = shape.kind;
        debug!(%handle, ?kind, volume = shape.volume, "mock shape created");
        self.shapes.insert(handle.0, shape);
        Shape::new(handle, kind)
    }

    fn get(&self, shape: &Shape) -> Result<&MockShape, KernelError> {
        self.shapes
            .get(&shape.handle.0)
            .ok_or(KernelError::ShapeNotFound {
                handle: shape.handle,
            })
    }

    fn solid(&mut self, bounds: Bounds, volume: f64) -> Shape {
        self.insert(MockShape {
            kind: ShapeKind::Solid,
            bounds,
            volume,
            parts: 1,
        })
    }
}

impl Default for MockKernel {
    fn default() -> Self {
        Self::new()
    }
}

fn non_negative(name: &str, value: f64) -> Result<f64, KernelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(KernelError::InvalidParameter {
            name: name.to_string(),
            reason: format!("must be a non-negative number, got {value}"),
        })
    }
}

impl Kernel for MockKernel {
    fn make_box(&mut self, w: f64, h: f64, d: f64) -> Result<Shape, KernelError> {
        let (w, h, d) = (
            non_negative("width", w)?,
            non_negative("height", h)?,
            non_negative("depth", d)?,
        );
        Ok(self.solid(Bounds::new([0.0; 3], [w, h, d]), w * h * d))
    }

    fn make_cylinder(&mut self, radius: f64, height: f64) -> Result<Shape, KernelError> {
        let r = non_negative("radius", radius)?;
        let h = non_negative("height", height)?;
        Ok(self.solid(Bounds::new([-r, -r, 0.0], [r, r, h]), PI * r * r * h))
    }

    fn make_sphere(&mut self, radius: f64) -> Result<Shape, KernelError> {
        let r = non_negative("radius", radius)?;
        Ok(self.solid(
            Bounds::new([-r, -r, -r], [r, r, r]),
            4.0 / 3.0 * PI * r * r * r,
        ))
    }

    fn make_point(&mut self, at: [f64; 3]) -> Result<Shape, KernelError> {
        Ok(self.insert(MockShape {
            kind: ShapeKind::Vertex,
            bounds: Bounds::new(at, at),
            volume: 0.0,
            parts: 1,
        }))
    }

    fn make_compound(&mut self, parts: &[Shape]) -> Result<Shape, KernelError> {
        let mut bounds: Option<Bounds> = None;
        let mut volume = 0.0;
        let mut non_empty = 0;
        for part in parts {
            let s = self.get(part)?;
            if s.is_empty() {
                continue;
            }
            non_empty += 1;
            volume += s.volume;
            bounds = Some(match bounds {
                Some(b) => b.union(&s.bounds),
                None => s.bounds,
            });
        }
        Ok(self.insert(MockShape {
            kind: ShapeKind::Compound,
            bounds: bounds.unwrap_or(Bounds::new([0.0; 3], [0.0; 3])),
            volume,
            parts: non_empty,
        }))
    }

    fn boolean(&mut self, a: &Shape, b: &Shape, op: BooleanOp) -> Result<Shape, KernelError> {
        let sa = self.get(a)?.clone();
        let sb = self.get(b)?.clone();
        if sa.kind == ShapeKind::Vertex || sb.kind == ShapeKind::Vertex {
            return Err(KernelError::BooleanFailed {
                reason: "boolean operands must be solids or compounds".to_string(),
            });
        }

        let overlap = sa.bounds.intersection(&sb.bounds);
        let overlap_volume = overlap
            .map(|o| o.volume())
            .unwrap_or(0.0)
            .min(sa.volume)
            .min(sb.volume);

        let (bounds, volume) = match op {
            BooleanOp::Union => (
                sa.bounds.union(&sb.bounds),
                sa.volume + sb.volume - overlap_volume,
            ),
            BooleanOp::Cut => {
                if sb.bounds.contains(&sa.bounds) {
                    (sa.bounds, 0.0)
                } else {
                    (sa.bounds, (sa.volume - overlap_volume).max(0.0))
                }
            }
            BooleanOp::Intersect => match overlap {
                Some(o) => (o, overlap_volume),
                None => (Bounds::new([0.0; 3], [0.0; 3]), 0.0),
            },
        };
        Ok(self.solid(bounds, volume))
    }

    fn translate(&mut self, shape: &Shape, offset: [f64; 3]) -> Result<Shape, KernelError> {
        let mut moved = self.get(shape)?.clone();
        moved.bounds = moved.bounds.translated(offset);
        Ok(self.insert(moved))
    }

    fn is_empty(&self, shape: &Shape) -> bool {
        self.get(shape).map(|s| s.is_empty()).unwrap_or(true)
    }

    fn bounds(&self, shape: &Shape) -> Option<Bounds> {
        self.get(shape).ok().map(|s| s.bounds)
    }

    fn describe(&self, shape: &Shape) -> String {
        match self.get(shape) {
            Ok(s) if s.is_empty() => format!("<{} (empty) {}>", s.kind.name(), shape.handle),
            Ok(s) => format!(
                "<{} {} volume={:.3}>",
                s.kind.name(),
                shape.handle,
                s.volume
            ),
            Err(_) => format!("<unknown shape {}>", shape.handle),
        }
    }
}
