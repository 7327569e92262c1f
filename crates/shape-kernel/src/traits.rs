use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::*;

/// Core geometry kernel trait. Provides the shape construction operations
/// scripts can call and the queries the display tree needs.
/// Implemented by MockKernel (deterministic test double); hosts plug in a
/// real kernel behind the same seam.
pub trait Kernel: Send {
    /// Axis-aligned box with one corner at the origin, extending to (w,h,d).
    fn make_box(&mut self, w: f64, h: f64, d: f64) -> Result<Shape, KernelError>;

    /// Cylinder with its base centred at the origin, extending along +Z.
    fn make_cylinder(&mut self, radius: f64, height: f64) -> Result<Shape, KernelError>;

    /// Sphere centred at the origin.
    fn make_sphere(&mut self, radius: f64) -> Result<Shape, KernelError>;

    /// A single vertex.
    fn make_point(&mut self, at: [f64; 3]) -> Result<Shape, KernelError>;

    /// Group shapes into one compound.
    fn make_compound(&mut self, parts: &[Shape]) -> Result<Shape, KernelError>;

    /// Boolean combination of two shapes.
    fn boolean(&mut self, a: &Shape, b: &Shape, op: BooleanOp) -> Result<Shape, KernelError>;

    /// A translated copy of a shape.
    fn translate(&mut self, shape: &Shape, offset: [f64; 3]) -> Result<Shape, KernelError>;

    /// Whether the shape has no geometric content (null, zero volume, no parts).
    fn is_empty(&self, shape: &Shape) -> bool;

    /// Axis-aligned bounds, if the shape is known.
    fn bounds(&self, shape: &Shape) -> Option<Bounds>;

    /// Short human-readable description for the Variables pane.
    fn describe(&self, shape: &Shape) -> String;
}

/// A kernel shared between the controller and the script worker.
pub type SharedKernel = Arc<Mutex<dyn Kernel>>;

/// Wrap a kernel for sharing.
pub fn shared(kernel: impl Kernel + 'static) -> SharedKernel {
    Arc::new(Mutex::new(kernel))
}
