use uuid::Uuid;

use crate::types::Renderable;

/// The 3-D viewer collaborator. Calls arrive in the order the tree changes.
pub trait Viewer {
    /// Start drawing a renderable.
    fn display(&mut self, renderable: &Renderable);

    /// Stop drawing the renderable with this id.
    fn remove(&mut self, id: Uuid);

    /// Properties of a displayed renderable changed; its id did not.
    fn redisplay(&mut self, renderable: &Renderable);

    /// Fit the camera to everything displayed.
    fn auto_fit(&mut self);
}
