pub mod color;
pub mod publication;
pub mod shape;
pub mod trace;
pub mod variables;

pub use color::*;
pub use publication::*;
pub use shape::*;
pub use trace::*;
pub use variables::*;
