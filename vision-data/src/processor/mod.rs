//! Data preprocessing building blocks.

pub mod color_jitter;
pub mod geometry;
pub mod rand_augment;
pub mod random_erasing;
pub mod transform;

pub use color_jitter::*;
pub use geometry::*;
pub use rand_augment::*;
pub use random_erasing::*;
pub use transform::*;
