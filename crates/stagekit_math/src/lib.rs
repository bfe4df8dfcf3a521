// Re-export glam for convenience
pub use glam::*;

// Stagekit math types
mod aabb;
mod interval;
mod transform;

pub use aabb::Aabb;
pub use interval::Interval;
pub use transform::DMat4Ext;
