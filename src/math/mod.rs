//! Minimal vector/bounding-box/ray math shared by the geometry adapter and the
//! kd-tree builder/traverser: no matrices, quaternions, or transforms, since
//! those belong to a camera/scene-graph layer this crate doesn't have.

pub mod bbox;
pub mod numbers;
pub mod ray;
pub mod util;
pub mod vector;

pub use bbox::BBox3;
pub use ray::Ray;
pub use vector::Vec3;
