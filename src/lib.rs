//! A small physically-based ray tracer's spatial index: build a
//! surface-area-heuristic kd-tree over a triangle soup, then query it with
//! rays. Everything outside that — shading, cameras, image output — is out
//! of scope; this crate is the acceleration structure alone.

pub mod error;
pub mod geometry;
pub mod kdtree;
pub mod math;
pub mod memory;

pub use error::{BuildError, Result};
pub use geometry::{GeometryAdapter, Hit};
pub use kdtree::{BuildParams, KdTree};
pub use math::{BBox3, Ray, Vec3};
