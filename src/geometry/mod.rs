//! The seam between the kd-tree core and whatever owns the actual geometry:
//! a single trait the builder and traverser are generic over, so there is no
//! virtual dispatch on the hot path. Covers exactly what the builder and
//! traverser need: counts, bounding boxes (plain and clipped), and
//! intersection. No motion-blur time parameter and no precomputed per-ray
//! intersection state; the tree only ever needs a primitive index and a ray.

pub mod mesh;
pub mod triangle;

use crate::math::bbox::BBox3;
use crate::math::ray::Ray;

/// Result of a detailed ray/primitive intersection.
#[derive(Clone, Copy, Debug)]
pub struct Hit {
    pub t: f64,
    pub u: f64,
    pub v: f64,
}

/// Supplies the kd-tree builder and traverser with everything they need to
/// know about a flat array of primitives, without knowing what a primitive
/// actually is.
pub trait GeometryAdapter {
    fn primitive_count(&self) -> u32;

    fn bounding_box(&self, prim: u32) -> BBox3<f64>;

    /// The primitive's bounding box intersected with `clip`, computed by
    /// clipping the primitive's own geometry (not just its bbox) against
    /// `clip`'s six planes. Returns an empty box (see `BBox3::is_empty`) if
    /// the primitive doesn't intersect `clip` at all.
    fn clipped_bounding_box(&self, prim: u32, clip: BBox3<f64>) -> BBox3<f64>;

    /// Full intersection test, with barycentrics on a hit.
    fn intersect(&self, prim: u32, ray: Ray) -> Option<Hit>;

    /// Shadow-ray fast path: whether the primitive is hit at all, skipping
    /// barycentric recovery.
    fn intersect_shadow(&self, prim: u32, ray: Ray) -> bool;
}
