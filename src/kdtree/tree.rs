// The public kd-tree handle tying the builder and traverser together: a
// handle that owns the packed node array and refuses to be queried before
// `build()` has run, splitting construction from query the way a BVH's own
// `new`/`intersect` pair does.

use crate::error::{BuildError, Result};
use crate::geometry::GeometryAdapter;
use crate::kdtree::builder::{self, BuildOutput, BuildParams, BuildStats};
use crate::kdtree::traverse::{self, DetailedHit};
use crate::math::bbox::BBox3;
use crate::math::ray::Ray;

/// A kd-tree over some `G: GeometryAdapter`'s primitives. Built once via
/// [`KdTree::build`], then queried any number of times from any number of
/// threads (`ray_intersect` takes `&self`).
pub struct KdTree<G: GeometryAdapter> {
    adapter: G,
    output: Option<BuildOutput>,
}

impl<G: GeometryAdapter + Sync> KdTree<G> {
    /// Wraps a geometry adapter. Call [`KdTree::build`] before querying.
    pub fn new(adapter: G) -> Self {
        KdTree { adapter, output: None }
    }

    /// Builds the acceleration structure. Can only be called once; a second
    /// call is a configuration error rather than a silent rebuild, since the
    /// adapter's primitives are assumed fixed once the tree has committed to
    /// an index layout over them.
    pub fn build(&mut self, params: &BuildParams) -> Result<()> {
        if self.output.is_some() {
            return Err(BuildError::ConfigurationError(
                "KdTree::build called more than once".to_string(),
            ));
        }
        self.output = Some(builder::build(&self.adapter, params)?);
        Ok(())
    }

    fn output(&self) -> &BuildOutput {
        self.output.as_ref().expect("KdTree::build was not called before use")
    }

    /// Finds the closest hit along `ray`, or `None` if the ray misses every
    /// primitive.
    pub fn ray_intersect(&self, ray: Ray) -> Option<DetailedHit> {
        let out = self.output();
        traverse::intersect(&self.adapter, &out.store, &out.prim_indices, out.root_box, ray, false)
    }

    /// Whether `ray` hits anything at all, skipping barycentric recovery on
    /// the hit. Cheaper than `ray_intersect` for shadow/occlusion queries.
    pub fn occluded(&self, ray: Ray) -> bool {
        let out = self.output();
        traverse::intersect(&self.adapter, &out.store, &out.prim_indices, out.root_box, ray, true).is_some()
    }

    /// The tree's root bounding box, enlarged by the construction epsilon.
    /// Empty (per [`BBox3::is_empty`]) if the adapter had no primitives.
    pub fn bounding_box(&self) -> BBox3<f64> {
        self.output().root_box
    }

    pub fn primitive_count(&self) -> u32 {
        self.adapter.primitive_count()
    }

    pub fn stats(&self) -> &BuildStats {
        &self.output().stats
    }

    /// Access to the wrapped adapter, e.g. to recover shading data for a hit.
    pub fn adapter(&self) -> &G {
        &self.adapter
    }
}
