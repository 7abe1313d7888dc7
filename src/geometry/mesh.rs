// The reference `GeometryAdapter` implementation: a flat triangle soup
// spanning any number of registered meshes — indices into a shared vertex
// buffer, `Triangle { indices: [u32; 3] }`. Positions are the only
// attribute the tree itself needs to build and query; per-vertex normals
// are kept, unpacked, purely so a hit result can carry a shading-ready
// surface normal, not because the core cares about them.

use crate::error::{BuildError, Result};
use crate::geometry::triangle;
use crate::geometry::{GeometryAdapter, Hit};
use crate::math::bbox::BBox3;
use crate::math::ray::Ray;
use crate::math::vector::Vec3;

#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub indices: [u32; 3],
}

/// A single registered mesh's view into the soup's flat vertex/triangle
/// arrays.
#[derive(Clone, Copy, Debug)]
struct MeshRange {
    vertex_start: u32,
    tri_start: u32,
    tri_count: u32,
}

/// A flat triangle soup spanning any number of meshes, registered with
/// [`TriangleSoup::add_mesh`] before the tree is built. Implements
/// [`GeometryAdapter`] by treating every registered mesh's triangles as one
/// global, densely-indexed primitive array; `prim_to_local` maps a global
/// index back to its owning mesh via the monotonic offset table.
#[derive(Clone, Debug, Default)]
pub struct TriangleSoup {
    positions: Vec<Vec3<f64>>,
    normals: Vec<Option<Vec3<f64>>>,
    tris: Vec<Triangle>,
    meshes: Vec<MeshRange>,
}

impl TriangleSoup {
    pub fn new() -> Self {
        TriangleSoup::default()
    }

    /// Registers a mesh's positions (and optional per-vertex normals) and
    /// triangle indices (local to this mesh's own vertex list), returning
    /// the mesh's id. Must be called before the soup is handed to a
    /// `KdTree::build`; the tree does not support incremental updates.
    pub fn add_mesh(
        &mut self,
        positions: Vec<Vec3<f64>>,
        normals: Option<Vec<Vec3<f64>>>,
        tris: Vec<Triangle>,
    ) -> u32 {
        let vertex_start = self.positions.len() as u32;
        let tri_start = self.tris.len() as u32;
        let tri_count = tris.len() as u32;

        match normals {
            Some(n) => {
                debug_assert_eq!(n.len(), positions.len());
                self.normals.extend(n.into_iter().map(Some));
            }
            None => self.normals.extend(std::iter::repeat(None).take(positions.len())),
        }
        self.positions.extend(positions);
        // Triangle indices are local to the mesh's own vertex list; shift
        // them into the soup's global vertex array.
        self.tris.extend(tris.into_iter().map(|t| Triangle {
            indices: [
                t.indices[0] + vertex_start,
                t.indices[1] + vertex_start,
                t.indices[2] + vertex_start,
            ],
        }));

        self.meshes.push(MeshRange {
            vertex_start,
            tri_start,
            tri_count,
        });
        (self.meshes.len() - 1) as u32
    }

    fn mesh_for(&self, prim: u32) -> &MeshRange {
        // Meshes are appended in order and each spans a contiguous run of
        // global triangle indices, so a linear scan from the back finds the
        // owner in practice in O(1); binary search isn't worth it for the
        // handful of meshes a scene typically registers.
        self.meshes
            .iter()
            .rev()
            .find(|m| prim >= m.tri_start)
            .expect("primitive index out of range")
    }

    /// Maps a global primitive index back to the id of the mesh that
    /// registered it (the mesh's position in registration order).
    pub fn owning_mesh(&self, prim: u32) -> u32 {
        let tri_start = self.mesh_for(prim).tri_start;
        self.meshes
            .iter()
            .position(|m| m.tri_start == tri_start)
            .unwrap() as u32
    }

    /// Number of triangles registered under mesh `mesh_id`.
    pub fn mesh_triangle_count(&self, mesh_id: u32) -> u32 {
        self.meshes[mesh_id as usize].tri_count
    }

    fn triangle_vertices(&self, prim: u32) -> (Vec3<f64>, Vec3<f64>, Vec3<f64>) {
        let tri = self.tris[prim as usize];
        (
            self.positions[tri.indices[0] as usize],
            self.positions[tri.indices[1] as usize],
            self.positions[tri.indices[2] as usize],
        )
    }

    /// Geometric (unnormalized face) normal, used when a vertex doesn't
    /// carry its own.
    fn face_normal(v0: Vec3<f64>, v1: Vec3<f64>, v2: Vec3<f64>) -> Vec3<f64> {
        (v1 - v0).cross(v2 - v0)
    }

    /// Interpolates the shading normal at barycentric `(u, v)` on `prim`,
    /// falling back to the flat face normal for vertices with none.
    pub fn shading_normal(&self, prim: u32, u: f64, v: f64) -> Vec3<f64> {
        let tri = self.tris[prim as usize];
        let (v0, v1, v2) = self.triangle_vertices(prim);
        let face = Self::face_normal(v0, v1, v2).normalize();

        let n0 = self.normals[tri.indices[0] as usize].unwrap_or(face);
        let n1 = self.normals[tri.indices[1] as usize].unwrap_or(face);
        let n2 = self.normals[tri.indices[2] as usize].unwrap_or(face);

        let w = 1. - u - v;
        (n0.scale(w) + n1.scale(u) + n2.scale(v)).normalize()
    }

    /// Validates every registered mesh's bounding boxes are finite and
    /// non-inverted, per the adapter's `IntegrityError` contract.
    pub fn validate(&self) -> Result<()> {
        for prim in 0..self.tris.len() as u32 {
            let b = self.bounding_box(prim);
            let d = b.diagonal();
            if !(d.x.is_finite() && d.y.is_finite() && d.z.is_finite())
                || d.x < 0.
                || d.y < 0.
                || d.z < 0.
            {
                return Err(BuildError::IntegrityError(format!(
                    "primitive {} has an invalid bounding box",
                    prim
                )));
            }
        }
        Ok(())
    }
}

impl GeometryAdapter for TriangleSoup {
    fn primitive_count(&self) -> u32 {
        self.tris.len() as u32
    }

    fn bounding_box(&self, prim: u32) -> BBox3<f64> {
        let (v0, v1, v2) = self.triangle_vertices(prim);
        BBox3::from_pnt(v0).combine_pnt(v1).combine_pnt(v2)
    }

    fn clipped_bounding_box(&self, prim: u32, clip: BBox3<f64>) -> BBox3<f64> {
        let (v0, v1, v2) = self.triangle_vertices(prim);
        triangle::clip_to_box(v0, v1, v2, clip)
    }

    fn intersect(&self, prim: u32, ray: Ray) -> Option<Hit> {
        let (v0, v1, v2) = self.triangle_vertices(prim);
        triangle::intersect(v0, v1, v2, ray).map(|(t, u, v)| Hit { t, u, v })
    }

    fn intersect_shadow(&self, prim: u32, ray: Ray) -> bool {
        let (v0, v1, v2) = self.triangle_vertices(prim);
        triangle::intersect(v0, v1, v2, ray).is_some()
    }
}
