// Stateless ray query over the packed node array. Unlike a BVH traversal,
// which pushes the far sibling's whole bounding box onto a stack and always
// re-tests it, a kd-tree's split plane means the traverser only ever needs
// to remember a *parametric interval* for the unvisited sibling, not its
// box, since the interval already says exactly which part of the ray still
// matters there.
//
// This is a stack-of-{node, interval} formulation of Havran's TA^B_rec
// rather than a literal transcription of its 13-case (N1-5/P1-5/Z1-3) case
// table: both reach the same traversal decision (visit near first, defer
// far with its clipped interval, prune deferred work once a closer hit is
// found), but the interval form needs only three comparisons per inner node
// instead of enumerating which of the thirteen cases applies. The one case
// kept explicit is Z1 (a ray origin exactly on the split plane), since its
// errata-corrected rule ("go right") isn't a limit of the general interval
// comparison — it has to be checked first or a parallel ray sitting exactly
// on the plane divides by a direction component of zero.

use crate::geometry::GeometryAdapter;
use crate::kdtree::node::NodeStore;
use crate::math::bbox::BBox3;
use crate::math::ray::Ray;

use arrayvec::ArrayVec;

const MAX_STACK: usize = 48;

#[derive(Clone, Copy)]
struct StackEntry {
    node: usize,
    tmin: f64,
    tmax: f64,
}

/// A detailed hit: which primitive, at what ray parameter, with barycentric
/// coordinates for shading.
#[derive(Clone, Copy, Debug)]
pub struct DetailedHit {
    pub prim: u32,
    pub t: f64,
    pub u: f64,
    pub v: f64,
}

/// Scales the minimum ray epsilon by the ray origin's magnitude, so
/// precision loss far from the coordinate origin doesn't let the traverser
/// accept a self-intersection just past a primitive's own surface.
fn scaled_tmin(ray: &Ray) -> f64 {
    let base = ray.tmin;
    let scale = ray.org.x.abs().max(ray.org.y.abs()).max(ray.org.z.abs());
    if scale > 1. {
        f64::max(base, base * scale)
    } else {
        base
    }
}

/// Finds the closest primitive hit along `ray`, or (in `shadow` mode) the
/// first primitive hit at all. `prim_indices` is the tree's flattened
/// primitive-index array; `root_box` is the (epsilon-enlarged) root bound.
pub fn intersect<G: GeometryAdapter>(
    adapter: &G,
    store: &NodeStore,
    prim_indices: &[u32],
    root_box: BBox3<f64>,
    ray: Ray,
    shadow: bool,
) -> Option<DetailedHit> {
    let (t0, t1) = root_box.intersect(ray, ray.tmax)?;
    let tmin0 = scaled_tmin(&ray).max(t0);
    if tmin0 > t1 {
        return None;
    }

    let mut stack: ArrayVec<[StackEntry; MAX_STACK]> = ArrayVec::new();
    let mut node_index = 1usize;
    let mut seg_tmin = tmin0;
    let mut seg_tmax = t1;
    let mut closest = ray.tmax;
    let mut best: Option<DetailedHit> = None;

    loop {
        let mut node = store.get(node_index);

        while !node.is_leaf() {
            let axis = node.axis() as usize;
            let split = node.split() as f64;

            let left_index = store.left_child(node_index, node);
            let right_index = left_index + 1;
            let origin_below = ray.org[axis] < split;
            let (near, far) = if origin_below {
                (left_index, right_index)
            } else {
                (right_index, left_index)
            };

            if ray.org[axis] == split {
                node_index = right_index;
            } else {
                let t_split = (split - ray.org[axis]) * ray.d_rcp[axis];
                // t_split <= 0 covers a ray whose origin is already past the
                // split along this axis: the crossing is behind it, not
                // ahead, regardless of where the current segment starts.
                if t_split >= seg_tmax || t_split <= 0. {
                    node_index = near;
                } else if t_split <= seg_tmin {
                    node_index = far;
                } else {
                    if stack.len() < MAX_STACK {
                        stack.push(StackEntry {
                            node: far,
                            tmin: t_split,
                            tmax: seg_tmax,
                        });
                    }
                    seg_tmax = t_split;
                    node_index = near;
                }
            }
            node = store.get(node_index);
        }

        let start = node.leaf_start();
        let end = node.leaf_end();
        for i in start..end {
            let prim = prim_indices[i as usize];
            let query = Ray::with_range(ray.org, ray.dir, seg_tmin.max(ray.tmin), closest.min(ray.tmax));
            if shadow {
                if adapter.intersect_shadow(prim, query) {
                    return Some(DetailedHit { prim, t: 0., u: 0., v: 0. });
                }
            } else if let Some(hit) = adapter.intersect(prim, query) {
                if hit.t < closest {
                    closest = hit.t;
                    best = Some(DetailedHit {
                        prim,
                        t: hit.t,
                        u: hit.u,
                        v: hit.v,
                    });
                }
            }
        }

        loop {
            match stack.pop() {
                None => return best,
                Some(entry) => {
                    if entry.tmin > closest {
                        continue;
                    }
                    node_index = entry.node;
                    seg_tmin = entry.tmin;
                    seg_tmax = entry.tmax;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod traverse_tests {
    use super::*;
    use crate::geometry::mesh::{Triangle, TriangleSoup};
    use crate::kdtree::builder::{self, BuildParams};
    use crate::kdtree::node::KDNode;
    use crate::math::vector::Vec3;

    fn build_soup(soup: &TriangleSoup, parallel: bool) -> (NodeStore, Vec<u32>, BBox3<f64>) {
        let mut params = BuildParams::default();
        params.parallel_build = parallel;
        let out = builder::build(soup, &params).unwrap();
        (out.store, out.prim_indices, out.root_box)
    }

    #[test]
    fn single_triangle_at_origin_matches_scenario_s1() {
        let mut soup = TriangleSoup::new();
        soup.add_mesh(
            vec![
                Vec3 { x: 0., y: 0., z: 0. },
                Vec3 { x: 1., y: 0., z: 0. },
                Vec3 { x: 0., y: 1., z: 0. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );
        let (store, prim_indices, root_box) = build_soup(&soup, false);
        let ray = Ray::new(Vec3 { x: 0.25, y: 0.25, z: 1. }, Vec3 { x: 0., y: 0., z: -1. });
        let hit = intersect(&soup, &store, &prim_indices, root_box, ray, false).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-9);
        assert!((hit.u - 0.25).abs() < 1e-9);
        assert!((hit.v - 0.25).abs() < 1e-9);
    }

    #[test]
    fn empty_scene_always_misses() {
        let soup = TriangleSoup::new();
        let (store, prim_indices, root_box) = build_soup(&soup, false);
        let ray = Ray::new(Vec3 { x: 0., y: 0., z: 5. }, Vec3 { x: 0., y: 0., z: -1. });
        assert!(intersect(&soup, &store, &prim_indices, root_box, ray, false).is_none());
    }

    fn axis_aligned_box_soup() -> TriangleSoup {
        // A unit-radius cube centered at the origin, one quad (two
        // triangles) per face.
        let mut soup = TriangleSoup::new();
        let corners = [
            Vec3 { x: -1., y: -1., z: -1. },
            Vec3 { x: 1., y: -1., z: -1. },
            Vec3 { x: 1., y: 1., z: -1. },
            Vec3 { x: -1., y: 1., z: -1. },
            Vec3 { x: -1., y: -1., z: 1. },
            Vec3 { x: 1., y: -1., z: 1. },
            Vec3 { x: 1., y: 1., z: 1. },
            Vec3 { x: -1., y: 1., z: 1. },
        ];
        let faces: [[usize; 4]; 6] = [
            [0, 1, 2, 3], // -z
            [4, 5, 6, 7], // +z
            [0, 1, 5, 4], // -y
            [3, 2, 6, 7], // +y
            [0, 3, 7, 4], // -x
            [1, 2, 6, 5], // +x
        ];
        for face in faces.iter() {
            let v: Vec<Vec3<f64>> = face.iter().map(|&i| corners[i]).collect();
            soup.add_mesh(
                v,
                None,
                vec![
                    Triangle { indices: [0, 1, 2] },
                    Triangle { indices: [0, 2, 3] },
                ],
            );
        }
        soup
    }

    #[test]
    fn ray_toward_axis_aligned_box_matches_scenario_s4() {
        let soup = axis_aligned_box_soup();
        let (store, prim_indices, root_box) = build_soup(&soup, false);
        let ray = Ray::new(Vec3 { x: 5., y: 0.1, z: 0.1 }, Vec3 { x: -1., y: 0., z: 0. });
        let hit = intersect(&soup, &store, &prim_indices, root_box, ray, false).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-6);
    }

    #[test]
    fn shadow_ray_is_monotonic_around_the_hit_point() {
        let soup = axis_aligned_box_soup();
        let (store, prim_indices, root_box) = build_soup(&soup, false);
        let org = Vec3 { x: 5., y: 0.1, z: 0.1 };
        let dir = Vec3 { x: -1., y: 0., z: 0. };
        let t_hit = 4.0;
        let eps = 1e-3;

        let past = Ray::with_range(org, dir, 1e-6, t_hit + eps);
        assert!(intersect(&soup, &store, &prim_indices, root_box, past, true).is_some());

        let short = Ray::with_range(org, dir, 1e-6, t_hit - eps);
        assert!(intersect(&soup, &store, &prim_indices, root_box, short, true).is_none());
    }

    #[test]
    fn ray_grazing_a_shared_split_plane_still_finds_one_hit() {
        // Two coplanar triangles sharing an edge on the x=0 plane; a ray
        // travelling exactly along that plane toward the shared edge must
        // register exactly one hit, not zero or two.
        let mut soup = TriangleSoup::new();
        soup.add_mesh(
            vec![
                Vec3 { x: 0., y: 0., z: 0. },
                Vec3 { x: 0., y: 1., z: 0. },
                Vec3 { x: 0., y: 0., z: 1. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );
        soup.add_mesh(
            vec![
                Vec3 { x: 0., y: 1., z: 0. },
                Vec3 { x: 0., y: 1., z: 1. },
                Vec3 { x: 0., y: 0., z: 1. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );
        let (store, prim_indices, root_box) = build_soup(&soup, false);
        let ray = Ray::new(Vec3 { x: 0., y: 0.3, z: 0.3 }, Vec3 { x: 0., y: 0., z: 1. });
        let hit = intersect(&soup, &store, &prim_indices, root_box, ray, false);
        assert!(hit.is_some());
    }

    #[test]
    fn ray_starting_past_a_split_still_finds_the_far_child() {
        // A hand-assembled two-leaf tree (bypassing the builder's own split
        // choice) so the near/far branch at an inner node can be exercised
        // directly: axis=x, split=5, root box x in [0, 10]. A decoy
        // primitive sits in the left leaf (x=2, entirely behind the ray's
        // origin) and the real target sits in the right leaf (x=9). The ray
        // originates at x=8, already past the split, heading further away
        // from it (+x) — descending into the left child first would miss the
        // only primitive actually reachable.
        let mut soup = TriangleSoup::new();
        soup.add_mesh(
            vec![
                Vec3 { x: 2., y: -1., z: -1. },
                Vec3 { x: 2., y: 2., z: -1. },
                Vec3 { x: 2., y: -1., z: 2. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );
        soup.add_mesh(
            vec![
                Vec3 { x: 9., y: -1., z: -1. },
                Vec3 { x: 9., y: 2., z: -1. },
                Vec3 { x: 9., y: -1., z: 2. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );

        let mut store = NodeStore::new();
        store.push(KDNode::leaf(0, 0)); // root placeholder, index 1
        let pair = store.allocate_pair();
        store.set(pair, KDNode::leaf(0, 1));
        store.set(pair + 1, KDNode::leaf(1, 2));
        store.set(1, KDNode::inner(0, 5.0, (pair - 1) as u32, false));

        let prim_indices = vec![0u32, 1u32];
        let root_box = BBox3::from_pnts(Vec3 { x: 0., y: -10., z: -10. }, Vec3 { x: 10., y: 10., z: 10. });
        let ray = Ray::new(Vec3 { x: 8., y: 0., z: 0. }, Vec3 { x: 1., y: 0., z: 0. });

        let hit = intersect(&soup, &store, &prim_indices, root_box, ray, false).unwrap();
        assert_eq!(hit.prim, 1);
        assert!((hit.t - 1.0).abs() < 1e-9);
    }
}
