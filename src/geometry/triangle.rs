// Triangle/ray intersection and triangle/box clipping, the two primitive
// operations every `GeometryAdapter` built from a triangle soup needs.
//
// Intersection uses the classic Möller–Trumbore test, in double precision to
// match the rest of the builder's perfect-split arithmetic (a watertight
// shear-and-permute test is the more robust choice for production use, but
// Möller–Trumbore is the one actually taught). The Sutherland–Hodgman clip
// against an AABB's six half-planes backs the perfect-split re-clipping a
// bucketed SAH pass never needs, since it only ever clips bounding boxes,
// not triangle geometry.

use crate::math::bbox::BBox3;
use crate::math::ray::Ray;
use crate::math::vector::Vec3;

use arrayvec::ArrayVec;

type ClipPoly = ArrayVec<[Vec3<f64>; 16]>;

/// Möller–Trumbore ray/triangle intersection. Returns `(t, u, v)` with
/// `t` in `[ray.tmin, ray.tmax]` and barycentric coordinates `u, v` such
/// that the hit point is `v0 + u*(v1-v0) + v*(v2-v0)`.
pub fn intersect(v0: Vec3<f64>, v1: Vec3<f64>, v2: Vec3<f64>, ray: Ray) -> Option<(f64, f64, f64)> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;

    let pvec = ray.dir.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < f64::EPSILON {
        return None;
    }
    let inv_det = 1. / det;

    let tvec = ray.org - v0;
    let u = tvec.dot(pvec) * inv_det;
    if u < 0. || u > 1. {
        return None;
    }

    let qvec = tvec.cross(e1);
    let v = ray.dir.dot(qvec) * inv_det;
    if v < 0. || u + v > 1. {
        return None;
    }

    let t = e2.dot(qvec) * inv_det;
    if t < ray.tmin || t > ray.tmax {
        return None;
    }

    Some((t, u, v))
}

fn edge_crossing(a: Vec3<f64>, b: Vec3<f64>, axis: usize, value: f64) -> Vec3<f64> {
    let t = (value - a[axis]) / (b[axis] - a[axis]);
    a + (b - a).scale(t)
}

/// Clips a (convex, here always a triangle) polygon against the single
/// half-space `axis <= value` (if `keep_le`) or `axis >= value` otherwise.
fn clip_plane(poly: &ClipPoly, axis: usize, value: f64, keep_le: bool) -> ClipPoly {
    let mut out = ClipPoly::new();
    let n = poly.len();
    if n == 0 {
        return out;
    }
    let inside = |p: Vec3<f64>| if keep_le { p[axis] <= value } else { p[axis] >= value };

    for i in 0..n {
        let curr = poly[i];
        let prev = poly[(i + n - 1) % n];
        let curr_in = inside(curr);
        let prev_in = inside(prev);

        if curr_in {
            if !prev_in {
                out.push(edge_crossing(prev, curr, axis, value));
            }
            out.push(curr);
        } else if prev_in {
            out.push(edge_crossing(prev, curr, axis, value));
        }
    }
    out
}

/// Sutherland–Hodgman clip of a triangle against an axis-aligned box, in
/// double precision, returning the bounding box of the clipped polygon (an
/// empty `BBox3` if the triangle lies entirely outside `clip`).
pub fn clip_to_box(v0: Vec3<f64>, v1: Vec3<f64>, v2: Vec3<f64>, clip: BBox3<f64>) -> BBox3<f64> {
    let mut poly = ClipPoly::new();
    poly.push(v0);
    poly.push(v1);
    poly.push(v2);

    poly = clip_plane(&poly, 0, clip.pmin.x, false);
    poly = clip_plane(&poly, 0, clip.pmax.x, true);
    poly = clip_plane(&poly, 1, clip.pmin.y, false);
    poly = clip_plane(&poly, 1, clip.pmax.y, true);
    poly = clip_plane(&poly, 2, clip.pmin.z, false);
    poly = clip_plane(&poly, 2, clip.pmax.z, true);

    poly.iter().fold(BBox3::new(), |b, &p| b.combine_pnt(p))
}

#[cfg(test)]
mod triangle_tests {
    use super::*;

    fn ray(org: Vec3<f64>, dir: Vec3<f64>) -> Ray {
        Ray::new(org, dir)
    }

    #[test]
    fn straight_on_hit_reports_correct_t_and_barycentrics() {
        let v0 = Vec3 { x: 0., y: 0., z: 0. };
        let v1 = Vec3 { x: 1., y: 0., z: 0. };
        let v2 = Vec3 { x: 0., y: 1., z: 0. };
        let r = ray(Vec3 { x: 0.25, y: 0.25, z: 1. }, Vec3 { x: 0., y: 0., z: -1. });
        let (t, u, v) = intersect(v0, v1, v2, r).unwrap();
        assert!((t - 1.).abs() < 1e-12);
        assert!((u - 0.25).abs() < 1e-12);
        assert!((v - 0.25).abs() < 1e-12);
    }

    #[test]
    fn miss_outside_edges_returns_none() {
        let v0 = Vec3 { x: 0., y: 0., z: 0. };
        let v1 = Vec3 { x: 1., y: 0., z: 0. };
        let v2 = Vec3 { x: 0., y: 1., z: 0. };
        let r = ray(Vec3 { x: 5., y: 5., z: 1. }, Vec3 { x: 0., y: 0., z: -1. });
        assert!(intersect(v0, v1, v2, r).is_none());
    }

    #[test]
    fn backface_hit_still_reports_via_signed_determinant() {
        let v0 = Vec3 { x: 0., y: 0., z: 0. };
        let v1 = Vec3 { x: 1., y: 0., z: 0. };
        let v2 = Vec3 { x: 0., y: 1., z: 0. };
        let r = ray(Vec3 { x: 0.25, y: 0.25, z: -1. }, Vec3 { x: 0., y: 0., z: 1. });
        assert!(intersect(v0, v1, v2, r).is_some());
    }

    #[test]
    fn triangle_fully_inside_box_clips_to_its_own_bounds() {
        let v0 = Vec3 { x: 0.1, y: 0.1, z: 0. };
        let v1 = Vec3 { x: 0.5, y: 0.1, z: 0. };
        let v2 = Vec3 { x: 0.1, y: 0.5, z: 0. };
        let b = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: -1. }, Vec3 { x: 1., y: 1., z: 1. });
        let clipped = clip_to_box(v0, v1, v2, b);
        assert!((clipped.pmin.x - 0.1).abs() < 1e-12);
        assert!((clipped.pmax.x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn triangle_straddling_a_plane_clips_to_half_its_extent() {
        let v0 = Vec3 { x: -1., y: 0., z: 0. };
        let v1 = Vec3 { x: 1., y: 0., z: 0. };
        let v2 = Vec3 { x: 0., y: 1., z: 0. };
        let b = BBox3::from_pnts(
            Vec3 { x: -10., y: -10., z: -10. },
            Vec3 { x: 0., y: 10., z: 10. },
        );
        let clipped = clip_to_box(v0, v1, v2, b);
        assert!(clipped.pmax.x <= 1e-12);
        assert!(!clipped.is_empty());
    }

    #[test]
    fn triangle_entirely_outside_box_clips_to_empty() {
        let v0 = Vec3 { x: 5., y: 5., z: 0. };
        let v1 = Vec3 { x: 6., y: 5., z: 0. };
        let v2 = Vec3 { x: 5., y: 6., z: 0. };
        let b = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: -1. }, Vec3 { x: 1., y: 1., z: 1. });
        let clipped = clip_to_box(v0, v1, v2, b);
        assert!(clipped.is_empty());
    }
}
