use crate::math::numbers::Float;
use crate::math::ray::Ray;
use crate::math::util::gamma_f64;
use crate::math::vector::Vec3;

use num_traits::Bounded;

use std::cmp::PartialOrd;
use std::mem::swap;
use std::ops::{Index, Sub};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BBox3<T: PartialOrd + Bounded + Copy> {
    pub pmin: Vec3<T>,
    pub pmax: Vec3<T>,
}

impl<T: PartialOrd + Bounded + Copy> BBox3<T> {
    /// An "empty" box: `pmin` at `+inf`, `pmax` at `-inf`, so that combining it
    /// with anything always yields the other operand.
    pub fn new() -> Self {
        BBox3 {
            pmin: Vec3 {
                x: T::max_value(),
                y: T::max_value(),
                z: T::max_value(),
            },
            pmax: Vec3 {
                x: T::min_value(),
                y: T::min_value(),
                z: T::min_value(),
            },
        }
    }

    pub fn from_pnts(pnt0: Vec3<T>, pnt1: Vec3<T>) -> Self {
        BBox3 {
            pmin: pnt0.min(pnt1),
            pmax: pnt0.max(pnt1),
        }
    }

    pub fn from_pnt(pnt: Vec3<T>) -> Self {
        BBox3 {
            pmin: pnt,
            pmax: pnt,
        }
    }

    pub fn corner(self, i: usize) -> Vec3<T> {
        let x = self[i & 1].x;
        let y = self[if i & 2 != 0 { 1 } else { 0 }].y;
        let z = self[if i & 4 != 0 { 1 } else { 0 }].z;
        Vec3 { x, y, z }
    }

    pub fn combine_pnt(self, pnt: Vec3<T>) -> Self {
        let pmin = self.pmin.min(pnt);
        let pmax = self.pmax.max(pnt);
        BBox3 { pmin, pmax }
    }

    pub fn combine_bnd(self, bnd: BBox3<T>) -> Self {
        let pmin = self.pmin.min(bnd.pmin);
        let pmax = self.pmax.max(bnd.pmax);
        BBox3 { pmin, pmax }
    }

    pub fn is_empty(self) -> bool {
        self.pmin.x > self.pmax.x || self.pmin.y > self.pmax.y || self.pmin.z > self.pmax.z
    }
}

impl<T: Float + Bounded> BBox3<T> {
    // Continuous position of a point relative to the corners of the box:
    // pmin maps to (0,0,0), pmax maps to (1,1,1). Axes with zero extent map
    // to the offset from pmin directly.
    pub fn offset(self, pnt: Vec3<T>) -> Vec3<T> {
        let o = pnt - self.pmin;
        Vec3 {
            x: if self.pmax.x > self.pmin.x {
                o.x / (self.pmax.x - self.pmin.x)
            } else {
                o.x
            },
            y: if self.pmax.y > self.pmin.y {
                o.y / (self.pmax.y - self.pmin.y)
            } else {
                o.y
            },
            z: if self.pmax.z > self.pmin.z {
                o.z / (self.pmax.z - self.pmin.z)
            } else {
                o.z
            },
        }
    }

    // Zero for a degenerate (zero-extent on some axis) box, per the data
    // model's "flagged as zero surface area" invariant.
    pub fn surface_area(self) -> T {
        if self.is_empty() {
            return T::zero();
        }
        let d = self.diagonal();
        T::two() * (d.x * d.y + d.x * d.z + d.y * d.z)
    }
}

impl<T: Sub<Output = T> + PartialOrd + Bounded + Copy> BBox3<T> {
    pub fn diagonal(self) -> Vec3<T> {
        self.pmax - self.pmin
    }

    pub fn max_dim(self) -> usize {
        self.diagonal().max_dim()
    }
}

impl<T: PartialOrd + Bounded + Copy> Index<usize> for BBox3<T> {
    type Output = Vec3<T>;

    fn index(&self, i: usize) -> &Vec3<T> {
        match i {
            0 => &self.pmin,
            1 => &self.pmax,
            _ => panic!("Index out of range for BBox3"),
        }
    }
}

// Ray/box intersection uses f64 exclusively: the builder and traverser never
// need single precision here, and the conservative "pad tmax by 2*gamma(3)"
// correction (Wald et al.) only matters at this precision.
impl BBox3<f64> {
    /// Returns the clipped `[t0, t1]` parametric interval, or `None` if the
    /// ray misses the box or the interval is empty.
    pub fn intersect(&self, ray: Ray, tmax: f64) -> Option<(f64, f64)> {
        let mut t0 = ray.tmin;
        let mut t1 = f64::min(ray.tmax, tmax);

        for i in 0..3 {
            let inv_dir = 1. / ray.dir[i];
            let mut t_near = (self.pmin[i] - ray.org[i]) * inv_dir;
            let mut t_far = (self.pmax[i] - ray.org[i]) * inv_dir;
            if t_near > t_far {
                swap(&mut t_near, &mut t_far);
            }
            t_far *= 1. + 2. * gamma_f64(3);

            t0 = if t_near > t0 { t_near } else { t0 };
            t1 = if t_far < t1 { t_far } else { t1 };

            if t0 > t1 {
                return None;
            }
        }

        Some((t0, t1))
    }

    /// Clips `self` against a single axis-aligned plane, keeping the side
    /// where `axis` is `<= value` (if `keep_below`) or `>= value` otherwise.
    /// Used for min-max binning's conservative per-bin boxes; the exact
    /// Sutherland-Hodgman clip used for perfect splits lives on the triangle.
    pub fn clipped(self, axis: usize, value: f64, keep_below: bool) -> Self {
        let mut b = self;
        if keep_below {
            b.pmax[axis] = crate::math::util::min(b.pmax[axis], value);
        } else {
            b.pmin[axis] = crate::math::util::max(b.pmin[axis], value);
        }
        b
    }
}

#[cfg(test)]
mod bbox_tests {
    use super::*;
    use crate::math::ray::Ray;

    #[test]
    fn degenerate_box_has_zero_surface_area() {
        let b = BBox3::from_pnts(
            Vec3 { x: 0., y: 0., z: 0. },
            Vec3 { x: 1., y: 0., z: 1. },
        );
        assert_eq!(b.surface_area(), 0.);
    }

    #[test]
    fn unit_cube_has_surface_area_six() {
        let b = BBox3::from_pnts(
            Vec3 { x: 0., y: 0., z: 0. },
            Vec3 { x: 1., y: 1., z: 1. },
        );
        assert!((b.surface_area() - 6.).abs() < 1e-12);
    }

    #[test]
    fn ray_through_box_hits() {
        let b = BBox3::from_pnts(
            Vec3 { x: -1., y: -1., z: -1. },
            Vec3 { x: 1., y: 1., z: 1. },
        );
        let ray = Ray::new(
            Vec3 { x: 0., y: 0., z: -5. },
            Vec3 { x: 0., y: 0., z: 1. },
        );
        let hit = b.intersect(ray, f64::INFINITY);
        assert!(hit.is_some());
        let (t0, t1) = hit.unwrap();
        assert!((t0 - 4.).abs() < 1e-9);
        assert!((t1 - 6.).abs() < 1e-9);
    }

    #[test]
    fn ray_missing_box_returns_none() {
        let b = BBox3::from_pnts(
            Vec3 { x: -1., y: -1., z: -1. },
            Vec3 { x: 1., y: 1., z: 1. },
        );
        let ray = Ray::new(
            Vec3 { x: 5., y: 5., z: -5. },
            Vec3 { x: 0., y: 0., z: 1. },
        );
        assert!(b.intersect(ray, f64::INFINITY).is_none());
    }
}
