use crate::math::vector::Vec3;

/// A ray used to query the kd-tree.
///
/// `d_rcp` is the componentwise reciprocal of `dir` and must be kept
/// consistent with it; callers that mutate `dir` directly (none do, within
/// this crate) would need to recompute it. Traversal divides by `dir` once,
/// at construction, rather than once per node.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub org: Vec3<f64>,
    pub dir: Vec3<f64>,
    pub d_rcp: Vec3<f64>,
    pub tmin: f64,
    pub tmax: f64,
}

impl Ray {
    /// Constructs a ray over the full `[0, inf)` parametric range.
    pub fn new(org: Vec3<f64>, dir: Vec3<f64>) -> Self {
        Ray::with_range(org, dir, 0., f64::INFINITY)
    }

    pub fn with_range(org: Vec3<f64>, dir: Vec3<f64>, tmin: f64, tmax: f64) -> Self {
        let d_rcp = Vec3 {
            x: 1. / dir.x,
            y: 1. / dir.y,
            z: 1. / dir.z,
        };
        Ray {
            org,
            dir,
            d_rcp,
            tmin,
            tmax,
        }
    }

    pub fn point_at(self, t: f64) -> Vec3<f64> {
        self.org + self.dir.scale(t)
    }
}
