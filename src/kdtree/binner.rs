// Approximate SAH cost minimizer over a fixed bin grid, used near the root
// where the event sweep's O(n log n) per-node cost would be too slow.
// Unlike a plain bucketed SAH pass over centroids (one split decision per
// node, no split-position recovery needed), this binner has to recover an
// actual split position robustly and fall back to an exact sweep when
// binning can't find a viable one.

use crate::geometry::GeometryAdapter;
use crate::kdtree::builder::CostParams;
use crate::math::bbox::BBox3;

const MAX_BISECTION_ITERS: u32 = 50;

/// The outcome of [`MinMaxBinner::minimize_cost`]: `cost == f64::INFINITY`
/// means no viable split was found on any axis (caller should fall back to
/// the event sweeper).
#[derive(Clone, Copy, Debug)]
pub struct SplitCandidate {
    pub cost: f64,
    pub axis: usize,
    pub position: f64,
    pub num_left: u32,
    pub num_right: u32,
}

impl SplitCandidate {
    pub fn none() -> Self {
        SplitCandidate {
            cost: f64::INFINITY,
            axis: 0,
            position: 0.,
            num_left: 0,
            num_right: 0,
        }
    }
}

pub struct MinMaxBinner {
    bin_count: usize,
    min_bin: Vec<u32>,
    max_bin: Vec<u32>,
}

fn bin_index(value: f64, box_min: f64, bin_width: f64, bin_count: usize) -> usize {
    if bin_width <= 0. {
        return 0;
    }
    let idx = ((value - box_min) / bin_width).floor();
    if idx < 0. {
        0
    } else if idx as usize >= bin_count {
        bin_count - 1
    } else {
        idx as usize
    }
}

impl MinMaxBinner {
    pub fn new(bin_count: usize) -> Self {
        MinMaxBinner {
            bin_count,
            min_bin: vec![0; 3 * bin_count],
            max_bin: vec![0; 3 * bin_count],
        }
    }

    fn reset(&mut self) {
        self.min_bin.iter_mut().for_each(|v| *v = 0);
        self.max_bin.iter_mut().for_each(|v| *v = 0);
    }

    fn bin_width(&self, parent_box: BBox3<f64>) -> [f64; 3] {
        let d = parent_box.diagonal();
        [
            d.x / self.bin_count as f64,
            d.y / self.bin_count as f64,
            d.z / self.bin_count as f64,
        ]
    }

    /// Bins every primitive's (plain, unclipped) bounding box min and max
    /// per axis into `bin_count` buckets of `parent_box`.
    pub fn bin<G: GeometryAdapter>(&mut self, adapter: &G, indices: &[u32], parent_box: BBox3<f64>) {
        self.reset();
        let widths = self.bin_width(parent_box);
        for &prim in indices {
            let b = adapter.bounding_box(prim);
            for axis in 0..3 {
                let min_idx = bin_index(b.pmin[axis], parent_box.pmin[axis], widths[axis], self.bin_count);
                let max_idx = bin_index(b.pmax[axis], parent_box.pmin[axis], widths[axis], self.bin_count);
                self.min_bin[axis * self.bin_count + min_idx] += 1;
                self.max_bin[axis * self.bin_count + max_idx] += 1;
            }
        }
    }

    /// Recovers a split position at `left_bin`'s upper boundary that
    /// classifies consistently with the bin it was computed from: a point
    /// just below it must fall in `left_bin`, a point at or above it in
    /// `left_bin + 1`. Falls back to bisection on mismatch, matching the
    /// builder's documented numerical-robustness fallback.
    fn robust_split_position(&self, axis: usize, left_bin: usize, parent_box: BBox3<f64>, width: f64) -> Option<f64> {
        let box_min = parent_box.pmin[axis];
        let box_max = parent_box.pmax[axis];
        let raw = box_min + (left_bin + 1) as f64 * width;

        let idx_here = bin_index(raw, box_min, width, self.bin_count);
        let idx_after = bin_index(f64_next_up(raw), box_min, width, self.bin_count);
        if idx_here == left_bin && idx_after == left_bin + 1 {
            return Some(raw);
        }

        let mut lo = box_min;
        let mut hi = box_max;
        for _ in 0..MAX_BISECTION_ITERS {
            let mid = 0.5 * (lo + hi);
            if bin_index(mid, box_min, width, self.bin_count) <= left_bin {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        if bin_index(lo, box_min, width, self.bin_count) == left_bin
            && bin_index(hi, box_min, width, self.bin_count) > left_bin
        {
            Some(hi)
        } else {
            None
        }
    }

    /// Sweeps all bin boundaries on all three axes and returns the
    /// lowest-cost split, or [`SplitCandidate::none`] if nothing viable was
    /// found (every axis degenerate, or every candidate failed the
    /// robustness check).
    pub fn minimize_cost(&self, total: u32, parent_box: BBox3<f64>, cost: &CostParams) -> SplitCandidate {
        let widths = self.bin_width(parent_box);
        let parent_area = parent_box.surface_area();
        if parent_area <= 0. {
            return SplitCandidate::none();
        }

        let mut best = SplitCandidate::none();
        for axis in 0..3 {
            let width = widths[axis];
            if width <= 0. {
                continue;
            }
            let mut num_left: u32 = 0;
            let mut num_right: u32 = total;
            for left_bin in 0..self.bin_count - 1 {
                num_left += self.min_bin[axis * self.bin_count + left_bin];
                num_right -= self.max_bin[axis * self.bin_count + left_bin];

                let position = match self.robust_split_position(axis, left_bin, parent_box, width) {
                    Some(p) => p,
                    None => continue,
                };

                let left_box = parent_box.clipped(axis, position, true);
                let right_box = parent_box.clipped(axis, position, false);
                let p_left = left_box.surface_area() / parent_area;
                let p_right = right_box.surface_area() / parent_area;

                let this_cost = cost.k_trav + cost.k_query * (p_left * num_left as f64 + p_right * num_right as f64);
                if this_cost < best.cost {
                    best = SplitCandidate {
                        cost: this_cost,
                        axis,
                        position,
                        num_left,
                        num_right,
                    };
                }
            }
        }
        best
    }
}

fn f64_next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0. {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    let next = if x > 0. { bits + 1 } else { bits - 1 };
    f64::from_bits(next)
}

#[cfg(test)]
mod binner_tests {
    use super::*;
    use crate::geometry::mesh::{Triangle, TriangleSoup};
    use crate::math::vector::Vec3;

    fn cost() -> CostParams {
        CostParams {
            k_trav: 15.,
            k_query: 20.,
            empty_bonus: 0.9,
        }
    }

    #[test]
    fn bins_two_halves_of_a_cube_split_evenly() {
        let mut soup = TriangleSoup::new();
        // One triangle per half of the unit cube along x.
        soup.add_mesh(
            vec![
                Vec3 { x: 0.1, y: 0., z: 0. },
                Vec3 { x: 0.2, y: 0., z: 0. },
                Vec3 { x: 0.1, y: 0.2, z: 0. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );
        soup.add_mesh(
            vec![
                Vec3 { x: 0.8, y: 0., z: 0. },
                Vec3 { x: 0.9, y: 0., z: 0. },
                Vec3 { x: 0.8, y: 0.2, z: 0. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );

        let parent_box = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: 0. }, Vec3 { x: 1., y: 1., z: 1. });
        let mut binner = MinMaxBinner::new(16);
        let indices = vec![0u32, 1u32];
        binner.bin(&soup, &indices, parent_box);

        let best = binner.minimize_cost(2, parent_box, &cost());
        assert!(best.cost.is_finite());
        assert_eq!(best.num_left, 1);
        assert_eq!(best.num_right, 1);
    }

    #[test]
    fn degenerate_parent_box_yields_no_split() {
        let parent_box = BBox3::from_pnt(Vec3 { x: 0., y: 0., z: 0. });
        let binner = MinMaxBinner::new(16);
        let best = binner.minimize_cost(0, parent_box, &cost());
        assert!(best.cost.is_infinite());
    }
}
