// The exact O(n log n) split finder and perfect-split partitioner. Reuses
// the `partition` crate's slice-partition-by-predicate idiom for the kd-tree's
// left/both/right classification, adding the exact edge-event sweep and
// Sutherland-Hodgman re-clipping a bucketed SAH split never needs.
//
// The builder regenerates a fresh, freshly-clipped event list for every node
// rather than incrementally streaming and merging split event lists. That
// trades the sweep's per-level O(n log n) bound for O(n log n) *per node*,
// so a full build is O(n log^2 n) instead of O(n log n) end to end.
// Documented as a deliberate simplification; the produced split decisions
// and primitive classifications are identical either way.

use crate::geometry::GeometryAdapter;
use crate::kdtree::builder::CostParams;
use crate::kdtree::events::{sort_events, EdgeEvent, EventKind};
use crate::math::bbox::BBox3;
use crate::memory::{Classification, ClassificationStore};

use partition::partition;

/// A candidate split found by the event sweep. Unlike
/// [`crate::kdtree::binner::SplitCandidate`], this tracks which side a
/// planar-on-the-split-plane primitive group should land on.
#[derive(Clone, Copy, Debug)]
pub struct SplitCandidate {
    pub cost: f64,
    pub axis: usize,
    pub position: f64,
    pub num_left: u32,
    pub num_right: u32,
    pub planar_left: bool,
}

impl SplitCandidate {
    pub fn none() -> Self {
        SplitCandidate {
            cost: f64::INFINITY,
            axis: 0,
            position: 0.,
            num_left: 0,
            num_right: 0,
            planar_left: true,
        }
    }
}

/// Builds the sorted edge-event list for `indices` against `node_box`. When
/// `clip` is set, each primitive's bounding box is first clipped to
/// `node_box` (a "perfect split", spec terms), so a primitive that merely
/// straddles the node's box on one axis doesn't generate a spurious event
/// range that extends past it.
pub fn generate_events<G: GeometryAdapter>(
    adapter: &G,
    indices: &[u32],
    node_box: BBox3<f64>,
    clip: bool,
) -> Vec<EdgeEvent> {
    let mut events = Vec::with_capacity(indices.len() * 6);
    for &prim in indices {
        let b = if clip {
            adapter.clipped_bounding_box(prim, node_box)
        } else {
            adapter.bounding_box(prim)
        };
        if b.is_empty() {
            continue;
        }
        for axis in 0..3usize {
            let lo = b.pmin[axis] as f32;
            let hi = b.pmax[axis] as f32;
            if lo == hi {
                events.push(EdgeEvent::new(axis as u8, lo, prim, EventKind::Planar));
            } else {
                events.push(EdgeEvent::new(axis as u8, lo, prim, EventKind::Start));
                events.push(EdgeEvent::new(axis as u8, hi, prim, EventKind::End));
            }
        }
    }
    sort_events(&mut events);
    events
}

fn eval_cost(
    cost: &CostParams,
    node_box: BBox3<f64>,
    parent_area: f64,
    axis: usize,
    position: f64,
    num_left: u32,
    num_right: u32,
) -> f64 {
    let left_box = node_box.clipped(axis, position, true);
    let right_box = node_box.clipped(axis, position, false);
    let p_left = left_box.surface_area() / parent_area;
    let p_right = right_box.surface_area() / parent_area;
    let mut c = cost.k_trav + cost.k_query * (p_left * num_left as f64 + p_right * num_right as f64);
    if num_left == 0 || num_right == 0 {
        c *= cost.empty_bonus;
    }
    c
}

/// Sweeps a sorted, multi-axis event list (as produced by
/// [`generate_events`]) once and returns the cheapest split found on any
/// axis. Planar events tied to a candidate position are evaluated both sent
/// left and sent right, keeping whichever is cheaper.
pub fn find_best_split(events: &[EdgeEvent], total: u32, node_box: BBox3<f64>, cost: &CostParams) -> SplitCandidate {
    let mut best = SplitCandidate::none();
    let parent_area = node_box.surface_area();
    if parent_area <= 0. || events.is_empty() {
        return best;
    }

    let mut i = 0;
    while i < events.len() {
        let axis = events[i].axis as usize;
        let mut num_left: u32 = 0;
        let mut num_right: u32 = total;

        while i < events.len() && events[i].axis as usize == axis {
            let position = events[i].position;

            let mut n_start = 0u32;
            let mut n_end = 0u32;
            let mut n_planar = 0u32;
            while i < events.len() && events[i].axis as usize == axis && events[i].position == position {
                match events[i].kind {
                    EventKind::Start => n_start += 1,
                    EventKind::End => n_end += 1,
                    EventKind::Planar => n_planar += 1,
                }
                i += 1;
            }

            let pos64 = position as f64;
            let left_with_planar = num_left + n_planar;
            let right_without_planar = num_right - n_planar - n_end;
            let right_with_planar = num_right - n_end;

            let cost_left = eval_cost(cost, node_box, parent_area, axis, pos64, left_with_planar, right_without_planar);
            let cost_right = eval_cost(cost, node_box, parent_area, axis, pos64, num_left, right_with_planar);

            if cost_left < best.cost {
                best = SplitCandidate {
                    cost: cost_left,
                    axis,
                    position: pos64,
                    num_left: left_with_planar,
                    num_right: right_without_planar,
                    planar_left: true,
                };
            }
            if cost_right < best.cost {
                best = SplitCandidate {
                    cost: cost_right,
                    axis,
                    position: pos64,
                    num_left,
                    num_right: right_with_planar,
                    planar_left: false,
                };
            }

            num_right -= n_planar + n_end;
            num_left += n_start + n_planar;
        }
    }
    best
}

/// PBRT-style leaf gate: even when a split was found, refuse it (and force
/// a leaf) once the tree has been refining without enough payoff for too
/// many levels in a row.
pub fn bad_refines_is_leaf(best: &SplitCandidate, prim_count: u32, leaf_cost: f64, cost: &CostParams, bad_refines: u32, max_bad_refines: u32) -> bool {
    if best.cost >= prim_count as f64 * cost.k_query {
        if (best.cost > 4. * leaf_cost && prim_count < 16) || bad_refines >= max_bad_refines {
            return true;
        }
    }
    false
}

pub struct PartitionResult {
    pub left_indices: Vec<u32>,
    pub right_indices: Vec<u32>,
    pub left_box: BBox3<f64>,
    pub right_box: BBox3<f64>,
    pub pruned: u32,
}

/// Classifies every primitive in `indices` against `split` and partitions
/// them into left-only / straddling / right-only groups using the
/// `partition` crate's predicate-based slice partition (the same idiom the
/// BVH uses for its bucket split). Straddling primitives are re-clipped
/// against each child's box; a child whose re-clipped box comes back empty
/// drops the primitive and increments `pruned` rather than carrying it
/// forward (a "perfect split" discarding a primitive that only grazed the
/// parent box on this axis).
pub fn partition_with_perfect_splits<G: GeometryAdapter>(
    adapter: &G,
    mut indices: Vec<u32>,
    node_box: BBox3<f64>,
    split: &SplitCandidate,
    clip: bool,
    classification: &mut ClassificationStore,
) -> PartitionResult {
    let axis = split.axis;
    let pos = split.position;

    for &prim in &indices {
        let b = adapter.bounding_box(prim);
        let c = if b.pmin[axis] == b.pmax[axis] && b.pmin[axis] == pos {
            if split.planar_left {
                Classification::Left
            } else {
                Classification::Right
            }
        } else if b.pmax[axis] <= pos {
            Classification::Left
        } else if b.pmin[axis] >= pos {
            Classification::Right
        } else {
            Classification::Both
        };
        classification.set(prim as usize, c);
    }

    let right_start = partition(&mut indices, |&p| classification.get(p as usize) != Classification::Right);
    let (left_and_both, right_only) = indices.split_at_mut(right_start);
    let both_start = partition(left_and_both, |&p| classification.get(p as usize) == Classification::Left);
    let (left_only, both) = left_and_both.split_at(both_start);

    let left_box = node_box.clipped(axis, pos, true);
    let right_box = node_box.clipped(axis, pos, false);

    let mut left_indices: Vec<u32> = Vec::with_capacity(left_only.len() + both.len());
    let mut right_indices: Vec<u32> = Vec::with_capacity(right_only.len() + both.len());
    left_indices.extend_from_slice(left_only);
    right_indices.extend_from_slice(right_only);

    let mut pruned = 0u32;
    for &prim in both {
        classification.set(prim as usize, Classification::Processed);
        if clip {
            let lb = adapter.clipped_bounding_box(prim, left_box);
            if !lb.is_empty() {
                left_indices.push(prim);
            } else {
                pruned += 1;
            }
            let rb = adapter.clipped_bounding_box(prim, right_box);
            if !rb.is_empty() {
                right_indices.push(prim);
            } else {
                pruned += 1;
            }
        } else {
            left_indices.push(prim);
            right_indices.push(prim);
        }
    }

    PartitionResult {
        left_indices,
        right_indices,
        left_box,
        right_box,
        pruned,
    }
}

#[cfg(test)]
mod sweep_tests {
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

    fn two_triangle_soup() -> TriangleSoup {
        let mut soup = TriangleSoup::new();
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
        soup
    }

    #[test]
    fn find_best_split_separates_two_disjoint_triangles() {
        let soup = two_triangle_soup();
        let indices = vec![0u32, 1u32];
        let node_box = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: 0. }, Vec3 { x: 1., y: 1., z: 1. });
        let events = generate_events(&soup, &indices, node_box, true);
        let best = find_best_split(&events, 2, node_box, &cost());
        assert!(best.cost.is_finite());
        assert_eq!(best.num_left, 1);
        assert_eq!(best.num_right, 1);
        assert!(best.position > 0.2 && best.position < 0.8);
    }

    #[test]
    fn no_events_yields_no_split() {
        let node_box = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: 0. }, Vec3 { x: 1., y: 1., z: 1. });
        let best = find_best_split(&[], 0, node_box, &cost());
        assert!(best.cost.is_infinite());
    }

    #[test]
    fn bad_refines_forces_leaf_when_limit_reached() {
        let best = SplitCandidate {
            cost: 1000.,
            axis: 0,
            position: 0.,
            num_left: 1,
            num_right: 1,
            planar_left: true,
        };
        let forced = bad_refines_is_leaf(&best, 2, 10., &cost(), 3, 3);
        assert!(forced);
    }

    #[test]
    fn bad_refines_allows_split_below_limit() {
        let best = SplitCandidate {
            cost: 5.,
            axis: 0,
            position: 0.,
            num_left: 1,
            num_right: 1,
            planar_left: true,
        };
        let forced = bad_refines_is_leaf(&best, 2, 100., &cost(), 0, 3);
        assert!(!forced);
    }

    #[test]
    fn partition_separates_disjoint_triangles_without_pruning() {
        let soup = two_triangle_soup();
        let indices = vec![0u32, 1u32];
        let node_box = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: 0. }, Vec3 { x: 1., y: 1., z: 1. });
        let split = SplitCandidate {
            cost: 0.,
            axis: 0,
            position: 0.5,
            num_left: 1,
            num_right: 1,
            planar_left: true,
        };
        let mut classification = ClassificationStore::new(2);
        let result = partition_with_perfect_splits(&soup, indices, node_box, &split, true, &mut classification);
        assert_eq!(result.left_indices, vec![0]);
        assert_eq!(result.right_indices, vec![1]);
        assert_eq!(result.pruned, 0);
    }

    #[test]
    fn straddling_triangle_is_clipped_into_both_children() {
        let mut soup = TriangleSoup::new();
        soup.add_mesh(
            vec![
                Vec3 { x: 0.1, y: 0., z: 0. },
                Vec3 { x: 0.9, y: 0., z: 0. },
                Vec3 { x: 0.1, y: 0.5, z: 0. },
            ],
            None,
            vec![Triangle { indices: [0, 1, 2] }],
        );
        let indices = vec![0u32];
        let node_box = BBox3::from_pnts(Vec3 { x: 0., y: 0., z: 0. }, Vec3 { x: 1., y: 1., z: 1. });
        let split = SplitCandidate {
            cost: 0.,
            axis: 0,
            position: 0.5,
            num_left: 1,
            num_right: 1,
            planar_left: true,
        };
        let mut classification = ClassificationStore::new(1);
        let result = partition_with_perfect_splits(&soup, indices, node_box, &split, true, &mut classification);
        assert_eq!(result.left_indices, vec![0]);
        assert_eq!(result.right_indices, vec![0]);
    }
}
