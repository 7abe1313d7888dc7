// Orchestrates construction: chooses between the min-max binner and the
// exact event sweeper per node, partitions, recurses, retracts, and finally
// compacts the preliminary tree into a `NodeStore`. Builds an owned
// preliminary tree first (as a plain `Box<BuildNode>` rather than an arena
// allocation, since Rust's ownership already gives a subtree exactly the
// cheap, all-at-once teardown a retraction needs), then walks it depth-first
// into the final packed array.
//
// Parallelism offloads a node's right-subtree build onto a
// `crossbeam::thread::scope`-scoped thread while the left child continues
// on the calling thread, bounded by a spawn budget derived once from
// available parallelism and joined before the parent returns. A scoped
// thread already owns its slice of primitive indices outright, so this
// needs no worker-assignment map or mailbox to hand scratch memory across
// safely. Construction order, not worker interleaving, determines the
// final array, so the result is bit-identical regardless of thread count.
// See DESIGN.md for the full rationale.

use crate::error::{BuildError, Result};
use crate::geometry::GeometryAdapter;
use crate::kdtree::binner::MinMaxBinner;
use crate::kdtree::events::EdgeEvent;
use crate::kdtree::node::{KDNode, NodeStore, MAX_RELATIVE_OFFSET};
use crate::kdtree::sweep::{self, SplitCandidate};
use crate::math::bbox::BBox3;
use crate::math::vector::Vec3;
use crate::memory::{Arena, ClassificationStore};

use std::sync::atomic::{AtomicU64, Ordering};

/// The traversal/intersection cost coefficients and empty-space bonus
/// shared by the binner and the event sweeper.
#[derive(Clone, Copy, Debug)]
pub struct CostParams {
    pub k_trav: f64,
    pub k_query: f64,
    pub empty_bonus: f64,
}

/// Tunable construction parameters. Defaults match the reference values;
/// every field is settable before the first `build()` call.
#[derive(Clone, Debug)]
pub struct BuildParams {
    pub k_trav: f64,
    pub k_query: f64,
    pub empty_space_bonus: f64,
    pub stop_prims: u32,
    pub max_bad_refines: u32,
    pub exact_prim_threshold: u32,
    pub min_max_bins: usize,
    pub clip: bool,
    pub retract: bool,
    pub parallel_build: bool,
}

impl Default for BuildParams {
    fn default() -> Self {
        BuildParams {
            k_trav: 15.,
            k_query: 20.,
            empty_space_bonus: 0.9,
            stop_prims: 6,
            max_bad_refines: 3,
            exact_prim_threshold: 65536,
            min_max_bins: 128,
            clip: true,
            retract: true,
            parallel_build: true,
        }
    }
}

impl BuildParams {
    pub fn cost(&self) -> CostParams {
        CostParams {
            k_trav: self.k_trav,
            k_query: self.k_query,
            empty_bonus: self.empty_space_bonus,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k_trav <= 0. || self.k_query <= 0. {
            return Err(BuildError::ConfigurationError(
                "k_trav and k_query must both be positive".to_string(),
            ));
        }
        if !(self.empty_space_bonus > 0. && self.empty_space_bonus <= 1.) {
            return Err(BuildError::ConfigurationError(
                "empty_space_bonus must lie in (0, 1]".to_string(),
            ));
        }
        if self.min_max_bins <= 1 {
            return Err(BuildError::ConfigurationError(
                "min_max_bins must be greater than 1".to_string(),
            ));
        }
        Ok(())
    }

    fn max_depth(prim_count: u32) -> u32 {
        if prim_count == 0 {
            return 0;
        }
        let d = (8. + 1.3 * (prim_count as f64).log2()).ceil();
        (d as u32).min(48)
    }
}

/// Build-time counters, matching the build context's seven counters.
/// Atomic rather than per-thread-then-merged: every recursive call (whether
/// on the dispatcher or a spawned worker) bumps the same shared counters,
/// which is simpler than threading per-thread accumulators through the
/// scoped spawns and merging them afterward, at the cost of a relaxed
/// atomic increment per node instead of a plain one.
#[derive(Default, Debug)]
pub struct BuildStats {
    pub inner: AtomicU64,
    pub leaf: AtomicU64,
    pub non_empty_leaf: AtomicU64,
    pub prim_index: AtomicU64,
    pub retracted: AtomicU64,
    pub pruned: AtomicU64,
    pub total: AtomicU64,
}

pub struct BuildOutput {
    pub store: NodeStore,
    pub prim_indices: Vec<u32>,
    pub root_box: BBox3<f64>,
    pub stats: BuildStats,
    /// The root node's final SAH cost estimate (traversal + expected query
    /// cost), as chosen by the builder. `0.` for an empty scene.
    pub root_cost: f64,
}

/// Per-thread scratch: a reusable min-max binner, a classification array
/// sized to the global primitive count, and an event arena. A fresh context
/// is created for every spawned worker; the dispatcher's own context lives
/// for the whole build.
struct BuildContext {
    binner: MinMaxBinner,
    classification: ClassificationStore,
    event_arena: Arena<EdgeEvent>,
}

impl BuildContext {
    fn new(params: &BuildParams, global_prim_count: usize) -> Self {
        BuildContext {
            binner: MinMaxBinner::new(params.min_max_bins),
            classification: ClassificationStore::new(global_prim_count),
            event_arena: Arena::new(4096),
        }
    }
}

/// Generates this node's event list into the context's arena, sweeps it,
/// and releases the arena immediately: the event list's lifetime never
/// needs to outlive this one call, so the LIFO release happens right where
/// the allocation happened rather than spanning the recursion.
fn sweep_split<G: GeometryAdapter>(
    adapter: &G,
    ctx: &mut BuildContext,
    indices: &[u32],
    node_box: BBox3<f64>,
    clip: bool,
    prim_count: u32,
    cost: &CostParams,
) -> SplitCandidate {
    let events = sweep::generate_events(adapter, indices, node_box, clip);
    let (mark, slab) = ctx.event_arena.allocate(events.len());
    slab.copy_from_slice(&events);
    let best = sweep::find_best_split(slab, prim_count, node_box, cost);
    ctx.event_arena.release(mark);
    best
}

enum BuildNode {
    Leaf(Vec<u32>),
    Inner {
        axis: usize,
        split: f32,
        left: Box<BuildNode>,
        right: Box<BuildNode>,
    },
}

fn make_leaf(stats: &BuildStats, params: &BuildParams, indices: Vec<u32>) -> (BuildNode, f64) {
    stats.leaf.fetch_add(1, Ordering::Relaxed);
    if !indices.is_empty() {
        stats.non_empty_leaf.fetch_add(1, Ordering::Relaxed);
    }
    stats.prim_index.fetch_add(indices.len() as u64, Ordering::Relaxed);
    let cost = params.k_query * indices.len() as f64;
    (BuildNode::Leaf(indices), cost)
}

#[allow(clippy::too_many_arguments)]
fn build_node<G: GeometryAdapter + Sync>(
    adapter: &G,
    ctx: &mut BuildContext,
    stats: &BuildStats,
    params: &BuildParams,
    indices: Vec<u32>,
    node_box: BBox3<f64>,
    depth: u32,
    max_depth: u32,
    bad_refines: u32,
    spawn_budget: u32,
) -> (BuildNode, f64) {
    stats.total.fetch_add(1, Ordering::Relaxed);
    let prim_count = indices.len() as u32;

    if prim_count <= params.stop_prims || depth >= max_depth {
        return make_leaf(stats, params, indices);
    }

    let cost = params.cost();

    let split = if prim_count > params.exact_prim_threshold {
        ctx.binner.bin(adapter, &indices, node_box);
        let b = ctx.binner.minimize_cost(prim_count, node_box, &cost);
        if b.cost.is_finite() {
            SplitCandidate {
                cost: b.cost,
                axis: b.axis,
                position: b.position,
                num_left: b.num_left,
                num_right: b.num_right,
                planar_left: true,
            }
        } else {
            log::warn!("min-max binning found no viable split at depth {}, falling back to event sweep", depth);
            sweep_split(adapter, ctx, &indices, node_box, params.clip, prim_count, &cost)
        }
    } else {
        sweep_split(adapter, ctx, &indices, node_box, params.clip, prim_count, &cost)
    };

    if split.cost.is_infinite() {
        return make_leaf(stats, params, indices);
    }

    let leaf_cost_here = params.k_query * prim_count as f64;
    if sweep::bad_refines_is_leaf(&split, prim_count, leaf_cost_here, &cost, bad_refines, params.max_bad_refines) {
        return make_leaf(stats, params, indices);
    }
    let next_bad_refines = if split.cost >= prim_count as f64 * cost.k_query {
        bad_refines + 1
    } else {
        bad_refines
    };

    let orig_indices = if params.retract { Some(indices.clone()) } else { None };

    let result = sweep::partition_with_perfect_splits(adapter, indices, node_box, &split, params.clip, &mut ctx.classification);
    stats.pruned.fetch_add(result.pruned as u64, Ordering::Relaxed);

    let parent_area = node_box.surface_area();
    let p_left = if parent_area > 0. { result.left_box.surface_area() / parent_area } else { 0. };
    let p_right = if parent_area > 0. { result.right_box.surface_area() / parent_area } else { 0. };

    let (left_node, left_cost, right_node, right_cost) = if params.parallel_build && spawn_budget > 0 {
        let left_box = result.left_box;
        let right_box = result.right_box;
        let left_indices = result.left_indices;
        let right_indices = result.right_indices;
        let global_prim_count = ctx.classification.len();

        crossbeam::thread::scope(|scope| {
            let handle = scope.spawn(move |_| {
                let mut child_ctx = BuildContext::new(params, global_prim_count);
                build_node(
                    adapter,
                    &mut child_ctx,
                    stats,
                    params,
                    right_indices,
                    right_box,
                    depth + 1,
                    max_depth,
                    next_bad_refines,
                    spawn_budget - 1,
                )
            });
            let (ln, lc) = build_node(
                adapter,
                ctx,
                stats,
                params,
                left_indices,
                left_box,
                depth + 1,
                max_depth,
                next_bad_refines,
                spawn_budget - 1,
            );
            // The worker's panic (if any) is already caught by
            // `ScopedJoinHandle::join`; resume it on the dispatcher instead
            // of swallowing it into a generic message, so a bug in a
            // spawned subtree build surfaces with its original payload.
            let (rn, rc) = match handle.join() {
                Ok(result) => result,
                Err(payload) => std::panic::resume_unwind(payload),
            };
            (ln, lc, rn, rc)
        })
        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
    } else {
        let (ln, lc) = build_node(
            adapter,
            ctx,
            stats,
            params,
            result.left_indices,
            result.left_box,
            depth + 1,
            max_depth,
            next_bad_refines,
            0,
        );
        let (rn, rc) = build_node(
            adapter,
            ctx,
            stats,
            params,
            result.right_indices,
            result.right_box,
            depth + 1,
            max_depth,
            next_bad_refines,
            0,
        );
        (ln, lc, rn, rc)
    };

    let final_cost = cost.k_trav + p_left * left_cost + p_right * right_cost;

    if params.retract && final_cost >= prim_count as f64 * cost.k_query {
        stats.retracted.fetch_add(1, Ordering::Relaxed);
        return make_leaf(stats, params, orig_indices.expect("retract implies orig_indices was kept"));
    }

    stats.inner.fetch_add(1, Ordering::Relaxed);
    (
        BuildNode::Inner {
            axis: split.axis,
            split: split.position as f32,
            left: Box::new(left_node),
            right: Box::new(right_node),
        },
        final_cost,
    )
}

fn compact_node(store: &mut NodeStore, prim_indices: &mut Vec<u32>, node: &BuildNode, my_index: usize) {
    match node {
        BuildNode::Leaf(indices) => {
            let start = prim_indices.len() as u32;
            prim_indices.extend_from_slice(indices);
            let end = prim_indices.len() as u32;
            store.set(my_index, KDNode::leaf(start, end));
        }
        BuildNode::Inner { axis, split, left, right } => {
            let pair = store.allocate_pair();
            let raw_offset = (pair - my_index) as u32;
            let (child_ref, indirection) = if raw_offset <= MAX_RELATIVE_OFFSET {
                (raw_offset, false)
            } else {
                (store.push_indirection(pair as u32), true)
            };
            store.set(my_index, KDNode::inner(*axis as u8, *split, child_ref, indirection));
            compact_node(store, prim_indices, left, pair);
            compact_node(store, prim_indices, right, pair + 1);
        }
    }
}

fn enlarge_root_box(b: BBox3<f64>) -> BBox3<f64> {
    const EPS: f64 = 1e-3;
    let d = b.diagonal();
    BBox3 {
        pmin: Vec3 {
            x: b.pmin.x - (EPS * d.x + EPS),
            y: b.pmin.y - (EPS * d.y + EPS),
            z: b.pmin.z - (EPS * d.z + EPS),
        },
        pmax: Vec3 {
            x: b.pmax.x + (EPS * d.x + EPS),
            y: b.pmax.y + (EPS * d.y + EPS),
            z: b.pmax.z + (EPS * d.z + EPS),
        },
    }
}

/// Builds a complete kd-tree over every primitive `adapter` reports,
/// returning the packed node store, the flattened primitive-index array,
/// the (epsilon-enlarged) root bounding box, and build statistics.
pub fn build<G: GeometryAdapter + Sync>(adapter: &G, params: &BuildParams) -> Result<BuildOutput> {
    params.validate()?;

    let prim_count = adapter.primitive_count();
    const MAX_PRIMS: usize = (1 << 30) - 1;
    if prim_count as usize > MAX_PRIMS {
        return Err(BuildError::CapacityError(prim_count as usize, MAX_PRIMS));
    }

    let mut store = NodeStore::new();
    let stats = BuildStats::default();

    if prim_count == 0 {
        store.push(KDNode::leaf(0, 0));
        log::debug!("building kd-tree over an empty primitive set");
        return Ok(BuildOutput {
            store,
            prim_indices: Vec::new(),
            root_box: BBox3::new(),
            stats,
            root_cost: 0.,
        });
    }

    let mut root_box = BBox3::new();
    for p in 0..prim_count {
        let b = adapter.bounding_box(p);
        if b.pmin.x > b.pmax.x || b.pmin.y > b.pmax.y || b.pmin.z > b.pmax.z {
            return Err(BuildError::IntegrityError(format!(
                "primitive {} has an inverted bounding box",
                p
            )));
        }
        root_box = root_box.combine_bnd(b);
    }
    log::debug!("root box spans {} primitives", prim_count);

    let indices: Vec<u32> = (0..prim_count).collect();
    let max_depth = BuildParams::max_depth(prim_count);

    let spawn_budget = if params.parallel_build {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        (cores.max(1) as u32).next_power_of_two().trailing_zeros()
    } else {
        0
    };

    let mut ctx = BuildContext::new(params, prim_count as usize);
    log::trace!("starting build: max_depth={}, spawn_budget={}", max_depth, spawn_budget);
    let (root_node, root_cost) = build_node(adapter, &mut ctx, &stats, params, indices, root_box, 1, max_depth, 0, spawn_budget);

    let mut prim_indices = Vec::new();
    let root_index = store.push(KDNode::leaf(0, 0));
    compact_node(&mut store, &mut prim_indices, &root_node, root_index);

    log::debug!(
        "build complete: {} inner, {} leaf ({} non-empty), {} retracted, {} pruned",
        stats.inner.load(Ordering::Relaxed),
        stats.leaf.load(Ordering::Relaxed),
        stats.non_empty_leaf.load(Ordering::Relaxed),
        stats.retracted.load(Ordering::Relaxed),
        stats.pruned.load(Ordering::Relaxed),
    );

    Ok(BuildOutput {
        store,
        prim_indices,
        root_box: enlarge_root_box(root_box),
        stats,
        root_cost,
    })
}
