//! The spatial acceleration structure: a parallel SAH kd-tree builder and a
//! traverser over its packed node array, built around the same shape a
//! bucketed-SAH BVH uses wherever the two structures do the same job: a
//! `partition`-based split into left/right index ranges, a fixed traversal
//! stack, a cost-driven leaf-or-split decision.

pub mod binner;
pub mod builder;
pub mod events;
pub mod node;
pub mod sweep;
pub mod traverse;
pub mod tree;

pub use builder::BuildParams;
pub use tree::KdTree;
