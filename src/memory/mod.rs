//! Scratch-memory collaborators for the kd-tree builder: fast,
//! fragmentation-free bump allocation that can also give scratch space back
//! as recursive subtrees finish.

pub mod arena;
pub mod blocked_vector;
pub mod classification;
pub mod util;

pub use arena::{Arena, Mark};
pub use blocked_vector::BlockedVector;
pub use classification::{Classification, ClassificationStore};
