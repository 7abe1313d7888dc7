//! Error types for building a kd-tree. Grounded in alembic-rs's
//! `thiserror`-derived enum (`#[error("...")]` per variant, `Result<T>`
//! alias), adapted to a builder's failure modes rather than a file format's.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    /// A `BuildParams` value failed its own validation (e.g. a bin count of
    /// zero, or a traversal/intersection cost of zero or less).
    #[error("invalid build parameters: {0}")]
    ConfigurationError(String),

    /// More primitives were registered than the packed node format's
    /// 30-bit primitive-count field can address.
    #[error("primitive count {0} exceeds the maximum of {1}")]
    CapacityError(usize, usize),

    /// The geometry adapter returned a degenerate or non-finite bounding
    /// box, or the cost evaluation broke down in both the min-max binning
    /// pass and its exact edge-event sweep fallback.
    #[error("tree construction could not proceed: {0}")]
    IntegrityError(String),
}

pub type Result<T> = std::result::Result<T, BuildError>;
