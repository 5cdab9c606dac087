//! Core value types shared by the centerline registration crates.

pub mod geometry;
pub mod point_set;

pub use geometry::{decompose_rigid, invert_rigid, rigid_from_parts, RigidParts};
pub use point_set::{Aabb, PointSet};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Empty or unusable point data after pre-filtering.
    #[error("no usable input data: {0}")]
    InputError(String),

    /// A non-finite value surfaced from the nearest-neighbor query or a
    /// singular linear solve.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// Too few trusted correspondences to determine a transform.
    #[error("insufficient correspondences: got {got}, need at least {need}")]
    UnderdeterminedFit { got: usize, need: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
