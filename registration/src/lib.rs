//! Point-set registration for curve-like anatomical structures
//!
//! This crate aligns two unordered 3D point sets (e.g. vessel centerlines
//! extracted from different imaging sessions) without a priori point
//! correspondence:
//! - Trimmed ICP with a Least-Trimmed-Squares robustness policy
//! - Closed-form rigid (Procrustes) solving per iteration
//! - Automatic search over trim ratios
//! - Optional one-shot thin-plate-spline refinement

pub mod registration;
pub mod spatial;

pub use registration::chain::{Transform, TransformChain};
pub use registration::correspondence::{Correspondence, CorrespondenceSet, TrimmedCorrespondences};
pub use registration::nonrigid::{NonRigidSolver, ThinPlateSpline};
pub use registration::run::{RegistrationContext, RegistrationRun, RunParams, RunReport, RunStatus};
pub use registration::{
    register_point_sets, RegistrationOptions, RegistrationOutcome,
};
pub use spatial::{KdTree, NearestNeighbor};

pub use cl_core::{Error, PointSet, Result};
