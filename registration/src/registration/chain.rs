//! Per-iteration transform log.

use super::nonrigid::ThinPlateSpline;
use nalgebra::{Matrix4, Point3};

/// One per-iteration transform, tagged by kind.
///
/// The set of kinds is closed: every iteration of the linear loop appends a
/// rigid entry, and at most one trailing non-rigid entry is appended by the
/// optional refinement step.
#[derive(Debug, Clone)]
pub enum Transform {
    Rigid(Matrix4<f64>),
    NonRigid(ThinPlateSpline),
}

impl Transform {
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        match self {
            Transform::Rigid(m) => m.transform_point(p),
            Transform::NonRigid(tps) => tps.apply(p),
        }
    }

    pub fn is_rigid(&self) -> bool {
        matches!(self, Transform::Rigid(_))
    }
}

/// Append-only sequence of per-iteration transforms, owned by exactly one
/// registration context.
///
/// Transforms are applied to data in append order; replaying the chain from
/// the original source set gives the same points as applying
/// [`TransformChain::net_rigid`] once, for a rigid-only chain.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    entries: Vec<Transform>,
}

impl TransformChain {
    pub fn push(&mut self, transform: Transform) {
        self.entries.push(transform);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Transform] {
        &self.entries
    }

    /// Net rigid contribution: the matrices of all rigid entries composed
    /// in application order. Non-rigid entries are skipped; they are
    /// reported separately.
    pub fn net_rigid(&self) -> Matrix4<f64> {
        let mut net = Matrix4::identity();
        for entry in &self.entries {
            if let Transform::Rigid(m) = entry {
                net = m * net;
            }
        }
        net
    }

    /// The trailing non-rigid entry, if the chain carries one.
    pub fn non_rigid(&self) -> Option<&ThinPlateSpline> {
        self.entries.iter().rev().find_map(|entry| match entry {
            Transform::NonRigid(tps) => Some(tps),
            Transform::Rigid(_) => None,
        })
    }
}
