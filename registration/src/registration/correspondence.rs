//! Correspondence estimation and Least-Trimmed-Squares selection.

use crate::spatial::NearestNeighbor;
use cl_core::{Error, PointSet, Result};
use nalgebra::Point3;
use std::cmp::Ordering;

/// One source point paired with its current closest target point.
#[derive(Debug, Clone)]
pub struct Correspondence {
    pub source_index: usize,
    pub target_point: Point3<f64>,
    pub squared_residual: f64,
}

/// All correspondences of one iteration plus the aggregate fit metric.
#[derive(Debug, Clone)]
pub struct CorrespondenceSet {
    pub pairs: Vec<Correspondence>,
    /// Mean Euclidean residual over the entire source set, independent of
    /// the trim ratio. Drives convergence and ratio ranking, never the
    /// solver itself.
    pub mean_residual: f64,
}

/// Query the target index for every source point.
///
/// Fails with [`Error::NumericalDegeneracy`] on an empty index or a
/// non-finite squared distance; a corrupt index must abort the run rather
/// than produce a corrupt transform.
pub fn estimate(source: &PointSet, index: &dyn NearestNeighbor) -> Result<CorrespondenceSet> {
    if source.is_empty() {
        return Err(Error::InputError("empty source point set".into()));
    }

    let mut pairs = Vec::with_capacity(source.len());
    let mut total = 0.0;
    for (source_index, point) in source.points.iter().enumerate() {
        let (target_point, squared_residual) = index
            .nearest(point)
            .ok_or_else(|| Error::NumericalDegeneracy("empty target index".into()))?;
        if !squared_residual.is_finite() {
            return Err(Error::NumericalDegeneracy(format!(
                "non-finite distance for source point {source_index}"
            )));
        }
        total += squared_residual.sqrt();
        pairs.push(Correspondence {
            source_index,
            target_point,
            squared_residual,
        });
    }

    let mean_residual = total / pairs.len() as f64;
    Ok(CorrespondenceSet {
        pairs,
        mean_residual,
    })
}

/// Trusted subset retained for transform fitting, reordered into parallel
/// point arrays.
#[derive(Debug, Clone)]
pub struct TrimmedCorrespondences {
    pub source_points: Vec<Point3<f64>>,
    pub target_points: Vec<Point3<f64>>,
}

impl TrimmedCorrespondences {
    pub fn len(&self) -> usize {
        self.source_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_points.is_empty()
    }
}

/// Keep the `k = floor(N · lts_ratio / 100)` correspondences with the
/// smallest residual.
///
/// The sort is stable, so ties keep their original point order. Points
/// outside the trusted subset stay in the source set and are re-evaluated
/// next iteration; only the fit ignores them.
pub fn select(
    source: &PointSet,
    correspondences: &CorrespondenceSet,
    lts_ratio: u32,
) -> TrimmedCorrespondences {
    let n = correspondences.pairs.len();
    let k = n * lts_ratio as usize / 100;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        correspondences.pairs[a]
            .squared_residual
            .partial_cmp(&correspondences.pairs[b].squared_residual)
            .unwrap_or(Ordering::Equal)
    });

    let mut source_points = Vec::with_capacity(k);
    let mut target_points = Vec::with_capacity(k);
    for &rank in order.iter().take(k) {
        let pair = &correspondences.pairs[rank];
        source_points.push(source.points[pair.source_index]);
        target_points.push(pair.target_point);
    }
    TrimmedCorrespondences {
        source_points,
        target_points,
    }
}
