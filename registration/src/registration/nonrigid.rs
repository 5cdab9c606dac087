//! One-shot thin-plate-spline refinement.

use cl_core::{Error, Result};
use nalgebra::{DMatrix, Matrix3x4, Point3, Vector3, Vector4};
use tracing::debug;

/// Smooth interpolating deformation through landmark pairs.
///
/// `f(p) = A·[1 p] + Σ wᵢ · U(|p − cᵢ|)` with the 3D biharmonic kernel
/// `U(r) = r`. The landmark centers and weights are the warp basis; they
/// are public so downstream writers can serialize the deformation.
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    pub centers: Vec<Point3<f64>>,
    pub weights: Vec<Vector3<f64>>,
    /// Affine part; columns are the coefficients of `[1, x, y, z]`.
    pub affine: Matrix3x4<f64>,
}

impl ThinPlateSpline {
    pub fn apply(&self, p: &Point3<f64>) -> Point3<f64> {
        let mut out = self.affine * Vector4::new(1.0, p.x, p.y, p.z);
        for (center, weight) in self.centers.iter().zip(&self.weights) {
            out += weight * (p - center).norm();
        }
        Point3::from(out)
    }
}

/// Fits a thin-plate spline through a trusted correspondence subset.
///
/// Used at most once per run, as the final refinement; it is never
/// iterated.
#[derive(Debug, Clone, Copy)]
pub struct NonRigidSolver {
    /// Regularization added to the kernel diagonal; larger values trade
    /// exact interpolation for smoothness.
    pub sigma: f64,
    /// Percentage of trusted pairs kept as landmarks, to bound the dense
    /// solve on large trusted sets.
    pub sample_ratio: u32,
}

impl NonRigidSolver {
    pub fn solve(
        &self,
        source: &[Point3<f64>],
        target: &[Point3<f64>],
    ) -> Result<ThinPlateSpline> {
        let ratio = self.sample_ratio.clamp(1, 100) as usize;
        let stride = (100 + ratio - 1) / ratio;
        let (centers, targets): (Vec<Point3<f64>>, Vec<Point3<f64>>) = source
            .iter()
            .zip(target)
            .step_by(stride)
            .map(|(s, t)| (*s, *t))
            .unzip();

        let n = centers.len();
        if source.len() != target.len() || n < 4 {
            return Err(Error::UnderdeterminedFit {
                got: n.min(target.len()),
                need: 4,
            });
        }
        debug!(landmarks = n, sigma = self.sigma, "fitting thin-plate spline");

        // Bordered system: [K + σI  P; Pᵀ  0] [w; a] = [v; 0]
        let dim = n + 4;
        let mut system = DMatrix::<f64>::zeros(dim, dim);
        let mut rhs = DMatrix::<f64>::zeros(dim, 3);
        for i in 0..n {
            for j in 0..n {
                system[(i, j)] = (centers[i] - centers[j]).norm();
            }
            system[(i, i)] += self.sigma;

            let p = [1.0, centers[i].x, centers[i].y, centers[i].z];
            for (j, &value) in p.iter().enumerate() {
                system[(i, n + j)] = value;
                system[(n + j, i)] = value;
            }

            rhs[(i, 0)] = targets[i].x;
            rhs[(i, 1)] = targets[i].y;
            rhs[(i, 2)] = targets[i].z;
        }

        let solution = system.lu().solve(&rhs).ok_or_else(|| {
            Error::NumericalDegeneracy("singular thin-plate system (collinear landmarks?)".into())
        })?;

        let weights = (0..n)
            .map(|i| Vector3::new(solution[(i, 0)], solution[(i, 1)], solution[(i, 2)]))
            .collect();
        let mut affine = Matrix3x4::zeros();
        for d in 0..3 {
            for j in 0..4 {
                affine[(d, j)] = solution[(n + j, d)];
            }
        }

        Ok(ThinPlateSpline {
            centers,
            weights,
            affine,
        })
    }
}
