//! The iterative control loop for one fixed trim ratio.

use super::chain::{Transform, TransformChain};
use super::correspondence;
use super::nonrigid::NonRigidSolver;
use super::rigid;
use crate::spatial::NearestNeighbor;
use cl_core::{PointSet, Result};
use std::sync::Arc;
use tracing::debug;

/// Sentinel standing in for the previous-iteration metric before the first
/// iteration has produced one.
const PREVIOUS_METRIC_SENTINEL: f64 = 1.0e6;

/// Per-run mutable state.
///
/// The source set and the transform chain are exclusively owned by the run;
/// the target set and its index are shared read-only with every context
/// forked from the same seed.
pub struct RegistrationContext {
    pub source: PointSet,
    pub target: Arc<PointSet>,
    pub index: Arc<dyn NearestNeighbor + Send + Sync>,
    pub lts_ratio: u32,
    /// Mean residual of the most recent correspondence pass.
    pub metric: f64,
    pub chain: TransformChain,
    /// Whether moving and fixed roles were swapped before this run.
    pub inverted: bool,
}

impl RegistrationContext {
    pub fn new(
        source: PointSet,
        target: Arc<PointSet>,
        index: Arc<dyn NearestNeighbor + Send + Sync>,
        lts_ratio: u32,
        inverted: bool,
    ) -> Self {
        Self {
            source,
            target,
            index,
            lts_ratio,
            metric: f64::MAX,
            chain: TransformChain::default(),
            inverted,
        }
    }

    /// Independent copy for a candidate run: mutable state (source points,
    /// chain, ratio, metric) is deep-copied, the target and index stay
    /// shared.
    pub fn fork(&self) -> Self {
        Self {
            source: self.source.clone(),
            target: Arc::clone(&self.target),
            index: Arc::clone(&self.index),
            lts_ratio: self.lts_ratio,
            metric: self.metric,
            chain: self.chain.clone(),
            inverted: self.inverted,
        }
    }

    fn apply_to_all(&mut self, transform: &Transform) {
        let moved = self
            .source
            .points
            .iter()
            .map(|p| transform.apply(p))
            .collect();
        self.source = PointSet::new(moved);
    }
}

/// Terminal state of a run. Numerical failures are reported as errors, not
/// as a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Converged,
    MaxIterationsReached,
}

/// Convergence parameters of the iterative loop.
#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    pub stop_threshold: f64,
    pub max_iterations: usize,
}

/// How a run terminated.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub status: RunStatus,
    pub iterations: usize,
}

/// Correspond → trim → solve → apply → append loop for one fixed LTS ratio.
pub struct RegistrationRun {
    pub params: RunParams,
}

impl RegistrationRun {
    pub fn new(params: RunParams) -> Self {
        Self { params }
    }

    /// Drive `ctx` until convergence or the iteration cap.
    ///
    /// The metric of an iteration is measured before that iteration's
    /// transform is applied; the transform is applied to every source
    /// point, not just the trusted subset, so previously excluded points
    /// are re-evaluated under the improved alignment.
    pub fn run(&self, ctx: &mut RegistrationContext) -> Result<RunReport> {
        let mut previous = PREVIOUS_METRIC_SENTINEL;
        for iteration in 1..=self.params.max_iterations {
            let correspondences = correspondence::estimate(&ctx.source, ctx.index.as_ref())?;
            let trimmed = correspondence::select(&ctx.source, &correspondences, ctx.lts_ratio);
            let matrix = rigid::solve(&trimmed.source_points, &trimmed.target_points)?;

            let transform = Transform::Rigid(matrix);
            ctx.apply_to_all(&transform);
            ctx.chain.push(transform);
            ctx.metric = correspondences.mean_residual;

            let difference = correspondences.mean_residual - previous;
            debug!(
                iteration,
                lts_ratio = ctx.lts_ratio,
                metric = correspondences.mean_residual,
                difference,
                "registration iteration"
            );
            if difference.abs() < self.params.stop_threshold {
                return Ok(RunReport {
                    status: RunStatus::Converged,
                    iterations: iteration,
                });
            }
            previous = correspondences.mean_residual;
        }
        Ok(RunReport {
            status: RunStatus::MaxIterationsReached,
            iterations: self.params.max_iterations,
        })
    }
}

/// One-shot non-rigid refinement, executed after the linear loop has
/// terminated: one more correspondence pass, a thin-plate fit through the
/// trusted subset, and a final warp of the whole source set.
pub fn refine_nonrigid(ctx: &mut RegistrationContext, solver: &NonRigidSolver) -> Result<()> {
    let correspondences = correspondence::estimate(&ctx.source, ctx.index.as_ref())?;
    let trimmed = correspondence::select(&ctx.source, &correspondences, ctx.lts_ratio);
    let warp = solver.solve(&trimmed.source_points, &trimmed.target_points)?;

    let transform = Transform::NonRigid(warp);
    ctx.apply_to_all(&transform);
    ctx.chain.push(transform);

    // Re-measure so the reported metric reflects the warped alignment.
    let after = correspondence::estimate(&ctx.source, ctx.index.as_ref())?;
    ctx.metric = after.mean_residual;
    debug!(metric = ctx.metric, "non-rigid refinement applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::KdTree;
    use approx::assert_relative_eq;
    use cl_core::geometry::rigid_from_parts;
    use nalgebra::{Point3, Rotation3, Vector3};

    fn curve(n: usize) -> Vec<Point3<f64>> {
        (0..n)
            .map(|i| {
                let t = 100.0 * i as f64 / (n - 1) as f64;
                Point3::new(t, 0.01 * t * t, 1e-4 * t * t * t)
            })
            .collect()
    }

    fn context_for(
        source: Vec<Point3<f64>>,
        target: Vec<Point3<f64>>,
        lts_ratio: u32,
    ) -> RegistrationContext {
        let target = Arc::new(PointSet::new(target));
        let index: Arc<dyn NearestNeighbor + Send + Sync> =
            Arc::new(KdTree::build(&target.points));
        RegistrationContext::new(PointSet::new(source), target, index, lts_ratio, false)
    }

    #[test]
    fn identical_sets_converge_immediately() {
        let points = curve(30);
        let mut ctx = context_for(points.clone(), points, 100);
        let run = RegistrationRun::new(RunParams {
            stop_threshold: 1e-6,
            max_iterations: 100,
        });

        let report = run.run(&mut ctx).unwrap();
        assert_eq!(report.status, RunStatus::Converged);
        assert!(report.iterations <= 3);
        assert!(ctx.metric < 1e-9);
        assert_relative_eq!(
            ctx.chain.net_rigid(),
            nalgebra::Matrix4::identity(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn recovers_small_rigid_offset() {
        let source = curve(40);
        let truth = rigid_from_parts(
            Rotation3::from_axis_angle(&Vector3::z_axis(), 0.05).matrix(),
            &Vector3::new(2.0, -1.0, 0.5),
        );
        let target: Vec<_> = source.iter().map(|p| truth.transform_point(p)).collect();

        let mut ctx = context_for(source, target, 100);
        let run = RegistrationRun::new(RunParams {
            stop_threshold: 1e-9,
            max_iterations: 100,
        });
        let report = run.run(&mut ctx).unwrap();

        assert_eq!(report.status, RunStatus::Converged);
        assert_relative_eq!(ctx.chain.net_rigid(), truth, epsilon = 1e-6);
        assert!(ctx.metric < 1e-6);
    }

    #[test]
    fn iteration_cap_is_honored() {
        let source = curve(20);
        let target: Vec<_> = source
            .iter()
            .map(|p| p + Vector3::new(15.0, -10.0, 5.0))
            .collect();

        let mut ctx = context_for(source, target, 100);
        let run = RegistrationRun::new(RunParams {
            // Unreachable threshold forces the cap.
            stop_threshold: 0.0,
            max_iterations: 5,
        });
        let report = run.run(&mut ctx).unwrap();
        assert_eq!(report.status, RunStatus::MaxIterationsReached);
        assert_eq!(report.iterations, 5);
        assert_eq!(ctx.chain.len(), 5);
    }

    #[test]
    fn fork_is_independent() {
        let points = curve(25);
        let mut ctx = context_for(points.clone(), points, 100);
        let fork = ctx.fork();

        let run = RegistrationRun::new(RunParams {
            stop_threshold: 1e-6,
            max_iterations: 10,
        });
        run.run(&mut ctx).unwrap();

        assert!(fork.chain.is_empty());
        assert_eq!(fork.metric, f64::MAX);
        assert!(Arc::ptr_eq(&fork.target, &ctx.target));
    }

    #[test]
    fn degenerate_index_fails_the_run() {
        let source = curve(10);
        let mut ctx = context_for(source, vec![Point3::new(f64::NAN, 0.0, 0.0)], 100);
        let run = RegistrationRun::new(RunParams {
            stop_threshold: 1e-6,
            max_iterations: 10,
        });
        let err = run.run(&mut ctx).unwrap_err();
        assert!(matches!(err, cl_core::Error::NumericalDegeneracy(_)));
        assert!(ctx.chain.is_empty());
    }

    #[test]
    fn nonrigid_refinement_appends_single_warp() {
        let points = curve(30);
        let mut ctx = context_for(points.clone(), points, 100);
        let run = RegistrationRun::new(RunParams {
            stop_threshold: 1e-6,
            max_iterations: 100,
        });
        run.run(&mut ctx).unwrap();
        let rigid_entries = ctx.chain.len();

        let solver = NonRigidSolver {
            sigma: 0.0,
            sample_ratio: 100,
        };
        refine_nonrigid(&mut ctx, &solver).unwrap();

        assert_eq!(ctx.chain.len(), rigid_entries + 1);
        assert!(ctx.chain.non_rigid().is_some());
        assert!(ctx.metric < 1e-6);
    }
}
