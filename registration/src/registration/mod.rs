//! Registration engine
//!
//! The facade over the numerical core: crops and pre-filters the inputs,
//! resolves the cardinality constraint (possibly swapping source and
//! target), drives a single run or the automatic trim-ratio search, and
//! extracts the net transform.

pub mod chain;
pub mod correspondence;
pub mod nonrigid;
pub mod rigid;
pub mod run;
pub mod search;

use crate::spatial::{KdTree, NearestNeighbor};
use cl_core::{geometry, Error, PointSet, Result};
use nalgebra::Matrix4;
use nonrigid::{NonRigidSolver, ThinPlateSpline};
use run::{RegistrationContext, RegistrationRun, RunParams, RunStatus};
use std::sync::Arc;
use tracing::{info, warn};

/// Advisory limit on the translation magnitude of the returned transform.
const QUALITY_TRANSLATION_LIMIT: f64 = 20.0;
/// Advisory limit on the rotation angle of the returned transform, degrees.
const QUALITY_ROTATION_LIMIT_DEG: f64 = 10.0;

/// Caller-facing configuration. No process-wide state: every run reads its
/// own copy, so concurrent searches cannot race on settings.
#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    /// Trim percentage used when `auto_search` is off; clamped to `1..=100`.
    pub lts_ratio: u32,
    /// Search the candidate ratio list instead of using `lts_ratio`.
    pub auto_search: bool,
    /// Apply one thin-plate-spline refinement after the linear loop.
    pub nonlinear_refinement: bool,
    /// Regularization of the thin-plate fit.
    pub nonlinear_sigma: f64,
    /// Percentage of trusted pairs kept as thin-plate landmarks.
    pub nonlinear_sample_ratio: u32,
    /// Convergence threshold on the metric difference between iterations.
    pub stop_threshold: f64,
    pub max_iterations: usize,
    /// Margin added to the fixed set's bounding box when cropping the
    /// moving set, in length units.
    pub crop_margin: f64,
    /// Promote per-run progress to info-level log events.
    pub verbose: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            lts_ratio: 75,
            auto_search: true,
            nonlinear_refinement: false,
            nonlinear_sigma: 1e-3,
            nonlinear_sample_ratio: 100,
            stop_threshold: 1e-4,
            max_iterations: 100,
            crop_margin: 40.0,
            verbose: false,
        }
    }
}

/// Net result of a registration.
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    /// Net rigid transform mapping the moving set onto the fixed set.
    pub transformation: Matrix4<f64>,
    /// Final thin-plate component, when refinement was requested. Reported
    /// separately; never folded into `transformation`. When `inverted` is
    /// set the warp was fitted in the swapped direction (fixed onto moving)
    /// and is not inverted back.
    pub non_rigid: Option<ThinPlateSpline>,
    /// Mean residual of the final correspondence pass.
    pub metric: f64,
    /// Trim ratio that produced the result.
    pub lts_ratio: u32,
    pub status: RunStatus,
    pub iterations: usize,
    /// Whether moving and fixed roles were swapped internally.
    pub inverted: bool,
    /// Advisory quality-check message; never blocks the result.
    pub quality_warning: Option<String>,
}

/// Register `moving` onto `fixed`.
///
/// Pipeline: crop the moving set to the fixed set's expanded bounding box,
/// swap roles if the moving set still outnumbers the fixed set, build the
/// nearest-neighbor index, run one registration (or the trim-ratio search),
/// optionally refine non-rigidly, and return the net rigid transform
/// (inverted back when roles were swapped).
pub fn register_point_sets(
    moving: &PointSet,
    fixed: &PointSet,
    options: &RegistrationOptions,
) -> Result<RegistrationOutcome> {
    let fixed_bounds = fixed
        .bounds()
        .ok_or_else(|| Error::InputError("fixed point set is empty".into()))?;
    let cropped = moving.cropped_to(&fixed_bounds.expanded(options.crop_margin));
    if cropped.is_empty() {
        return Err(Error::InputError(
            "no moving points inside the cropped region".into(),
        ));
    }
    if options.verbose {
        info!(
            kept = cropped.len(),
            total = moving.len(),
            "cropped moving set to fixed bounds"
        );
    }

    // The queried set must not outnumber the indexed set.
    let (source, target, inverted) = if cropped.len() > fixed.len() {
        (fixed.clone(), cropped, true)
    } else {
        (cropped, fixed.clone(), false)
    };
    if inverted && options.verbose {
        info!("moving set outnumbers fixed set, registering with swapped roles");
    }

    let target = Arc::new(target);
    let index: Arc<dyn NearestNeighbor + Send + Sync> = Arc::new(KdTree::build(&target.points));
    let seed = RegistrationContext::new(
        source,
        target,
        index,
        options.lts_ratio.clamp(1, 100),
        inverted,
    );

    let params = RunParams {
        stop_threshold: options.stop_threshold,
        max_iterations: options.max_iterations,
    };
    let (mut ctx, report) = if options.auto_search {
        search::search_best(&seed, params)?
    } else {
        let mut ctx = seed;
        let report = RegistrationRun::new(params).run(&mut ctx)?;
        (ctx, report)
    };

    if options.nonlinear_refinement {
        let solver = NonRigidSolver {
            sigma: options.nonlinear_sigma,
            sample_ratio: options.nonlinear_sample_ratio,
        };
        run::refine_nonrigid(&mut ctx, &solver)?;
    }

    let mut net = ctx.chain.net_rigid();
    if ctx.inverted {
        net = geometry::invert_rigid(&net);
    }
    if options.verbose {
        info!(
            metric = ctx.metric,
            lts_ratio = ctx.lts_ratio,
            iterations = report.iterations,
            "registration finished"
        );
    }

    Ok(RegistrationOutcome {
        transformation: net,
        non_rigid: ctx.chain.non_rigid().cloned(),
        metric: ctx.metric,
        lts_ratio: ctx.lts_ratio,
        status: report.status,
        iterations: report.iterations,
        inverted: ctx.inverted,
        quality_warning: quality_check(&net),
    })
}

/// Diagnostic check on the magnitude of the returned correction. Large
/// corrections usually mean a mis-picked input, so they are surfaced as a
/// warning, but the registration is returned regardless.
fn quality_check(net: &Matrix4<f64>) -> Option<String> {
    let parts = geometry::decompose_rigid(net);
    let translation = parts.translation.norm();
    let rotation_deg = parts.rotation_angle.to_degrees();
    if translation > QUALITY_TRANSLATION_LIMIT || rotation_deg > QUALITY_ROTATION_LIMIT_DEG {
        let message = format!(
            "registration correction is unusually large: translation {translation:.2}, rotation {rotation_deg:.2} deg"
        );
        warn!("{message}");
        Some(message)
    } else {
        None
    }
}
