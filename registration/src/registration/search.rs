//! Automatic search over candidate trim ratios.

use super::run::{RegistrationContext, RegistrationRun, RunParams, RunReport};
use cl_core::{Error, Result};
use rayon::prelude::*;
use tracing::{debug, info};

/// Trim ratios probed by the automatic search, in evaluation order.
pub const CANDIDATE_RATIOS: [u32; 10] = [40, 50, 60, 70, 75, 80, 85, 90, 95, 100];

/// Run one linear-only candidate per ratio and keep the one with the lowest
/// final metric.
///
/// Candidates fork the seed context (deep source copy, shared target and
/// index), so they are mutually independent and evaluated in parallel.
/// Selection is a sequential scan in list order with a strict `<`, so the
/// lowest ratio wins ties and the result is deterministic. A candidate that
/// fails numerically is disqualified; the search only errors when every
/// candidate failed.
pub fn search_best(
    seed: &RegistrationContext,
    params: RunParams,
) -> Result<(RegistrationContext, RunReport)> {
    let evaluated: Vec<(u32, Result<(RegistrationContext, RunReport)>)> = CANDIDATE_RATIOS
        .par_iter()
        .map(|&ratio| {
            let mut ctx = seed.fork();
            ctx.lts_ratio = ratio;
            let outcome = RegistrationRun::new(params).run(&mut ctx).map(|r| (ctx, r));
            (ratio, outcome)
        })
        .collect();

    let mut best: Option<(RegistrationContext, RunReport)> = None;
    let mut first_error = None;
    for (ratio, outcome) in evaluated {
        match outcome {
            Ok((ctx, report)) => {
                debug!(ratio, metric = ctx.metric, "candidate trim ratio finished");
                let improves = best
                    .as_ref()
                    .map_or(true, |(winner, _)| ctx.metric < winner.metric);
                if improves {
                    best = Some((ctx, report));
                }
            }
            Err(err) => {
                debug!(ratio, error = %err, "candidate trim ratio failed");
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }

    match best {
        Some((ctx, report)) => {
            info!(
                ratio = ctx.lts_ratio,
                metric = ctx.metric,
                "auto-LTS found best match using {}%",
                ctx.lts_ratio
            );
            Ok((ctx, report))
        }
        None => Err(first_error
            .unwrap_or_else(|| Error::InputError("no candidate trim ratios evaluated".into()))),
    }
}
