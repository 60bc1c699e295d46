// Library entry point: plan the decomposition, run the solver per slice or
// on the whole problem, and hand back the assembled image.

use crate::config::{ProgressEvent, ReconConfig};
use crate::decompose::{self, ReconOutput, SolveResult};
use crate::descriptor::AcqDescriptor;
use crate::encode::encoding_operator;
use crate::error::{OperatorError, ReconError};
use crate::normalize::{data_scale, operator_norm};
use crate::operator::Operator;
use crate::regularizer::Regularizer;

/// reconstructs the acquisition with a caller-supplied solver. When the
/// planner finds free batch axes the solver runs once per slice on a narrowed
/// descriptor; otherwise it runs once on the whole problem.
pub fn reconstruct<S>(
    desc: &AcqDescriptor,
    terms: &[&dyn Regularizer],
    cfg: &ReconConfig,
    solver: &S,
) -> Result<ReconOutput, ReconError>
where
    S: Fn(&AcqDescriptor, &ReconConfig) -> SolveResult + Sync,
{
    match decompose::plan(desc, terms) {
        Some(plan) => decompose::execute(&plan, desc, cfg, solver),
        None => {
            let (image, scale) = solver(desc, cfg)?;
            cfg.report(ProgressEvent::MedianScale(scale));
            Ok(ReconOutput {
                image,
                scales: vec![scale],
                median_scale: scale,
            })
        }
    }
}

/// direct adjoint reconstruction `E' * data`, rescaled to unit peak when the
/// configuration asks for it. Usable directly and as a solver callback.
pub fn adjoint_reconstruct(desc: &AcqDescriptor, cfg: &ReconConfig) -> SolveResult {
    let data = desc.kspace_data().ok_or(OperatorError::MissingKspace)?;
    let e = encoding_operator(desc, cfg.worker_count())?;
    let mut image = e.adjoint_apply(data)?;

    let mut scale = 1.0f32;
    if cfg.rescale_output {
        match data_scale(&image) {
            Some(s) => {
                scale = s;
                image.mapv_inplace(|v| v * s);
            }
            None => cfg.report(ProgressEvent::ZeroScale),
        }
    }
    Ok((image, scale))
}

/// operator norm for solver step sizes, honoring the exact-vs-estimated
/// choice. A zero norm is reported and replaced by 1 instead of divided by.
pub fn operator_norm_or_unit(op: &Operator, cfg: &ReconConfig) -> f32 {
    match operator_norm(op, cfg.exact_operator_norm) {
        Some(n) => n,
        None => {
            cfg.report(ProgressEvent::ZeroNorm);
            1.0
        }
    }
}
