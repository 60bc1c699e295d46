// Automatic problem decomposition. The planner finds image batch axes left
// uncoupled by the transform and by every regularization term; the executor
// solves one sub-problem per batch index combination, sequentially or on a
// worker pool, and reassembles the results at their precomputed positions.

use crate::array_utils::index_to_subscript_col_maj;
use crate::config::{ExecutionStrategy, ProgressEvent, ReconConfig};
use crate::descriptor::AcqDescriptor;
use crate::error::ReconError;
use crate::regularizer::Regularizer;
use ndarray::{ArrayD, Axis, ShapeBuilder};
use num_complex::Complex32;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone)]
pub struct DecompositionPlan {
    /// image batch axes the problem splits over (absolute image-axis indices)
    image_axes: Vec<usize>,
    /// matching k-space data axes (offset by the collapsed transform-output
    /// count and the coil axis)
    kspace_axes: Vec<usize>,
    extents: Vec<usize>,
    /// narrow the sensitivity maps along their slice axis per sub-problem
    slice_maps: bool,
}

impl DecompositionPlan {
    pub fn image_axes(&self) -> &[usize] {
        &self.image_axes
    }

    pub fn kspace_axes(&self) -> &[usize] {
        &self.kspace_axes
    }

    pub fn extents(&self) -> &[usize] {
        &self.extents
    }

    pub fn slice_maps(&self) -> bool {
        self.slice_maps
    }

    /// number of independent sub-problems
    pub fn slice_count(&self) -> usize {
        self.extents.iter().product()
    }
}

/// decides whether the reconstruction splits into independent sub-problems.
/// Returns None when nothing decomposes: no regularization terms (a direct
/// adjoint reconstruction gains nothing from splitting), no batch axes, or
/// every batch axis coupled by some term. Coupled axes are removed per term,
/// so a free axis survives even when another is pinned.
pub fn plan(desc: &AcqDescriptor, terms: &[&dyn Regularizer]) -> Option<DecompositionPlan> {
    if terms.is_empty() {
        return None;
    }
    desc.kspace_data()?;

    let spatial_rank = desc.spatial_rank();
    let batch_shape = desc.batch_shape();
    if batch_shape.is_empty() {
        return None;
    }
    let image_rank = spatial_rank + batch_shape.len();

    let mut candidates: BTreeSet<usize> = (spatial_rank..image_rank).collect();
    for term in terms {
        for axis in term.affected_dims(desc, image_rank) {
            candidates.remove(&axis);
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let lead = desc.kspace_group_count() + usize::from(desc.sensitivity_maps().is_some());
    let image_axes: Vec<usize> = candidates.into_iter().collect();
    let kspace_axes: Vec<usize> = image_axes.iter().map(|&a| lead + (a - spatial_rank)).collect();
    let extents: Vec<usize> = image_axes.iter().map(|&a| batch_shape[a - spatial_rank]).collect();

    let slice_maps = desc.map_slices() > 1 && image_axes.contains(&spatial_rank);

    Some(DecompositionPlan {
        image_axes,
        kspace_axes,
        extents,
        slice_maps,
    })
}

/// reconstruction result: the reassembled image, the per-slice scale factors
/// in slice order, and their median
#[derive(Debug, Clone)]
pub struct ReconOutput {
    pub image: ArrayD<Complex32>,
    pub scales: Vec<f32>,
    pub median_scale: f32,
}

/// solver callback: given a slice descriptor and its configuration, return
/// the solved image slice and the scale factor it applied
pub type SolveResult = Result<(ArrayD<Complex32>, f32), ReconError>;

fn f_order_owned(view: ndarray::ArrayViewD<'_, Complex32>) -> ArrayD<Complex32> {
    let mut owned = ArrayD::zeros(view.shape().f());
    owned.assign(&view);
    owned
}

/// the slice descriptor for one batch index combination: k-space narrowed
/// along the plan's batch axes, maps narrowed along their slice axis when the
/// plan says so, everything else carried over
fn narrow(desc: &AcqDescriptor, plan: &DecompositionPlan, combo: &[usize]) -> Result<AcqDescriptor, ReconError> {
    let data = desc
        .kspace_data()
        .expect("the planner only yields plans for descriptors with data");

    let mut view = data.view();
    for (&axis, &idx) in plan.kspace_axes.iter().zip(combo).rev() {
        view = view.index_axis_move(Axis(axis), idx);
    }
    let mut builder = desc.to_builder().kspace_data(f_order_owned(view));

    if plan.slice_maps {
        let maps = desc
            .sensitivity_maps()
            .expect("slice_maps implies sensitivity maps");
        let slice_pos = plan
            .image_axes
            .iter()
            .position(|&a| a == desc.spatial_rank())
            .expect("slice_maps implies the slice axis is a batch axis");
        // multi-slice maps are (nx, ny, slices, coils)
        let plane = maps.view().index_axis_move(Axis(2), combo[slice_pos]);
        builder = builder.sensitivity_maps(f_order_owned(plane));
    }

    if let Some(tags) = desc.kspace_tags() {
        let kept: Vec<_> = tags
            .iter()
            .enumerate()
            .filter(|(i, _)| !plan.kspace_axes.contains(i))
            .map(|(_, t)| t.clone())
            .collect();
        builder = builder.kspace_tags(kept);
    }

    builder.build().map_err(ReconError::from)
}

/// runs the per-slice solves and reassembles the full image. Slices are
/// independent and may complete in any order; each result lands at its
/// precomputed position, so the output does not depend on scheduling. Any
/// slice error aborts the whole reconstruction.
pub fn execute<S>(
    plan: &DecompositionPlan,
    desc: &AcqDescriptor,
    cfg: &ReconConfig,
    solver: &S,
) -> Result<ReconOutput, ReconError>
where
    S: Fn(&AcqDescriptor, &ReconConfig) -> SolveResult + Sync,
{
    let total = plan.slice_count();
    let workers = cfg.worker_count();
    let parallel = match cfg.execution {
        ExecutionStrategy::Sequential => false,
        ExecutionStrategy::Parallel => true,
        ExecutionStrategy::Auto => cfg.multithread && total > workers,
    };

    // inside a pool the slice solves own no parallelism of their own
    let local_cfg = if parallel {
        cfg.for_inner_slice()
    } else {
        let mut c = cfg.clone();
        c.progress = None;
        c
    };

    let completed = AtomicUsize::new(0);
    let solve_one = |i: usize| -> Result<(ArrayD<Complex32>, f32), ReconError> {
        let mut combo = vec![0usize; plan.extents.len()];
        index_to_subscript_col_maj(i, &plan.extents, &mut combo);
        let local = narrow(desc, plan, &combo)?;
        let (image, scale) = solver(&local, &local_cfg).map_err(|e| ReconError::Slice {
            index: combo.clone(),
            source: Box::new(e),
        })?;
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        cfg.report(ProgressEvent::SliceDone {
            completed: done,
            total,
        });
        Ok((image, scale))
    };

    let results: Vec<(ArrayD<Complex32>, f32)> = if parallel {
        (0..total)
            .into_par_iter()
            .map(solve_one)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        (0..total).map(solve_one).collect::<Result<Vec<_>, _>>()?
    };

    // reassemble at deterministic positions
    let mut out_shape = desc.image_size().to_vec();
    out_shape.extend_from_slice(&desc.batch_shape());
    let mut image = ArrayD::<Complex32>::zeros(out_shape.as_slice().f());
    let mut combo = vec![0usize; plan.extents.len()];
    let mut scales = Vec::with_capacity(total);
    for (i, (slice_image, scale)) in results.into_iter().enumerate() {
        index_to_subscript_col_maj(i, &plan.extents, &mut combo);
        let mut view = image.view_mut();
        for (&axis, &idx) in plan.image_axes.iter().zip(&combo).rev() {
            view = view.index_axis_move(Axis(axis), idx);
        }
        if view.shape() != slice_image.shape() {
            return Err(ReconError::Solver(format!(
                "slice solver returned shape {:?}, expected {:?}",
                slice_image.shape(),
                view.shape()
            )));
        }
        view.assign(&slice_image);
        scales.push(scale);
    }

    let median_scale = median(&scales);
    cfg.report(ProgressEvent::MedianScale(median_scale));

    Ok(ReconOutput {
        image,
        scales,
        median_scale,
    })
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 1.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("scale factors are finite"));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}
