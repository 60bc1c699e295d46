// Normalization helpers: operator norm by power iteration on E'E, output
// scale estimation, and the hard data-consistency projection. Degenerate
// zero norms are reported by the caller and replaced with "no scaling",
// never divided by.

use crate::array_utils::{from_col_major, is_col_major, norm_sq};
use crate::operator::Operator;
use ndarray::ArrayD;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// largest singular value of the operator, estimated by power iteration on
/// E'E from a deterministic random start. `exact` iterates to a relative
/// tolerance of 1e-6; otherwise a fixed number of iterations is used.
/// Returns None when the norm is zero.
pub fn operator_norm(op: &Operator, exact: bool) -> Option<f32> {
    let dims = op.domain().to_vec();
    let n = op.domain_len();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut x: Vec<Complex32> = (0..n)
        .map(|_| Complex32::new(rng.random::<f32>() - 0.5, rng.random::<f32>() - 0.5))
        .collect();
    let init = norm_sq(&x).sqrt();
    x.iter_mut().for_each(|v| *v /= init as f32);

    // diagonal operators converge immediately
    let max_iter = if op.traits().diagonal {
        2
    } else if exact {
        64
    } else {
        12
    };

    let mut lambda = 0f64;
    for it in 0..max_iter {
        let xa = from_col_major(&dims, x);
        let fx = op.apply(&xa).expect("power iteration input matches the operator domain");
        let y = op
            .adjoint_apply(&fx)
            .expect("power iteration input matches the operator codomain");
        let ys = y.as_slice_memory_order().expect("operator output is contiguous");
        let l = norm_sq(ys).sqrt();
        if l == 0. {
            return None;
        }
        x = ys.iter().map(|v| v / l as f32).collect();
        let converged = exact && it > 0 && (l - lambda).abs() <= 1e-6 * l;
        lambda = l;
        if converged {
            break;
        }
    }
    Some((lambda.sqrt()) as f32)
}

/// output scale for a reconstructed image: the reciprocal peak magnitude.
/// Returns None when the image is identically zero.
pub fn data_scale(image: &ArrayD<Complex32>) -> Option<f32> {
    let peak = image.iter().map(|v| v.norm()).fold(0f32, f32::max);
    if peak == 0. {
        None
    } else {
        Some(1. / peak)
    }
}

/// replaces the sampled positions of a full k-space iterate with the measured
/// samples and returns the sum-squared residual that was projected away.
/// `gather` holds the col-maj sampled positions within one transform block;
/// trailing axes of both arrays are treated as batch.
pub fn hard_project(full: &mut ArrayD<Complex32>, measured: &ArrayD<Complex32>, gather: &[usize]) -> f64 {
    let k = gather.len();
    assert!(k > 0, "gather list must not be empty");
    assert_eq!(measured.len() % k, 0, "measured size must be a multiple of the sample count");
    let nrest = measured.len() / k;
    assert_eq!(full.len() % nrest, 0, "batch shapes of the iterate and the measurements must agree");
    let block = full.len() / nrest;

    assert!(
        is_col_major(full.shape(), full.strides()),
        "iterate must be column-major"
    );
    assert!(
        is_col_major(measured.shape(), measured.strides()),
        "measurements must be column-major"
    );

    let full_s = full
        .as_slice_memory_order_mut()
        .expect("column-major iterate is contiguous");
    let meas_s = measured
        .as_slice_memory_order()
        .expect("column-major measurements are contiguous");

    full_s
        .par_chunks_exact_mut(block)
        .zip(meas_s.par_chunks_exact(k))
        .map(|(grid, samples)| {
            let mut err = 0f64;
            for (&g, &v) in gather.iter().zip(samples) {
                err += (grid[g] - v).norm_sqr() as f64;
                grid[g] = v;
            }
            err
        })
        .sum()
}
