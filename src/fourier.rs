// Discrete Fourier transform over a declared set of axes, wrapping rustfft.
// The zero-frequency-centering shifts are fused into the transform pass as
// phase ramps so no shifted intermediate array is ever materialized.

use crate::array_utils::for_each_axis_line;
use crate::error::OperatorError;
use crate::fftshift::{phase_ramp, ShiftDir};
use crate::operator::{OpKind, Operator};
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Clone)]
pub struct FourierOp {
    dims: Vec<usize>,
    axes: Vec<usize>,
    fwd: Vec<Arc<dyn Fft<f32>>>,
    inv: Vec<Arc<dyn Fft<f32>>>,
    /// image-side ramp per entry of `axes`; centers the k-space output
    pre_ramp: Vec<bool>,
    /// k-side ramp per entry of `axes`; accounts for a geometrically centered image
    post_ramp: Vec<bool>,
}

/// builds an unnormalized DFT operator over `axes` of a core block of shape
/// `dims`. Axes of `dims` beyond `axes` are passed through untouched. The
/// shift sets name transform axes (by position among `axes`) whose sample at
/// index 0 is already the zero-frequency component, so their centering ramp
/// is skipped.
pub fn fourier_operator(
    dims: &[usize],
    axes: &[usize],
    shifted_image_dims: &BTreeSet<usize>,
    shifted_kspace_dims: &BTreeSet<usize>,
) -> Result<Operator, OperatorError> {
    if axes.is_empty() {
        return Err(OperatorError::AxisRange {
            axis: 0,
            rank: dims.len(),
        });
    }
    for &a in axes {
        if a >= dims.len() {
            return Err(OperatorError::AxisRange {
                axis: a,
                rank: dims.len(),
            });
        }
    }

    let mut planner = FftPlanner::<f32>::new();
    let fwd = axes.iter().map(|&a| planner.plan_fft_forward(dims[a])).collect::<Vec<_>>();
    let inv = axes.iter().map(|&a| planner.plan_fft_inverse(dims[a])).collect::<Vec<_>>();

    let pre_ramp = (0..axes.len()).map(|k| !shifted_kspace_dims.contains(&k)).collect();
    let post_ramp = (0..axes.len()).map(|k| !shifted_image_dims.contains(&k)).collect();

    let op = FourierOp {
        dims: dims.to_vec(),
        axes: axes.to_vec(),
        fwd,
        inv,
        pre_ramp,
        post_ramp,
    };
    Ok(Operator::from_kind(OpKind::Fourier(op), dims.to_vec(), dims.to_vec()))
}

/// plain unnormalized DFT along the selected axes with no shift convention,
/// e.g. for a temporal transform inside a regularization term
pub fn plain_fourier_operator(dims: &[usize], axes: &[usize]) -> Result<Operator, OperatorError> {
    let all: BTreeSet<usize> = (0..axes.len()).collect();
    fourier_operator(dims, axes, &all, &all)
}

impl FourierOp {
    /// ramp mask expanded over the full core dims
    fn ramp_mask(&self, which: &[bool]) -> Vec<bool> {
        let mut mask = vec![false; self.dims.len()];
        for (k, &a) in self.axes.iter().enumerate() {
            mask[a] = which[k];
        }
        mask
    }

    fn transform(&self, data: &mut [Complex32], inverse: bool, parallel: bool) {
        let plans = if inverse { &self.inv } else { &self.fwd };
        for (k, &axis) in self.axes.iter().enumerate() {
            let plan = plans[k].clone();
            for_each_axis_line(data, &self.dims, axis, parallel, move |line| {
                plan.process(line);
            });
        }
    }

    pub fn forward(&self, x: &[Complex32], out: &mut [Complex32], parallel: bool) {
        out.copy_from_slice(x);
        phase_ramp(&self.dims, &self.ramp_mask(&self.pre_ramp), out, ShiftDir::Forward, parallel);
        self.transform(out, false, parallel);
        phase_ramp(&self.dims, &self.ramp_mask(&self.post_ramp), out, ShiftDir::Forward, parallel);
    }

    pub fn adjoint(&self, y: &[Complex32], out: &mut [Complex32], parallel: bool) {
        out.copy_from_slice(y);
        phase_ramp(&self.dims, &self.ramp_mask(&self.post_ramp), out, ShiftDir::Inverse, parallel);
        self.transform(out, true, parallel);
        phase_ramp(&self.dims, &self.ramp_mask(&self.pre_ramp), out, ShiftDir::Inverse, parallel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_utils::{from_col_major, inner_product, norm_sq};
    use ndarray::ArrayD;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_block(dims: &[usize], seed: u64) -> ArrayD<Complex32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let n: usize = dims.iter().product();
        from_col_major(
            dims,
            (0..n)
                .map(|_| Complex32::new(rng.random::<f32>() - 0.5, rng.random::<f32>() - 0.5))
                .collect(),
        )
    }

    #[test]
    fn round_trip_scales_by_n() {
        let dims = [8, 6];
        let n = 48.0;
        let op = fourier_operator(&dims, &[0, 1], &BTreeSet::new(), &BTreeSet::new()).unwrap();
        let x = random_block(&dims, 1);
        let y = op.apply(&x).unwrap();
        let z = op.adjoint_apply(&y).unwrap();
        let xs = x.as_slice_memory_order().unwrap();
        let zs = z.as_slice_memory_order().unwrap();
        for (a, b) in zs.iter().zip(xs) {
            assert!((a - b * n).norm() < 1e-2, "adjoint of forward must scale by the grid size");
        }
    }

    #[test]
    fn adjoint_identity_2d() {
        let dims = [8, 4];
        let op = fourier_operator(&dims, &[0, 1], &BTreeSet::new(), &BTreeSet::new()).unwrap();
        let x = random_block(&dims, 2);
        let y = random_block(&dims, 3);
        let ex = op.apply(&x).unwrap();
        let ey = op.adjoint_apply(&y).unwrap();
        let lhs = inner_product(
            ex.as_slice_memory_order().unwrap(),
            y.as_slice_memory_order().unwrap(),
        );
        let rhs = inner_product(
            x.as_slice_memory_order().unwrap(),
            ey.as_slice_memory_order().unwrap(),
        );
        assert!((lhs - rhs).norm() < 1e-2 * lhs.norm().max(1.), "<Ex, y> must equal <x, E'y>");
    }

    #[test]
    fn adjoint_identity_with_shift_sets() {
        let dims = [8, 6];
        let shifted_img: BTreeSet<usize> = [0].into_iter().collect();
        let shifted_ksp: BTreeSet<usize> = [1].into_iter().collect();
        let op = fourier_operator(&dims, &[0, 1], &shifted_img, &shifted_ksp).unwrap();
        let x = random_block(&dims, 4);
        let y = random_block(&dims, 5);
        let lhs = inner_product(
            op.apply(&x).unwrap().as_slice_memory_order().unwrap(),
            y.as_slice_memory_order().unwrap(),
        );
        let rhs = inner_product(
            x.as_slice_memory_order().unwrap(),
            op.adjoint_apply(&y).unwrap().as_slice_memory_order().unwrap(),
        );
        assert!((lhs - rhs).norm() < 1e-2 * lhs.norm().max(1.));
    }

    #[test]
    fn centered_dc_lands_in_the_middle() {
        // a constant image transforms to a delta at the grid center
        let dims = [8, 8];
        let op = fourier_operator(&dims, &[0, 1], &BTreeSet::new(), &BTreeSet::new()).unwrap();
        let x = from_col_major(&dims, vec![Complex32::ONE; 64]);
        let y = op.apply(&x).unwrap();
        let ys = y.as_slice_memory_order().unwrap();
        let center = 4 + 8 * 4;
        assert!(ys[center].norm() > 63.9, "dc energy must land at the center sample");
        let off_center: f64 = norm_sq(ys) - (ys[center].norm_sqr() as f64);
        assert!(off_center < 1e-4, "everything else must be zero");
    }

    #[test]
    fn preshifted_kspace_keeps_dc_at_origin() {
        // marking both k-space axes pre-shifted yields the plain DFT layout
        let dims = [8, 8];
        let ksp: BTreeSet<usize> = [0, 1].into_iter().collect();
        let img: BTreeSet<usize> = [0, 1].into_iter().collect();
        let op = fourier_operator(&dims, &[0, 1], &img, &ksp).unwrap();
        let x = from_col_major(&dims, vec![Complex32::ONE; 64]);
        let y = op.apply(&x).unwrap();
        let ys = y.as_slice_memory_order().unwrap();
        assert!(ys[0].norm() > 63.9, "dc energy must stay at index 0");
    }

    #[test]
    fn batch_blocks_transform_independently(){
        let dims = [4, 4];
        let op = fourier_operator(&dims, &[0, 1], &BTreeSet::new(), &BTreeSet::new()).unwrap();
        let single = random_block(&dims, 7);
        let mut stacked = Vec::new();
        stacked.extend_from_slice(single.as_slice_memory_order().unwrap());
        stacked.extend_from_slice(single.as_slice_memory_order().unwrap());
        let batch = from_col_major(&[4, 4, 2], stacked);
        let yb = op.apply(&batch).unwrap();
        let ys = op.apply(&single).unwrap();
        let yb = yb.as_slice_memory_order().unwrap();
        let ys = ys.as_slice_memory_order().unwrap();
        for v in 0..2 {
            for i in 0..16 {
                assert!((yb[v * 16 + i] - ys[i]).norm() < 1e-3);
            }
        }
    }
}
