// Orthonormal Haar transform along selected axes. The transform is its own
// scaled inverse, so the adjoint is exact and cheap.

use crate::array_utils::for_each_axis_line;
use crate::error::OperatorError;
use crate::operator::{OpKind, Operator};
use num_complex::Complex32;
use std::f32::consts::FRAC_1_SQRT_2;

#[derive(Clone)]
pub struct WaveletOp {
    dims: Vec<usize>,
    axes: Vec<usize>,
    levels: usize,
}

/// builds an orthonormal Haar operator over `axes` of a core block of shape
/// `dims`. Each transformed axis extent must divide by 2^levels.
pub fn wavelet_operator(dims: &[usize], axes: &[usize], levels: usize) -> Result<Operator, OperatorError> {
    if levels == 0 {
        return Err(OperatorError::WaveletLength { len: 0, levels });
    }
    for &a in axes {
        if a >= dims.len() {
            return Err(OperatorError::AxisRange {
                axis: a,
                rank: dims.len(),
            });
        }
        if dims[a] % (1 << levels) != 0 {
            return Err(OperatorError::WaveletLength {
                len: dims[a],
                levels,
            });
        }
    }
    let op = WaveletOp {
        dims: dims.to_vec(),
        axes: axes.to_vec(),
        levels,
    };
    Ok(Operator::from_kind(OpKind::Wavelet(op), dims.to_vec(), dims.to_vec()))
}

fn haar_line(line: &mut [Complex32], levels: usize, scratch: &mut [Complex32]) {
    let n = line.len();
    for l in 0..levels {
        let m = n >> l;
        let half = m / 2;
        for i in 0..half {
            let a = line[2 * i];
            let b = line[2 * i + 1];
            scratch[i] = (a + b) * FRAC_1_SQRT_2;
            scratch[half + i] = (a - b) * FRAC_1_SQRT_2;
        }
        line[..m].copy_from_slice(&scratch[..m]);
    }
}

fn haar_line_inverse(line: &mut [Complex32], levels: usize, scratch: &mut [Complex32]) {
    let n = line.len();
    for l in (0..levels).rev() {
        let m = n >> l;
        let half = m / 2;
        for i in 0..half {
            let s = line[i];
            let d = line[half + i];
            scratch[2 * i] = (s + d) * FRAC_1_SQRT_2;
            scratch[2 * i + 1] = (s - d) * FRAC_1_SQRT_2;
        }
        line[..m].copy_from_slice(&scratch[..m]);
    }
}

impl WaveletOp {
    pub fn forward(&self, x: &[Complex32], out: &mut [Complex32], parallel: bool) {
        out.copy_from_slice(x);
        let levels = self.levels;
        for &axis in &self.axes {
            let n = self.dims[axis];
            for_each_axis_line(out, &self.dims, axis, parallel, move |line| {
                let mut scratch = vec![Complex32::ZERO; n];
                haar_line(line, levels, &mut scratch);
            });
        }
    }

    pub fn adjoint(&self, y: &[Complex32], out: &mut [Complex32], parallel: bool) {
        out.copy_from_slice(y);
        let levels = self.levels;
        for &axis in self.axes.iter().rev() {
            let n = self.dims[axis];
            for_each_axis_line(out, &self.dims, axis, parallel, move |line| {
                let mut scratch = vec![Complex32::ZERO; n];
                haar_line_inverse(line, levels, &mut scratch);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_utils::{from_col_major, inner_product, norm_sq};
    use ndarray::ArrayD;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random(dims: &[usize], seed: u64) -> ArrayD<Complex32> {
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
    fn orthonormal_round_trip() {
        let dims = [8, 8];
        let op = wavelet_operator(&dims, &[0, 1], 2).unwrap();
        let x = random(&dims, 1);
        let w = op.apply(&x).unwrap();
        let back = op.adjoint_apply(&w).unwrap();
        let xs = x.as_slice_memory_order().unwrap();
        let bs = back.as_slice_memory_order().unwrap();
        for (a, b) in bs.iter().zip(xs) {
            assert!((a - b).norm() < 1e-5, "orthonormal transform must invert exactly");
        }
        // energy is preserved
        let ein = norm_sq(xs);
        let ew = norm_sq(w.as_slice_memory_order().unwrap());
        assert!((ein - ew).abs() < 1e-3 * ein);
    }

    #[test]
    fn adjoint_identity() {
        let dims = [8, 4];
        let op = wavelet_operator(&dims, &[0, 1], 1).unwrap();
        let x = random(&dims, 2);
        let y = random(&dims, 3);
        let lhs = inner_product(
            op.apply(&x).unwrap().as_slice_memory_order().unwrap(),
            y.as_slice_memory_order().unwrap(),
        );
        let rhs = inner_product(
            x.as_slice_memory_order().unwrap(),
            op.adjoint_apply(&y).unwrap().as_slice_memory_order().unwrap(),
        );
        assert!((lhs - rhs).norm() < 1e-4 * lhs.norm().max(1.));
    }

    #[test]
    fn constant_line_concentrates_in_the_lowpass_band() {
        let dims = [8];
        let op = wavelet_operator(&dims, &[0], 3).unwrap();
        let x = from_col_major(&dims, vec![Complex32::ONE; 8]);
        let w = op.apply(&x).unwrap();
        let ws = w.as_slice_memory_order().unwrap();
        assert!((ws[0].re - 8f32.sqrt()).abs() < 1e-5);
        assert!(ws[1..].iter().all(|v| v.norm() < 1e-5));
    }

    #[test]
    fn rejects_odd_lengths() {
        assert!(matches!(
            wavelet_operator(&[6], &[0], 2),
            Err(OperatorError::WaveletLength { .. })
        ));
    }
}
