use crate::array_utils::{col_maj_stride, index_to_subscript_col_maj, subscript_to_index_col_maj};
use num_complex::Complex32;
use rayon::prelude::*;
use std::f32::consts::PI;

/// specifies the direction of the pi phase shift. This has the same convention as the DFT
#[derive(Debug, Clone, Copy)]
pub enum ShiftDir {
    Forward,
    Inverse,
}

impl ShiftDir {
    fn sign(self) -> f32 {
        match self {
            ShiftDir::Forward => -1.,
            ShiftDir::Inverse => 1.,
        }
    }
}

#[inline]
/// returns the phase shift associated with the centered fft
fn phase_shift(index: usize, n: usize) -> f32 {
    debug_assert!(index < n, "index out of range");
    PI * (index as f32 - (n as f32 / 2.))
}

/// applies the centered-fft phase ramp along the axes of `dims` selected by
/// `apply`, fused into a single pass over the buffer. Batch blocks beyond the
/// `dims` grid are ramped identically.
pub fn phase_ramp(dims: &[usize], apply: &[bool], x: &mut [Complex32], direction: ShiftDir, parallel: bool) {
    assert_eq!(dims.len(), apply.len(), "one ramp flag per axis is required");
    let grid: usize = dims.iter().product();
    assert_eq!(x.len() % grid, 0, "dims must agree with the size of x");

    if !apply.iter().any(|&a| a) {
        return;
    }

    // strides of the ramped axes within the grid
    let ramped = apply
        .iter()
        .enumerate()
        .filter(|(_, &a)| a)
        .map(|(i, _)| (col_maj_stride(dims, i), dims[i]))
        .collect::<Vec<_>>();

    let sign = direction.sign();
    let shift_of = |idx: usize| {
        let g = idx % grid;
        let mut total = 0f32;
        for &(stride, n) in &ramped {
            total += phase_shift((g / stride) % n, n);
        }
        Complex32::from_polar(1., sign * total)
    };

    if parallel {
        x.par_iter_mut().enumerate().for_each(|(idx, value)| {
            *value *= shift_of(idx);
        });
    } else {
        x.iter_mut().enumerate().for_each(|(idx, value)| {
            *value *= shift_of(idx);
        });
    }
}

fn circshift_col_maj<T: Copy + Send + Sync>(dims: &[usize], shift: &[i64], data: &mut [T]) {
    assert_eq!(dims.iter().product::<usize>(), data.len(), "dims and source size must agree");
    assert_eq!(dims.len(), shift.len(), "the shift must have the same number of dimensions as dims");
    let rank = dims.len();
    let result = (0..data.len())
        .into_par_iter()
        .map(|final_idx| {
            let mut coord = vec![0usize; rank];
            index_to_subscript_col_maj(final_idx, dims, &mut coord);
            // reverse the shift to find the original source coordinate
            for ((c, &s), &n) in coord.iter_mut().zip(shift).zip(dims) {
                let shifted = (*c as i64 - s).rem_euclid(n as i64);
                *c = shifted as usize;
            }
            let source_idx = subscript_to_index_col_maj(&coord, dims);
            data[source_idx]
        })
        .collect::<Vec<_>>();
    data.copy_from_slice(&result);
}

/// forward fft shift of a col-maj ordered array, restricted to the selected axes
pub fn fftshift<T: Copy + Send + Sync>(dims: &[usize], axes: &[usize], data: &mut [T]) {
    let mut shift = vec![0i64; dims.len()];
    for &a in axes {
        shift[a] = (dims[a] / 2) as i64;
    }
    circshift_col_maj(dims, &shift, data);
}

/// inverse fft shift of a col-maj ordered array, restricted to the selected axes
pub fn ifftshift<T: Copy + Send + Sync>(dims: &[usize], axes: &[usize], data: &mut [T]) {
    let mut shift = vec![0i64; dims.len()];
    for &a in axes {
        shift[a] = ((dims[a] + 1) / 2) as i64;
    }
    circshift_col_maj(dims, &shift, data);
}
