// Array utilities for column-major memory layouts

use ndarray::{ArrayD, ShapeBuilder};
use num_complex::{Complex32, Complex64};
use rayon::prelude::*;

#[inline(always)]
pub fn subscript_to_index_col_maj(subscript: &[usize], size: &[usize]) -> usize {
    debug_assert_eq!(subscript.len(), size.len());
    let mut idx = 0;
    let mut stride = 1;
    for (&c, &n) in subscript.iter().zip(size) {
        debug_assert!(c < n);
        idx += c * stride;
        stride *= n;
    }
    idx
}

#[inline(always)]
pub fn index_to_subscript_col_maj(index: usize, size: &[usize], subscript: &mut [usize]) {
    debug_assert_eq!(subscript.len(), size.len());
    let mut tmp = index;
    for (s, &n) in subscript.iter_mut().zip(size) {
        *s = tmp % n;
        tmp /= n;
    }
}

/// column-major stride of `axis` for the given dims
#[inline(always)]
pub fn col_maj_stride(size: &[usize], axis: usize) -> usize {
    size[..axis].iter().product()
}

/// true if the strides describe a contiguous column-major layout. Axes of
/// extent 1 carry no layout information and are skipped.
pub fn is_col_major(shape: &[usize], strides: &[isize]) -> bool {
    let mut expected = 1isize;
    for (&n, &s) in shape.iter().zip(strides) {
        if n > 1 && s != expected {
            return false;
        }
        expected *= n as isize;
    }
    true
}

/// column-major backing buffer, copying only when the layout disagrees
pub fn col_major_data(a: &ArrayD<Complex32>) -> Vec<Complex32> {
    if is_col_major(a.shape(), a.strides()) {
        if let Some(s) = a.as_slice_memory_order() {
            return s.to_vec();
        }
    }
    let mut out = ArrayD::zeros(a.shape().f());
    out.assign(a);
    let (v, _) = out.into_raw_vec_and_offset();
    v
}

/// build a column-major array from a flat buffer
pub fn from_col_major(dims: &[usize], data: Vec<Complex32>) -> ArrayD<Complex32> {
    ArrayD::from_shape_vec(dims.f(), data).expect("dims must agree with the buffer length")
}

/// complex inner product `<a, b> = sum conj(a_i) * b_i`, accumulated in f64
pub fn inner_product(a: &[Complex32], b: &[Complex32]) -> Complex64 {
    assert_eq!(a.len(), b.len(), "inner product operands must have equal length");
    a.iter().zip(b).fold(Complex64::new(0., 0.), |acc, (x, y)| {
        acc + Complex64::new(x.re as f64, x.im as f64).conj()
            * Complex64::new(y.re as f64, y.im as f64)
    })
}

pub fn norm_sq(a: &[Complex32]) -> f64 {
    a.iter().map(|x| x.norm_sqr() as f64).sum()
}

/// apply `f` to every line of `data` along `axis`, gathering strided lines
/// into a contiguous buffer when needed. `dims` is the column-major shape of
/// `data`; trailing batch blocks beyond `dims` are walked the same way.
pub fn for_each_axis_line<F>(data: &mut [Complex32], dims: &[usize], axis: usize, parallel: bool, f: F)
where
    F: Fn(&mut [Complex32]) + Sync,
{
    let n = dims[axis];
    let stride = col_maj_stride(dims, axis);
    let seg = n * stride;
    assert_eq!(data.len() % seg, 0, "dims must agree with the size of data");

    if stride == 1 {
        if parallel {
            data.par_chunks_exact_mut(n).for_each(|line| f(line));
        } else {
            data.chunks_exact_mut(n).for_each(|line| f(line));
        }
        return;
    }

    let run = |segment: &mut [Complex32], line: &mut Vec<Complex32>| {
        for inner in 0..stride {
            for t in 0..n {
                line[t] = segment[inner + t * stride];
            }
            f(line);
            for t in 0..n {
                segment[inner + t * stride] = line[t];
            }
        }
    };

    if parallel {
        data.par_chunks_exact_mut(seg)
            .for_each_init(|| vec![Complex32::ZERO; n], |line, segment| run(segment, line));
    } else {
        let mut line = vec![Complex32::ZERO; n];
        data.chunks_exact_mut(seg)
            .for_each(|segment| run(segment, &mut line));
    }
}
