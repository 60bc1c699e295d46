// Coil-sensitivity weighting. The forward pass broadcasts one image into a
// coil stack with a per-coil element-wise multiply; the adjoint combines the
// stack back into a single image with conjugate weights.

use crate::array_utils::col_major_data;
use crate::error::OperatorError;
use crate::operator::{OpKind, Operator};
use ndarray::ArrayD;
use num_complex::Complex32;
use num_traits::Zero;
use rayon::prelude::*;

#[derive(Clone)]
pub struct SenseOp {
    /// col-maj (nvox, nslices, ncoils) map planes
    maps: Vec<Complex32>,
    nvox: usize,
    nslices: usize,
    ncoils: usize,
}

/// builds the sensitivity operator for a validated map tensor. Maps are
/// 3-axis (2D single-slice), 4-axis with a 3D image size, or 4-axis with a 2D
/// image size (2D multi-slice, one map plane per slice). For multi-slice maps
/// the slice axis joins the operator core so each slice sees its own plane:
///
///   domain   (spatial..)           or (spatial.., nslices)
///   codomain (spatial.., ncoils)   or (spatial.., ncoils, nslices)
pub fn sense_operator(maps: &ArrayD<Complex32>, image_size: &[usize]) -> Result<Operator, OperatorError> {
    let rank = maps.ndim();
    let spatial_rank = image_size.len();
    let shape = maps.shape().to_vec();

    // descriptor validation guarantees these combinations; anything else is a
    // construction error here
    let (nslices, ncoils) = match (rank, spatial_rank) {
        (3, 2) => (1, shape[2]),
        (4, 3) => (1, shape[3]),
        (4, 2) => (shape[2], shape[3]),
        _ => {
            return Err(OperatorError::ApplyShape {
                domain: image_size.to_vec(),
                got: shape,
            })
        }
    };
    if shape[..spatial_rank] != image_size[..] {
        return Err(OperatorError::ApplyShape {
            domain: image_size.to_vec(),
            got: shape,
        });
    }

    let nvox: usize = image_size.iter().product();
    // map memory order (nx, ny[, nz], nslices, ncoils) is already (nvox, nslices, ncoils)
    let data = col_major_data(maps);

    let mut domain = image_size.to_vec();
    let mut codomain = image_size.to_vec();
    codomain.push(ncoils);
    if nslices > 1 {
        domain.push(nslices);
        codomain.push(nslices);
    }

    let op = SenseOp {
        maps: data,
        nvox,
        nslices,
        ncoils,
    };
    Ok(Operator::from_kind(OpKind::Sense(op), domain, codomain))
}

impl SenseOp {
    #[inline]
    fn map_plane(&self, slice: usize, coil: usize) -> &[Complex32] {
        let start = self.nvox * (slice + self.nslices * coil);
        &self.maps[start..start + self.nvox]
    }

    /// y[.., c, s] = maps[.., s, c] * x[.., s]
    pub fn forward(&self, x: &[Complex32], out: &mut [Complex32], parallel: bool) {
        let nvox = self.nvox;
        let nc = self.ncoils;
        let fill = |(k, chunk): (usize, &mut [Complex32])| {
            let c = k % nc;
            let s = k / nc;
            let plane = self.map_plane(s, c);
            let img = &x[s * nvox..(s + 1) * nvox];
            for ((o, &m), &v) in chunk.iter_mut().zip(plane).zip(img) {
                *o = m * v;
            }
        };
        if parallel {
            out.par_chunks_exact_mut(nvox).enumerate().for_each(fill);
        } else {
            out.chunks_exact_mut(nvox).enumerate().for_each(fill);
        }
    }

    /// x[.., s] = sum_c conj(maps[.., s, c]) * y[.., c, s]
    pub fn adjoint(&self, y: &[Complex32], out: &mut [Complex32], parallel: bool) {
        let nvox = self.nvox;
        let nc = self.ncoils;
        let combine = |(s, chunk): (usize, &mut [Complex32])| {
            chunk.fill(Complex32::zero());
            for c in 0..nc {
                let plane = self.map_plane(s, c);
                let coil = &y[(c + nc * s) * nvox..(c + nc * s + 1) * nvox];
                for ((o, &m), &v) in chunk.iter_mut().zip(plane).zip(coil) {
                    *o += m.conj() * v;
                }
            }
        };
        if parallel {
            out.par_chunks_exact_mut(nvox).enumerate().for_each(combine);
        } else {
            out.chunks_exact_mut(nvox).enumerate().for_each(combine);
        }
    }
}
