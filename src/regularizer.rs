// The regularization-term interface the decomposition planner consumes. A
// term reports which image axes it couples from static metadata alone (its
// type and declared target axis), so planning never needs a trial solve. The
// operator query hands solvers a tagged operator over the sample shape.

use crate::descriptor::AcqDescriptor;
use crate::error::OperatorError;
use crate::fourier::plain_fourier_operator;
use crate::operator::{Operator, TaggedOperator};
use crate::wavelet::wavelet_operator;
use num_complex::Complex32;
use std::collections::BTreeSet;

pub trait Regularizer: Send + Sync {
    /// the term's linear operator over a sample of the given shape
    fn operator(&self, sample_shape: &[usize]) -> Result<TaggedOperator, OperatorError>;

    /// image axes this term couples together. `image_axes` is the rank of the
    /// image domain (spatial plus batch axes).
    fn affected_dims(&self, desc: &AcqDescriptor, image_axes: usize) -> BTreeSet<usize>;

    fn weight(&self) -> f32 {
        1.0
    }
}

/// orthonormal wavelet sparsity over the spatial axes only; batch axes are
/// left uncoupled so slice-wise decomposition stays possible
#[derive(Debug, Clone)]
pub struct SpatialWavelet {
    pub spatial_axes: usize,
    pub levels: usize,
    pub weight: f32,
}

impl SpatialWavelet {
    pub fn new(spatial_axes: usize) -> Self {
        SpatialWavelet {
            spatial_axes,
            levels: 1,
            weight: 1.0,
        }
    }
}

impl Regularizer for SpatialWavelet {
    fn operator(&self, sample_shape: &[usize]) -> Result<TaggedOperator, OperatorError> {
        let axes: Vec<usize> = (0..self.spatial_axes).collect();
        let op = wavelet_operator(sample_shape, &axes, self.levels)?;
        Ok(TaggedOperator::untagged(weighted(op, self.weight)))
    }

    fn affected_dims(&self, _desc: &AcqDescriptor, image_axes: usize) -> BTreeSet<usize> {
        (0..self.spatial_axes.min(image_axes)).collect()
    }

    fn weight(&self) -> f32 {
        self.weight
    }
}

/// Fourier sparsity along one batch axis (a temporal transform); couples that
/// axis and suppresses decomposition over it
#[derive(Debug, Clone)]
pub struct TemporalFourier {
    pub axis: usize,
    pub weight: f32,
}

impl TemporalFourier {
    pub fn new(axis: usize) -> Self {
        TemporalFourier { axis, weight: 1.0 }
    }
}

impl Regularizer for TemporalFourier {
    fn operator(&self, sample_shape: &[usize]) -> Result<TaggedOperator, OperatorError> {
        let op = plain_fourier_operator(sample_shape, &[self.axis])?;
        Ok(TaggedOperator::untagged(weighted(op, self.weight)))
    }

    fn affected_dims(&self, _desc: &AcqDescriptor, _image_axes: usize) -> BTreeSet<usize> {
        [self.axis].into_iter().collect()
    }

    fn weight(&self) -> f32 {
        self.weight
    }
}

/// low-rank coupling along one batch axis. The planner only consumes the
/// coupling metadata; the operator is the identity because the rank penalty
/// is not a linear map.
#[derive(Debug, Clone)]
pub struct LowRank {
    pub axis: usize,
    pub weight: f32,
}

impl LowRank {
    pub fn new(axis: usize) -> Self {
        LowRank { axis, weight: 1.0 }
    }
}

impl Regularizer for LowRank {
    fn operator(&self, sample_shape: &[usize]) -> Result<TaggedOperator, OperatorError> {
        Ok(TaggedOperator::untagged(weighted(
            Operator::identity(sample_shape),
            self.weight,
        )))
    }

    fn affected_dims(&self, _desc: &AcqDescriptor, _image_axes: usize) -> BTreeSet<usize> {
        [self.axis].into_iter().collect()
    }

    fn weight(&self) -> f32 {
        self.weight
    }
}

fn weighted(op: Operator, weight: f32) -> Operator {
    if weight == 1.0 {
        op
    } else {
        op.scaled(Complex32::new(weight, 0.))
    }
}
