// Models the MRI acquisition as a composition of linear operators (coil
// sensitivity weighting, Fourier transform, k-space subsampling) and inverts
// it. The acquisition descriptor validates everything once up front; the
// encoding builder assembles the forward model; the decomposition planner and
// executor split batched problems into independent per-slice solves.

pub mod array_utils;
pub mod config;
pub mod decompose;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod fftshift;
pub mod fourier;
pub mod normalize;
pub mod operator;
pub mod pattern;
pub mod recon;
pub mod regularizer;
pub mod sense;
pub mod tags;
pub mod wavelet;

pub use config::{ExecutionStrategy, ProgressEvent, ReconConfig};
pub use decompose::{DecompositionPlan, ReconOutput};
pub use descriptor::{AcqDescriptor, AcqDescriptorBuilder};
pub use encode::{encoding_operator, simulate};
pub use error::{ConfigError, OperatorError, ReconError};
pub use operator::{OpTraits, Operator, TaggedOperator};
pub use pattern::{AxisSelector, SamplePattern};
pub use recon::{adjoint_reconstruct, reconstruct};
pub use regularizer::{LowRank, Regularizer, SpatialWavelet, TemporalFourier};
pub use tags::Tag;
