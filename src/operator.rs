// Linear-operator algebra over column-major complex tensors. The operator
// kind set is closed; composition and normalization logic query a small trait
// table instead of dispatching through trait objects.

use crate::array_utils::{col_major_data, from_col_major};
use crate::error::OperatorError;
use crate::fourier::FourierOp;
use crate::pattern::SubsampleOp;
use crate::sense::SenseOp;
use crate::tags::{render, Tag};
use crate::wavelet::WaveletOp;
use ndarray::ArrayD;
use num_complex::Complex32;
use rayon::prelude::*;

/// properties queried by composition and normalization logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpTraits {
    pub linear: bool,
    pub diagonal: bool,
    pub fast_adjoint: bool,
    pub thread_safe: bool,
}

#[derive(Clone)]
pub enum OpKind {
    Identity,
    Sense(SenseOp),
    Fourier(FourierOp),
    Subsample(SubsampleOp),
    Wavelet(WaveletOp),
    /// outer applied after inner
    Compose(Box<Operator>, Box<Operator>),
    Scaled(Box<Operator>, Complex32),
}

/// a linear map between column-major tensors. The domain and codomain shapes
/// cover the operator's declared core axes; input axes beyond the domain are
/// batch axes and are broadcast explicitly, block by block.
#[derive(Clone)]
pub struct Operator {
    kind: OpKind,
    domain: Vec<usize>,
    codomain: Vec<usize>,
    threads: usize,
}

impl std::fmt::Debug for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            OpKind::Identity => "Identity",
            OpKind::Sense(_) => "Sense",
            OpKind::Fourier(_) => "Fourier",
            OpKind::Subsample(_) => "Subsample",
            OpKind::Wavelet(_) => "Wavelet",
            OpKind::Compose(_, _) => "Compose",
            OpKind::Scaled(_, _) => "Scaled",
        };
        f.debug_struct("Operator")
            .field("kind", &kind)
            .field("domain", &self.domain)
            .field("codomain", &self.codomain)
            .field("threads", &self.threads)
            .finish()
    }
}

impl std::fmt::Debug for TaggedOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaggedOperator")
            .field("op", &self.op)
            .field("domain_tags", &self.domain_tags)
            .field("codomain_tags", &self.codomain_tags)
            .finish()
    }
}

impl Operator {
    pub(crate) fn from_kind(kind: OpKind, domain: Vec<usize>, codomain: Vec<usize>) -> Self {
        Operator {
            kind,
            domain,
            codomain,
            threads: 1,
        }
    }

    pub fn identity(size: &[usize]) -> Self {
        Operator::from_kind(OpKind::Identity, size.to_vec(), size.to_vec())
    }

    pub fn domain(&self) -> &[usize] {
        &self.domain
    }

    pub fn codomain(&self) -> &[usize] {
        &self.codomain
    }

    pub fn domain_len(&self) -> usize {
        self.domain.iter().product()
    }

    pub fn codomain_len(&self) -> usize {
        self.codomain.iter().product()
    }

    /// explicit thread budget for apply and adjoint. A budget of 1 runs
    /// everything on the calling thread.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn traits(&self) -> OpTraits {
        let base = OpTraits {
            linear: true,
            diagonal: false,
            fast_adjoint: true,
            thread_safe: true,
        };
        match &self.kind {
            OpKind::Identity => OpTraits { diagonal: true, ..base },
            OpKind::Sense(_) | OpKind::Fourier(_) | OpKind::Subsample(_) | OpKind::Wavelet(_) => base,
            OpKind::Compose(outer, inner) => {
                let (o, i) = (outer.traits(), inner.traits());
                OpTraits {
                    linear: o.linear && i.linear,
                    diagonal: o.diagonal && i.diagonal,
                    fast_adjoint: o.fast_adjoint && i.fast_adjoint,
                    thread_safe: o.thread_safe && i.thread_safe,
                }
            }
            OpKind::Scaled(inner, _) => inner.traits(),
        }
    }

    pub fn scaled(self, factor: Complex32) -> Self {
        let domain = self.domain.clone();
        let codomain = self.codomain.clone();
        let threads = self.threads;
        Operator {
            kind: OpKind::Scaled(Box::new(self), factor),
            domain,
            codomain,
            threads,
        }
    }

    /// compose `self` after `inner`, so that the result applies `inner` first.
    /// The inner codomain must equal the outer domain element-for-element.
    pub fn compose(self, inner: Operator) -> Result<Operator, OperatorError> {
        if self.domain != inner.codomain {
            return Err(OperatorError::ShapeMismatch {
                inner: inner.codomain.clone(),
                outer: self.domain.clone(),
            });
        }
        let domain = inner.domain.clone();
        let codomain = self.codomain.clone();
        let threads = self.threads.max(inner.threads);
        Ok(Operator {
            kind: OpKind::Compose(Box::new(self), Box::new(inner)),
            domain,
            codomain,
            threads,
        })
    }

    /// apply the operator. Input shape must begin with the domain; trailing
    /// axes are broadcast as batch blocks.
    pub fn apply(&self, x: &ArrayD<Complex32>) -> Result<ArrayD<Complex32>, OperatorError> {
        self.run(x, false)
    }

    /// apply the adjoint. Input shape must begin with the codomain.
    pub fn adjoint_apply(&self, y: &ArrayD<Complex32>) -> Result<ArrayD<Complex32>, OperatorError> {
        self.run(y, true)
    }

    fn run(&self, x: &ArrayD<Complex32>, adjoint: bool) -> Result<ArrayD<Complex32>, OperatorError> {
        let (din, dout) = if adjoint {
            (&self.codomain, &self.domain)
        } else {
            (&self.domain, &self.codomain)
        };
        let shape = x.shape();
        if shape.len() < din.len() || shape[..din.len()] != din[..] {
            return Err(OperatorError::ApplyShape {
                domain: din.clone(),
                got: shape.to_vec(),
            });
        }
        let batch_dims = shape[din.len()..].to_vec();
        let nbatch: usize = batch_dims.iter().product();
        let in_len: usize = din.iter().product();
        let out_len: usize = dout.iter().product();

        let data = col_major_data(x);
        let mut out = vec![Complex32::ZERO; out_len * nbatch];

        // when a single block fills the budget, parallelism moves inside it
        let inner_par = self.threads > 1 && nbatch == 1;
        let block = |src: &[Complex32], dst: &mut [Complex32]| {
            if adjoint {
                self.adjoint_block(src, dst, inner_par);
            } else {
                self.apply_block(src, dst, inner_par);
            }
        };

        if self.threads > 1 && nbatch > 1 {
            out.par_chunks_exact_mut(out_len)
                .zip(data.par_chunks_exact(in_len))
                .for_each(|(dst, src)| block(src, dst));
        } else {
            out.chunks_exact_mut(out_len)
                .zip(data.chunks_exact(in_len))
                .for_each(|(dst, src)| block(src, dst));
        }

        let mut out_shape = dout.clone();
        out_shape.extend_from_slice(&batch_dims);
        Ok(from_col_major(&out_shape, out))
    }

    pub(crate) fn apply_block(&self, x: &[Complex32], out: &mut [Complex32], parallel: bool) {
        match &self.kind {
            OpKind::Identity => out.copy_from_slice(x),
            OpKind::Sense(op) => op.forward(x, out, parallel),
            OpKind::Fourier(op) => op.forward(x, out, parallel),
            OpKind::Subsample(op) => op.forward(x, out, parallel),
            OpKind::Wavelet(op) => op.forward(x, out, parallel),
            OpKind::Compose(outer, inner) => {
                let mut mid = vec![Complex32::ZERO; inner.codomain_len()];
                inner.apply_block(x, &mut mid, parallel);
                outer.apply_block(&mid, out, parallel);
            }
            OpKind::Scaled(inner, factor) => {
                inner.apply_block(x, out, parallel);
                let factor = *factor;
                out.iter_mut().for_each(|v| *v *= factor);
            }
        }
    }

    pub(crate) fn adjoint_block(&self, y: &[Complex32], out: &mut [Complex32], parallel: bool) {
        match &self.kind {
            OpKind::Identity => out.copy_from_slice(y),
            OpKind::Sense(op) => op.adjoint(y, out, parallel),
            OpKind::Fourier(op) => op.adjoint(y, out, parallel),
            OpKind::Subsample(op) => op.adjoint(y, out, parallel),
            OpKind::Wavelet(op) => op.adjoint(y, out, parallel),
            OpKind::Compose(outer, inner) => {
                let mut mid = vec![Complex32::ZERO; outer.domain_len()];
                outer.adjoint_block(y, &mut mid, parallel);
                inner.adjoint_block(&mid, out, parallel);
            }
            OpKind::Scaled(inner, factor) => {
                inner.adjoint_block(y, out, parallel);
                let conj = factor.conj();
                out.iter_mut().for_each(|v| *v *= conj);
            }
        }
    }
}

/// an operator together with optional semantic tags for its core axes (and
/// any batch axes the caller declares beyond them). Composition of two tagged
/// operators requires the inner output tags to equal the outer input tags;
/// untagged operators compose positionally with shape checks only.
#[derive(Clone)]
pub struct TaggedOperator {
    op: Operator,
    domain_tags: Option<Vec<Tag>>,
    codomain_tags: Option<Vec<Tag>>,
}

impl TaggedOperator {
    pub fn untagged(op: Operator) -> Self {
        TaggedOperator {
            op,
            domain_tags: None,
            codomain_tags: None,
        }
    }

    pub fn new(op: Operator, domain_tags: Vec<Tag>, codomain_tags: Vec<Tag>) -> Self {
        TaggedOperator {
            op,
            domain_tags: Some(domain_tags),
            codomain_tags: Some(codomain_tags),
        }
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn into_op(self) -> Operator {
        self.op
    }

    pub fn domain_tags(&self) -> Option<&[Tag]> {
        self.domain_tags.as_deref()
    }

    pub fn codomain_tags(&self) -> Option<&[Tag]> {
        self.codomain_tags.as_deref()
    }

    /// replace the tag tuples, e.g. to extend core tags with batch tags
    pub fn with_tags(mut self, domain_tags: Vec<Tag>, codomain_tags: Vec<Tag>) -> Self {
        self.domain_tags = Some(domain_tags);
        self.codomain_tags = Some(codomain_tags);
        self
    }

    pub fn apply(&self, x: &ArrayD<Complex32>) -> Result<ArrayD<Complex32>, OperatorError> {
        self.op.apply(x)
    }

    pub fn adjoint_apply(&self, y: &ArrayD<Complex32>) -> Result<ArrayD<Complex32>, OperatorError> {
        self.op.adjoint_apply(y)
    }

    pub fn scaled(self, factor: Complex32) -> Self {
        TaggedOperator {
            op: self.op.scaled(factor),
            domain_tags: self.domain_tags,
            codomain_tags: self.codomain_tags,
        }
    }

    /// compose `self` after `inner`
    pub fn compose(self, inner: TaggedOperator) -> Result<TaggedOperator, OperatorError> {
        if let (Some(inner_out), Some(outer_in)) = (&inner.codomain_tags, &self.domain_tags) {
            if inner_out != outer_in {
                return Err(OperatorError::TagMismatch {
                    inner: render(inner_out),
                    outer: render(outer_in),
                });
            }
        }
        let TaggedOperator {
            op: outer_op,
            codomain_tags,
            ..
        } = self;
        let TaggedOperator {
            op: inner_op,
            domain_tags,
            ..
        } = inner;
        Ok(TaggedOperator {
            op: outer_op.compose(inner_op)?,
            domain_tags,
            codomain_tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_utils::from_col_major;
    use crate::tags::Tag;

    fn ramp(dims: &[usize]) -> ArrayD<Complex32> {
        let n: usize = dims.iter().product();
        from_col_major(
            dims,
            (0..n).map(|i| Complex32::new(i as f32, -(i as f32))).collect(),
        )
    }

    #[test]
    fn identity_round_trip_with_batch() {
        let op = Operator::identity(&[4, 3]);
        let x = ramp(&[4, 3, 5]);
        let y = op.apply(&x).unwrap();
        assert_eq!(y.shape(), &[4, 3, 5]);
        assert_eq!(y, x);
        let z = op.adjoint_apply(&y).unwrap();
        assert_eq!(z, x);
    }

    #[test]
    fn scaled_adjoint_conjugates() {
        let op = Operator::identity(&[8]).scaled(Complex32::new(0., 2.));
        let x = ramp(&[8]);
        let y = op.apply(&x).unwrap();
        let z = op.adjoint_apply(&x).unwrap();
        for i in 0..8 {
            assert_eq!(y.as_slice_memory_order().unwrap()[i], x.as_slice_memory_order().unwrap()[i] * Complex32::new(0., 2.));
            assert_eq!(z.as_slice_memory_order().unwrap()[i], x.as_slice_memory_order().unwrap()[i] * Complex32::new(0., -2.));
        }
    }

    #[test]
    fn compose_rejects_shape_mismatch() {
        let a = Operator::identity(&[4, 4]);
        let b = Operator::identity(&[8]);
        let err = a.compose(b).unwrap_err();
        assert!(matches!(err, OperatorError::ShapeMismatch { .. }));
    }

    #[test]
    fn compose_rejects_tag_mismatch() {
        let a = TaggedOperator::new(
            Operator::identity(&[4]),
            vec![Tag::X],
            vec![Tag::FreqX],
        );
        let b = TaggedOperator::new(Operator::identity(&[4]), vec![Tag::X], vec![Tag::Y]);
        let err = a.compose(b).unwrap_err();
        assert!(matches!(err, OperatorError::TagMismatch { .. }));
    }

    #[test]
    fn untagged_skips_tag_check() {
        let a = TaggedOperator::new(
            Operator::identity(&[4]),
            vec![Tag::X],
            vec![Tag::FreqX],
        );
        let b = TaggedOperator::untagged(Operator::identity(&[4]));
        let c = a.compose(b).unwrap();
        assert_eq!(c.codomain_tags(), Some(&[Tag::FreqX][..]));
        assert_eq!(c.domain_tags(), None);
    }

    #[test]
    fn apply_rejects_wrong_prefix() {
        let op = Operator::identity(&[4, 4]);
        let x = ramp(&[4, 3]);
        assert!(matches!(
            op.apply(&x),
            Err(OperatorError::ApplyShape { .. })
        ));
    }

    #[test]
    fn trait_table() {
        let id = Operator::identity(&[4]);
        assert!(id.traits().diagonal);
        let scaled = id.clone().scaled(Complex32::new(2., 0.));
        assert!(scaled.traits().diagonal);
        let composed = scaled.compose(id).unwrap();
        assert!(composed.traits().diagonal && composed.traits().linear);
    }
}
