// Subsampling patterns. Every encoding a pattern can arrive in is normalized
// to a tuple of output-axis groups, each either a separable per-axis index
// list or a collapsed flat gather list over the axes it consumes. The
// subsampling operator gathers according to the normalized form; its adjoint
// zero-fills.

use crate::array_utils::{col_maj_stride, index_to_subscript_col_maj, subscript_to_index_col_maj};
use crate::error::OperatorError;
use crate::operator::{OpKind, Operator};
use crate::tags::Tag;
use ndarray::ArrayD;
use num_complex::Complex32;
use rayon::prelude::*;

/// per-axis selector of a separable pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelector {
    /// keep every sample on this axis
    Full,
    /// keep a contiguous index range
    Range { start: usize, end: usize },
    /// keep samples where the mask is true; the mask length fixes the axis extent
    Mask(Vec<bool>),
    /// keep the listed indices in the given order
    Indices(Vec<usize>),
}

impl AxisSelector {
    /// axis extent implied by the selector, when it implies one
    fn extent_hint(&self) -> Option<usize> {
        match self {
            AxisSelector::Mask(m) => Some(m.len()),
            _ => None,
        }
    }

    fn resolve(&self, axis: usize, extent: usize) -> Result<Vec<usize>, OperatorError> {
        match self {
            AxisSelector::Full => Ok((0..extent).collect()),
            AxisSelector::Range { start, end } => {
                if *start >= *end || *end > extent {
                    return Err(OperatorError::RangeBounds {
                        axis,
                        start: *start,
                        end: *end,
                        extent,
                    });
                }
                Ok((*start..*end).collect())
            }
            AxisSelector::Mask(m) => {
                if m.len() != extent {
                    return Err(OperatorError::SelectorLength {
                        axis,
                        expected: extent,
                        got: m.len(),
                    });
                }
                Ok(m.iter()
                    .enumerate()
                    .filter(|(_, &keep)| keep)
                    .map(|(i, _)| i)
                    .collect())
            }
            AxisSelector::Indices(idx) => {
                for &i in idx {
                    if i >= extent {
                        return Err(OperatorError::IndexRange {
                            index: i,
                            grid: extent,
                        });
                    }
                }
                Ok(idx.clone())
            }
        }
    }
}

/// the closed set of pattern encodings
#[derive(Debug, Clone)]
pub enum SamplePattern {
    /// full boolean mask over the image grid; collapses to one `samples` axis
    Mask(ArrayD<bool>),
    /// col-maj linear indices into the full grid; the grid shape must come
    /// from elsewhere
    FlatIndices(Vec<usize>),
    /// multi-axis coordinates, one row per kept sample
    Coords(Vec<Vec<usize>>),
    /// one selector per transform axis; each keeps its own output axis
    PerAxis(Vec<AxisSelector>),
    /// hybrid for 3D: a selector on the readout axis plus a mask over the
    /// phase-encode plane
    PlaneMask {
        selector: AxisSelector,
        mask: ArrayD<bool>,
    },
}

impl SamplePattern {
    /// number of transform axes the pattern consumes. Flat indices carry no
    /// geometry and consume whatever the acquisition declares.
    pub fn transform_axes(&self, is_3d: bool) -> usize {
        match self {
            SamplePattern::Mask(m) => m.ndim(),
            SamplePattern::FlatIndices(_) => {
                if is_3d {
                    3
                } else {
                    2
                }
            }
            SamplePattern::Coords(c) => c.first().map(|r| r.len()).unwrap_or(0),
            SamplePattern::PerAxis(sel) => sel.len(),
            SamplePattern::PlaneMask { .. } => 3,
        }
    }

    /// per-axis image extents the pattern can derive on its own
    pub fn image_size_hint(&self, is_3d: bool) -> Vec<Option<usize>> {
        match self {
            SamplePattern::Mask(m) => m.shape().iter().map(|&n| Some(n)).collect(),
            SamplePattern::FlatIndices(_) => vec![None; self.transform_axes(is_3d)],
            SamplePattern::Coords(_) => vec![None; self.transform_axes(is_3d)],
            SamplePattern::PerAxis(sel) => sel.iter().map(|s| s.extent_hint()).collect(),
            SamplePattern::PlaneMask { selector, mask } => {
                let mut hint = vec![selector.extent_hint()];
                hint.extend(mask.shape().iter().map(|&n| Some(n)));
                hint
            }
        }
    }

    /// normalize against a concrete grid
    pub fn resolve(&self, image_size: &[usize]) -> Result<ResolvedPattern, OperatorError> {
        let declared = image_size.len();
        let consumed = self.transform_axes(declared == 3);
        if consumed != declared {
            return Err(OperatorError::PatternRank {
                pattern: consumed,
                declared,
            });
        }

        let groups = match self {
            SamplePattern::Mask(m) => {
                if m.shape() != image_size {
                    return Err(OperatorError::GridShape {
                        expected: image_size.to_vec(),
                        got: m.shape().to_vec(),
                    });
                }
                // col-maj order over the mask, independent of its memory layout
                let dims = m.shape().to_vec();
                let mut flat = Vec::new();
                let mut sub = vec![0usize; dims.len()];
                for idx in 0..m.len() {
                    index_to_subscript_col_maj(idx, &dims, &mut sub);
                    if m[sub.as_slice()] {
                        flat.push(idx);
                    }
                }
                vec![PatternGroup::Collapsed {
                    indices: flat,
                    dims,
                }]
            }
            SamplePattern::FlatIndices(idx) => {
                let grid: usize = image_size.iter().product();
                for &i in idx {
                    if i >= grid {
                        return Err(OperatorError::IndexRange { index: i, grid });
                    }
                }
                vec![PatternGroup::Collapsed {
                    indices: idx.clone(),
                    dims: image_size.to_vec(),
                }]
            }
            SamplePattern::Coords(coords) => {
                let mut flat = Vec::with_capacity(coords.len());
                for c in coords {
                    if c.len() != declared || c.iter().zip(image_size).any(|(&v, &n)| v >= n) {
                        return Err(OperatorError::CoordRange {
                            coord: c.clone(),
                            dims: image_size.to_vec(),
                        });
                    }
                    flat.push(subscript_to_index_col_maj(c, image_size));
                }
                vec![PatternGroup::Collapsed {
                    indices: flat,
                    dims: image_size.to_vec(),
                }]
            }
            SamplePattern::PerAxis(sel) => sel
                .iter()
                .enumerate()
                .map(|(a, s)| {
                    Ok(PatternGroup::Separable {
                        indices: s.resolve(a, image_size[a])?,
                        extent: image_size[a],
                        tag: Tag::freq(a),
                    })
                })
                .collect::<Result<Vec<_>, OperatorError>>()?,
            SamplePattern::PlaneMask { selector, mask } => {
                if mask.ndim() != 2 || mask.shape() != &image_size[1..] {
                    return Err(OperatorError::GridShape {
                        expected: image_size[1..].to_vec(),
                        got: mask.shape().to_vec(),
                    });
                }
                let plane_dims = mask.shape().to_vec();
                let mut flat = Vec::new();
                let mut sub = vec![0usize; 2];
                for idx in 0..mask.len() {
                    index_to_subscript_col_maj(idx, &plane_dims, &mut sub);
                    if mask[sub.as_slice()] {
                        flat.push(idx);
                    }
                }
                vec![
                    PatternGroup::Separable {
                        indices: selector.resolve(0, image_size[0])?,
                        extent: image_size[0],
                        tag: Tag::freq(0),
                    },
                    PatternGroup::Collapsed {
                        indices: flat,
                        dims: plane_dims,
                    },
                ]
            }
        };

        let resolved = ResolvedPattern {
            full_dims: image_size.to_vec(),
            groups,
        };
        if resolved.sample_count() == 0 {
            return Err(OperatorError::EmptyPattern);
        }
        Ok(resolved)
    }
}

/// one output axis of the normalized pattern
#[derive(Debug, Clone)]
pub enum PatternGroup {
    /// consumes one transform axis and keeps its identity
    Separable {
        indices: Vec<usize>,
        extent: usize,
        tag: Tag,
    },
    /// consumes `dims.len()` transform axes and collapses them into one
    /// `samples` axis; `indices` are col-maj into the consumed sub-grid
    Collapsed { indices: Vec<usize>, dims: Vec<usize> },
}

impl PatternGroup {
    fn len(&self) -> usize {
        match self {
            PatternGroup::Separable { indices, .. } => indices.len(),
            PatternGroup::Collapsed { indices, .. } => indices.len(),
        }
    }

    fn axes_consumed(&self) -> usize {
        match self {
            PatternGroup::Separable { .. } => 1,
            PatternGroup::Collapsed { dims, .. } => dims.len(),
        }
    }

    fn tag(&self) -> Tag {
        match self {
            PatternGroup::Separable { tag, .. } => tag.clone(),
            PatternGroup::Collapsed { .. } => Tag::Samples,
        }
    }
}

/// a pattern normalized against a concrete grid
#[derive(Debug, Clone)]
pub struct ResolvedPattern {
    full_dims: Vec<usize>,
    groups: Vec<PatternGroup>,
}

impl ResolvedPattern {
    pub fn full_dims(&self) -> &[usize] {
        &self.full_dims
    }

    pub fn groups(&self) -> &[PatternGroup] {
        &self.groups
    }

    /// shape of the subsampled output, one extent per group
    pub fn codomain_shape(&self) -> Vec<usize> {
        self.groups.iter().map(|g| g.len()).collect()
    }

    /// canonical output axis tags, one per group
    pub fn codomain_tags(&self) -> Vec<Tag> {
        self.groups.iter().map(|g| g.tag()).collect()
    }

    pub fn sample_count(&self) -> usize {
        self.groups.iter().map(|g| g.len()).product()
    }

    /// full grid size over kept samples
    pub fn acceleration_factor(&self) -> f64 {
        self.full_dims.iter().product::<usize>() as f64 / self.sample_count() as f64
    }

    /// flat col-maj gather indices into the full grid, ordered col-maj over
    /// the output axes
    pub fn gather_indices(&self) -> Vec<usize> {
        // per-group offsets into the full grid
        let mut offsets: Vec<Vec<usize>> = Vec::with_capacity(self.groups.len());
        let mut axis = 0usize;
        for g in &self.groups {
            match g {
                PatternGroup::Separable { indices, .. } => {
                    let stride = col_maj_stride(&self.full_dims, axis);
                    offsets.push(indices.iter().map(|&i| i * stride).collect());
                }
                PatternGroup::Collapsed { indices, dims } => {
                    let mut sub = vec![0usize; dims.len()];
                    let strides: Vec<usize> = (0..dims.len())
                        .map(|d| col_maj_stride(&self.full_dims, axis + d))
                        .collect();
                    offsets.push(
                        indices
                            .iter()
                            .map(|&i| {
                                index_to_subscript_col_maj(i, dims, &mut sub);
                                sub.iter().zip(&strides).map(|(&c, &s)| c * s).sum()
                            })
                            .collect(),
                    );
                }
            }
            axis += g.axes_consumed();
        }

        let counts: Vec<usize> = offsets.iter().map(|o| o.len()).collect();
        let total: usize = counts.iter().product();
        let mut gather = vec![0usize; total];
        for (o, g) in gather.iter_mut().enumerate() {
            let mut rem = o;
            let mut idx = 0usize;
            for (grp, &count) in offsets.iter().zip(&counts) {
                idx += grp[rem % count];
                rem /= count;
            }
            *g = idx;
        }
        gather
    }
}

#[derive(Clone)]
pub struct SubsampleOp {
    gather: Vec<usize>,
    grid_len: usize,
}

/// builds the subsampling operator for a resolved pattern. `passthrough` axes
/// (coil, per-slice map axes) sit behind the transform axes in both domain
/// and codomain and are copied block-wise.
pub fn subsample_operator(resolved: &ResolvedPattern, passthrough: &[usize]) -> Result<Operator, OperatorError> {
    let gather = resolved.gather_indices();
    if gather.is_empty() {
        return Err(OperatorError::EmptyPattern);
    }
    let grid_len: usize = resolved.full_dims().iter().product();

    let mut domain = resolved.full_dims().to_vec();
    domain.extend_from_slice(passthrough);
    let mut codomain = resolved.codomain_shape();
    codomain.extend_from_slice(passthrough);

    let op = SubsampleOp { gather, grid_len };
    Ok(Operator::from_kind(OpKind::Subsample(op), domain, codomain))
}

impl SubsampleOp {
    pub fn gather(&self) -> &[usize] {
        &self.gather
    }

    pub fn forward(&self, x: &[Complex32], out: &mut [Complex32], parallel: bool) {
        let k = self.gather.len();
        let pick = |(p, chunk): (usize, &mut [Complex32])| {
            let grid = &x[p * self.grid_len..(p + 1) * self.grid_len];
            for (o, &g) in chunk.iter_mut().zip(&self.gather) {
                *o = grid[g];
            }
        };
        if parallel {
            out.par_chunks_exact_mut(k).enumerate().for_each(pick);
        } else {
            out.chunks_exact_mut(k).enumerate().for_each(pick);
        }
    }

    /// adjoint zero-fills: unsampled grid positions stay zero
    pub fn adjoint(&self, y: &[Complex32], out: &mut [Complex32], parallel: bool) {
        let k = self.gather.len();
        let scatter = |(p, chunk): (usize, &mut [Complex32])| {
            chunk.fill(Complex32::ZERO);
            let samples = &y[p * k..(p + 1) * k];
            for (&g, &v) in self.gather.iter().zip(samples) {
                chunk[g] = v;
            }
        };
        if parallel {
            out.par_chunks_exact_mut(self.grid_len).enumerate().for_each(scatter);
        } else {
            out.chunks_exact_mut(self.grid_len).enumerate().for_each(scatter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_utils::from_col_major;
    use ndarray::ShapeBuilder;

    fn checker_mask(nx: usize, ny: usize) -> ArrayD<bool> {
        ArrayD::from_shape_fn(vec![nx, ny].f(), |ix| (ix[0] + ix[1]) % 2 == 0)
    }

    #[test]
    fn mask_collapses_to_one_axis() {
        let m = checker_mask(4, 4);
        let p = SamplePattern::Mask(m);
        assert_eq!(p.transform_axes(false), 2);
        assert_eq!(p.image_size_hint(false), vec![Some(4), Some(4)]);
        let r = p.resolve(&[4, 4]).unwrap();
        assert_eq!(r.codomain_shape(), vec![8]);
        assert_eq!(r.codomain_tags(), vec![Tag::Samples]);
        assert!((r.acceleration_factor() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn per_axis_keeps_separable_axes() {
        let p = SamplePattern::PerAxis(vec![
            AxisSelector::Full,
            AxisSelector::Mask(vec![true, false, true, false, true, false]),
        ]);
        assert_eq!(p.image_size_hint(false), vec![None, Some(6)]);
        let r = p.resolve(&[4, 6]).unwrap();
        assert_eq!(r.codomain_shape(), vec![4, 3]);
        assert_eq!(r.codomain_tags(), vec![Tag::FreqX, Tag::FreqY]);
        assert!((r.acceleration_factor() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn plane_mask_mixes_groups() {
        let mask = checker_mask(4, 4);
        let p = SamplePattern::PlaneMask {
            selector: AxisSelector::Full,
            mask,
        };
        assert_eq!(p.transform_axes(true), 3);
        let r = p.resolve(&[8, 4, 4]).unwrap();
        assert_eq!(r.codomain_shape(), vec![8, 8]);
        assert_eq!(r.codomain_tags(), vec![Tag::FreqX, Tag::Samples]);
    }

    #[test]
    fn coords_and_flat_agree() {
        let coords = SamplePattern::Coords(vec![vec![0, 0], vec![3, 1], vec![2, 2]]);
        let flat = SamplePattern::FlatIndices(vec![0, 3 + 4, 2 + 2 * 4]);
        let rc = coords.resolve(&[4, 3]).unwrap();
        let rf = flat.resolve(&[4, 3]).unwrap();
        assert_eq!(rc.gather_indices(), rf.gather_indices());
    }

    #[test]
    fn gather_order_is_col_major_over_output_axes() {
        let p = SamplePattern::PerAxis(vec![
            AxisSelector::Indices(vec![1, 3]),
            AxisSelector::Indices(vec![0, 2]),
        ]);
        let r = p.resolve(&[4, 4]).unwrap();
        // output (2, 2): first output axis fastest
        assert_eq!(r.gather_indices(), vec![1, 3, 1 + 8, 3 + 8]);
    }

    #[test]
    fn subsample_size_law_with_coils() {
        let m = checker_mask(6, 6);
        let kept = 18usize;
        let r = SamplePattern::Mask(m).resolve(&[6, 6]).unwrap();
        let ncoils = 4;
        let op = subsample_operator(&r, &[ncoils]).unwrap();
        assert_eq!(op.codomain_len(), kept * ncoils);
    }

    #[test]
    fn adjoint_zero_fills() {
        let r = SamplePattern::PerAxis(vec![
            AxisSelector::Indices(vec![0, 2]),
            AxisSelector::Full,
        ])
        .resolve(&[4, 2])
        .unwrap();
        let op = subsample_operator(&r, &[]).unwrap();
        let full = from_col_major(&[4, 2], (0..8).map(|i| Complex32::new(i as f32 + 1., 0.)).collect());
        let y = op.apply(&full).unwrap();
        assert_eq!(y.shape(), &[2, 2]);
        let z = op.adjoint_apply(&y).unwrap();
        let zs = z.as_slice_memory_order().unwrap();
        let fs = full.as_slice_memory_order().unwrap();
        for x in 0..4 {
            for yy in 0..2 {
                let idx = x + 4 * yy;
                if x % 2 == 0 {
                    assert_eq!(zs[idx], fs[idx], "sampled positions must survive the round trip");
                } else {
                    assert_eq!(zs[idx], Complex32::ZERO, "unsampled positions must be zeroed");
                }
            }
        }
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let p = SamplePattern::FlatIndices(vec![0, 100]);
        assert!(matches!(
            p.resolve(&[4, 4]),
            Err(OperatorError::IndexRange { .. })
        ));
    }

    #[test]
    fn rank_mismatch_is_rejected() {
        let p = SamplePattern::PerAxis(vec![AxisSelector::Full]);
        assert!(matches!(
            p.resolve(&[4, 4]),
            Err(OperatorError::PatternRank { .. })
        ));
    }

    #[test]
    fn empty_pattern_is_rejected() {
        let p = SamplePattern::FlatIndices(vec![]);
        assert!(matches!(p.resolve(&[4, 4]), Err(OperatorError::EmptyPattern)));
    }
}
