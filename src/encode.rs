// Builds the forward model E = subsampling ∘ Fourier ∘ sensitivity from a
// validated acquisition descriptor. Composition order is fixed: sensitivity
// weighting innermost, then the transform, then subsampling. Stages behind
// the sensitivity operator declare the coil axis (and the map slice axis,
// when present) as passthrough core axes so that composed shapes and tag
// tuples match element-for-element.

use crate::descriptor::AcqDescriptor;
use crate::error::OperatorError;
use crate::fourier::fourier_operator;
use crate::operator::{Operator, TaggedOperator};
use crate::pattern::subsample_operator;
use crate::sense::sense_operator;
use crate::tags::{freq_tags, image_tags, kspace_tags, Tag};
use ndarray::ArrayD;
use num_complex::Complex32;

/// builds the encoding operator for the acquisition. `threads` is the
/// explicit budget for apply and adjoint; pass 1 inside an outer worker pool.
pub fn encoding_operator(desc: &AcqDescriptor, threads: usize) -> Result<TaggedOperator, OperatorError> {
    let spatial = desc.image_size().to_vec();
    let rank = spatial.len();
    let ncoils = desc.ncoils();
    let nslices = desc.map_slices();

    // core shape seen by the transform: spatial axes, then coil, then the
    // map slice axis when maps are per-slice
    let mut transform_dims = spatial.clone();
    if let Some(nc) = ncoils {
        transform_dims.push(nc);
    }
    if nslices > 1 {
        transform_dims.push(nslices);
    }
    let axes: Vec<usize> = (0..rank).collect();

    let sense = match desc.sensitivity_maps() {
        Some(maps) => Some(sense_operator(maps, &spatial)?),
        None => None,
    };

    let fourier = fourier_operator(
        &transform_dims,
        &axes,
        desc.shifted_image_dims(),
        desc.shifted_kspace_dims(),
    )?;

    let subsample = match desc.resolved_pattern() {
        Some(resolved) => Some(subsample_operator(resolved, &transform_dims[rank..])?),
        None => None,
    };

    let tagged = desc.kspace_tags().is_some();

    // batch tags in original order; the map slice axis leads them
    let batch = desc.batch_tags().unwrap_or_default();
    let slice_tag = batch.first().cloned();

    let extra_tags = |with_coil: bool| -> Vec<Tag> {
        let mut t = Vec::new();
        if with_coil && ncoils.is_some() {
            t.push(Tag::Coil);
        }
        if nslices > 1 {
            t.push(slice_tag.clone().unwrap_or_else(|| Tag::other("slice")));
        }
        t
    };

    let stage = |op: Operator, dom: Vec<Tag>, cod: Vec<Tag>| -> TaggedOperator {
        if tagged {
            TaggedOperator::new(op, dom, cod)
        } else {
            TaggedOperator::untagged(op)
        }
    };

    let mut image_core: Vec<Tag> = (0..rank).map(Tag::image).collect();
    image_core.extend(extra_tags(false));
    let mut coil_core: Vec<Tag> = (0..rank).map(Tag::image).collect();
    coil_core.extend(extra_tags(true));
    let mut freq_core = freq_tags(rank);
    freq_core.extend(extra_tags(true));

    let f = stage(fourier, coil_core.clone(), freq_core.clone());

    let mut e = match sense {
        Some(s) => {
            let s = stage(s, image_core.clone(), coil_core);
            f.compose(s)?
        }
        None => f,
    };

    if let Some(g) = subsample {
        let mut sub_out: Vec<Tag> = desc
            .resolved_pattern()
            .map(|r| r.codomain_tags())
            .unwrap_or_default();
        sub_out.extend(extra_tags(true));
        let g = stage(g, freq_core, sub_out);
        e = g.compose(e)?;
    }

    let e = TaggedOperator::untagged(e.into_op().with_threads(threads));

    if tagged {
        // full tag tuples per the canonical rule: image tags then batch tags
        // on the domain side, transform-output tags, coil, then batch tags on
        // the codomain side. The map slice axis already sits in the core, so
        // it is not repeated.
        let trailing = if nslices > 1 {
            batch.get(1..).unwrap_or(&[])
        } else {
            &batch[..]
        };
        let core_slice_tag = || slice_tag.clone().unwrap_or_else(|| Tag::other("slice"));
        let mut domain = image_tags(rank, &[]);
        if nslices > 1 {
            domain.push(core_slice_tag());
        }
        domain.extend_from_slice(trailing);
        let group_tags: Vec<Tag> = match desc.resolved_pattern() {
            Some(r) => r.codomain_tags(),
            None => freq_tags(rank),
        };
        let mut codomain = kspace_tags(&group_tags, ncoils.is_some(), &[]);
        if nslices > 1 {
            codomain.push(core_slice_tag());
        }
        codomain.extend_from_slice(trailing);
        Ok(e.with_tags(domain, codomain))
    } else {
        Ok(e)
    }
}

/// forward-simulate the acquisition: predicted k-space for a given image
pub fn simulate(desc: &AcqDescriptor, image: &ArrayD<Complex32>, threads: usize) -> Result<ArrayD<Complex32>, OperatorError> {
    let e = encoding_operator(desc, threads)?;
    e.apply(image)
}
