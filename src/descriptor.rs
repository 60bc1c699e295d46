// The acquisition descriptor aggregates k-space data, image geometry,
// sensitivity maps, the subsampling pattern and shift conventions. All
// cross-field consistency checks run once at construction; a descriptor that
// exists is valid. Updates go through the builder, which copies unspecified
// fields and re-validates.

use crate::error::ConfigError;
use crate::pattern::{ResolvedPattern, SamplePattern};
use crate::tags::{freq_tags, render, Tag};
use ndarray::ArrayD;
use num_complex::Complex32;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct AcqDescriptor {
    kspace_data: Option<ArrayD<Complex32>>,
    kspace_tags: Option<Vec<Tag>>,
    is_3d: bool,
    image_size: Vec<usize>,
    sensitivity_maps: Option<ArrayD<Complex32>>,
    subsampling: Option<SamplePattern>,
    resolved: Option<ResolvedPattern>,
    shifted_kspace_dims: BTreeSet<usize>,
    shifted_image_dims: BTreeSet<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct AcqDescriptorBuilder {
    kspace_data: Option<ArrayD<Complex32>>,
    kspace_tags: Option<Vec<Tag>>,
    is_3d: Option<bool>,
    image_size: Option<Vec<usize>>,
    sensitivity_maps: Option<ArrayD<Complex32>>,
    subsampling: Option<SamplePattern>,
    shifted_kspace_dims: BTreeSet<usize>,
    shifted_image_dims: BTreeSet<usize>,
}

impl AcqDescriptor {
    pub fn builder() -> AcqDescriptorBuilder {
        AcqDescriptorBuilder::default()
    }

    /// copy-with-override: every field of `self` seeds the builder
    pub fn to_builder(&self) -> AcqDescriptorBuilder {
        AcqDescriptorBuilder {
            kspace_data: self.kspace_data.clone(),
            kspace_tags: self.kspace_tags.clone(),
            is_3d: Some(self.is_3d),
            image_size: Some(self.image_size.clone()),
            sensitivity_maps: self.sensitivity_maps.clone(),
            subsampling: self.subsampling.clone(),
            shifted_kspace_dims: self.shifted_kspace_dims.clone(),
            shifted_image_dims: self.shifted_image_dims.clone(),
        }
    }

    pub fn kspace_data(&self) -> Option<&ArrayD<Complex32>> {
        self.kspace_data.as_ref()
    }

    pub fn kspace_tags(&self) -> Option<&[Tag]> {
        self.kspace_tags.as_deref()
    }

    pub fn is_3d(&self) -> bool {
        self.is_3d
    }

    pub fn image_size(&self) -> &[usize] {
        &self.image_size
    }

    pub fn spatial_rank(&self) -> usize {
        self.image_size.len()
    }

    pub fn sensitivity_maps(&self) -> Option<&ArrayD<Complex32>> {
        self.sensitivity_maps.as_ref()
    }

    pub fn subsampling(&self) -> Option<&SamplePattern> {
        self.subsampling.as_ref()
    }

    pub fn resolved_pattern(&self) -> Option<&ResolvedPattern> {
        self.resolved.as_ref()
    }

    pub fn shifted_kspace_dims(&self) -> &BTreeSet<usize> {
        &self.shifted_kspace_dims
    }

    pub fn shifted_image_dims(&self) -> &BTreeSet<usize> {
        &self.shifted_image_dims
    }

    /// number of coils, when sensitivity maps are present
    pub fn ncoils(&self) -> Option<usize> {
        self.sensitivity_maps
            .as_ref()
            .map(|m| m.shape()[m.ndim() - 1])
    }

    /// number of per-slice map planes; 1 unless the maps are 2D multi-slice
    pub fn map_slices(&self) -> usize {
        match self.sensitivity_maps.as_ref() {
            Some(m) if m.ndim() == 4 && self.spatial_rank() == 2 => m.shape()[2],
            _ => 1,
        }
    }

    /// number of leading k-space axes produced by the transform (pattern
    /// output groups, or the spatial rank when fully sampled)
    pub fn kspace_group_count(&self) -> usize {
        self.resolved
            .as_ref()
            .map(|r| r.groups().len())
            .unwrap_or(self.spatial_rank())
    }

    /// extents of the k-space batch axes (everything past the transform
    /// outputs and the coil axis)
    pub fn batch_shape(&self) -> Vec<usize> {
        match self.kspace_data.as_ref() {
            Some(d) => {
                let lead = self.kspace_group_count() + usize::from(self.sensitivity_maps.is_some());
                d.shape()[lead..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// tags of the k-space batch axes, when the data is tagged
    pub fn batch_tags(&self) -> Option<Vec<Tag>> {
        let tags = self.kspace_tags.as_ref()?;
        let lead = self.kspace_group_count() + usize::from(self.sensitivity_maps.is_some());
        Some(tags.get(lead..).unwrap_or_default().to_vec())
    }
}

impl AcqDescriptorBuilder {
    pub fn kspace_data(mut self, data: ArrayD<Complex32>) -> Self {
        self.kspace_data = Some(data);
        self
    }

    pub fn kspace_tags(mut self, tags: Vec<Tag>) -> Self {
        self.kspace_tags = Some(tags);
        self
    }

    pub fn is_3d(mut self, is_3d: bool) -> Self {
        self.is_3d = Some(is_3d);
        self
    }

    pub fn image_size(mut self, size: Vec<usize>) -> Self {
        self.image_size = Some(size);
        self
    }

    pub fn sensitivity_maps(mut self, maps: ArrayD<Complex32>) -> Self {
        self.sensitivity_maps = Some(maps);
        self
    }

    pub fn subsampling(mut self, pattern: SamplePattern) -> Self {
        self.subsampling = Some(pattern);
        self
    }

    pub fn shifted_kspace_dims(mut self, dims: BTreeSet<usize>) -> Self {
        self.shifted_kspace_dims = dims;
        self
    }

    pub fn shifted_image_dims(mut self, dims: BTreeSet<usize>) -> Self {
        self.shifted_image_dims = dims;
        self
    }

    fn infer_is_3d(&self) -> Result<bool, ConfigError> {
        if let Some(b) = self.is_3d {
            return Ok(b);
        }
        if let Some(tags) = self.kspace_tags.as_ref() {
            if tags.iter().any(|t| *t == Tag::FreqZ) {
                return Ok(true);
            }
            if tags.first() == Some(&Tag::FreqX) {
                return Ok(false);
            }
        }
        if let Some(size) = self.image_size.as_ref() {
            match size.len() {
                2 => return Ok(false),
                3 => return Ok(true),
                _ => {
                    return Err(ConfigError::DimensionalityMismatch {
                        declared: size.len(),
                        image_size: size.clone(),
                    })
                }
            }
        }
        // most pattern encodings carry their own rank
        if let Some(p) = self.subsampling.as_ref() {
            if !matches!(p, SamplePattern::FlatIndices(_)) {
                match p.transform_axes(false) {
                    2 => return Ok(false),
                    3 => return Ok(true),
                    _ => {}
                }
            }
        }
        Err(ConfigError::UnknownDimensionality)
    }

    fn map_spatial<'a>(&self, maps: &'a ArrayD<Complex32>, spatial_rank: usize) -> Result<&'a [usize], ConfigError> {
        let rank = maps.ndim();
        if rank != 3 && rank != 4 {
            return Err(ConfigError::MapRank { rank });
        }
        // 3-axis maps only describe a single 2D slice
        if rank == 3 && spatial_rank == 3 {
            return Err(ConfigError::MapRank { rank });
        }
        Ok(&maps.shape()[..spatial_rank])
    }

    fn derive_image_size(&self, spatial_rank: usize) -> Result<Vec<usize>, ConfigError> {
        let mut current: Option<(&'static str, Vec<usize>)> = None;

        let merge = |src: &'static str, size: Vec<usize>, current: &mut Option<(&'static str, Vec<usize>)>| {
            match current {
                None => {
                    *current = Some((src, size));
                    Ok(())
                }
                Some((prior_src, prior)) => {
                    if *prior != size {
                        Err(ConfigError::ImageSizeConflict {
                            src_a: *prior_src,
                            a: prior.clone(),
                            src_b: src,
                            b: size,
                        })
                    } else {
                        Ok(())
                    }
                }
            }
        };

        if let Some(size) = self.image_size.as_ref() {
            if size.len() != spatial_rank {
                return Err(ConfigError::DimensionalityMismatch {
                    declared: spatial_rank,
                    image_size: size.clone(),
                });
            }
            merge("the explicit image size", size.clone(), &mut current)?;
        }

        if let Some(maps) = self.sensitivity_maps.as_ref() {
            let spatial = self.map_spatial(maps, spatial_rank)?;
            merge("the sensitivity maps", spatial.to_vec(), &mut current)?;
        }

        // data anchors the size only when it is fully sampled; subsampled
        // data has the pattern codomain on its leading axes instead
        if self.subsampling.is_none() {
            if let Some(data) = self.kspace_data.as_ref() {
                if data.ndim() < spatial_rank {
                    return Err(ConfigError::DataRank {
                        rank: data.ndim(),
                        expected: spatial_rank,
                    });
                }
                merge("the k-space data", data.shape()[..spatial_rank].to_vec(), &mut current)?;
            }
        }

        if let Some(pattern) = self.subsampling.as_ref() {
            let is_3d = spatial_rank == 3;
            let hint = pattern.image_size_hint(is_3d);
            if hint.iter().all(|h| h.is_some()) {
                let full: Vec<usize> = hint.iter().map(|h| h.unwrap()).collect();
                merge("the subsampling pattern", full, &mut current)?;
            } else if let Some((src, size)) = current.as_ref() {
                for (axis, h) in hint.iter().enumerate() {
                    if let Some(n) = h {
                        if axis < size.len() && size[axis] != *n {
                            let shown: Vec<usize> =
                                hint.iter().map(|h| h.unwrap_or(0)).collect();
                            return Err(ConfigError::ImageSizeConflict {
                                src_a: *src,
                                a: size.clone(),
                                src_b: "the subsampling pattern",
                                b: shown,
                            });
                        }
                    }
                }
            }
        }

        current.map(|(_, s)| s).ok_or(ConfigError::MissingImageSize)
    }

    pub fn build(self) -> Result<AcqDescriptor, ConfigError> {
        let is_3d = self.infer_is_3d()?;
        let spatial_rank = if is_3d { 3 } else { 2 };

        let image_size = self.derive_image_size(spatial_rank)?;

        for set in [&self.shifted_kspace_dims, &self.shifted_image_dims] {
            for &axis in set {
                if axis >= spatial_rank {
                    return Err(ConfigError::ShiftAxisRange {
                        axis,
                        naxes: spatial_rank,
                    });
                }
            }
        }

        let resolved = match self.subsampling.as_ref() {
            Some(p) => Some(p.resolve(&image_size)?),
            None => None,
        };

        let (ncoils, nslices) = match self.sensitivity_maps.as_ref() {
            Some(maps) => {
                let spatial = self.map_spatial(maps, spatial_rank)?;
                if spatial != image_size {
                    return Err(ConfigError::MapShapeMismatch {
                        maps: maps.shape().to_vec(),
                        image: image_size.clone(),
                    });
                }
                let shape = maps.shape();
                let ncoils = shape[shape.len() - 1];
                let nslices = if maps.ndim() == 4 && spatial_rank == 2 {
                    shape[2]
                } else {
                    1
                };
                (Some(ncoils), nslices)
            }
            None => (None, 1),
        };

        // expected leading shape of the data: pattern codomain when
        // subsampled, the full grid otherwise, then the coil axis
        let lead_shape: Vec<usize> = match resolved.as_ref() {
            Some(r) => r.codomain_shape(),
            None => image_size.clone(),
        };
        let groups = lead_shape.len();

        if let Some(data) = self.kspace_data.as_ref() {
            let required = groups + usize::from(ncoils.is_some());
            if data.ndim() < required {
                return Err(ConfigError::DataRank {
                    rank: data.ndim(),
                    expected: required,
                });
            }
            let got = &data.shape()[..groups];
            if got != lead_shape {
                return Err(ConfigError::DataShapeMismatch {
                    expected: lead_shape.clone(),
                    got: got.to_vec(),
                });
            }
            if let Some(nc) = ncoils {
                if data.shape()[groups] != nc {
                    return Err(ConfigError::CoilCountMismatch {
                        maps: nc,
                        data: data.shape()[groups],
                    });
                }
            }
            if nslices > 1 {
                let slice_axis = groups + 1;
                if data.ndim() <= slice_axis {
                    return Err(ConfigError::DataRank {
                        rank: data.ndim(),
                        expected: slice_axis + 1,
                    });
                }
                if data.shape()[slice_axis] != nslices {
                    return Err(ConfigError::MapSliceMismatch {
                        maps: nslices,
                        data: data.shape()[slice_axis],
                    });
                }
            }

            if let Some(tags) = self.kspace_tags.as_ref() {
                if tags.len() != data.ndim() {
                    return Err(ConfigError::TagCount {
                        tags: tags.len(),
                        axes: data.ndim(),
                    });
                }
                let expected: Vec<Tag> = match resolved.as_ref() {
                    Some(r) => r.codomain_tags(),
                    None => freq_tags(spatial_rank),
                };
                if tags[..groups] != expected[..] {
                    return Err(ConfigError::TagOrder {
                        expected: render(&expected),
                        got: render(&tags[..groups]),
                    });
                }
                if ncoils.is_some() && tags[groups] != Tag::Coil {
                    return Err(ConfigError::MissingCoilTag { got: render(tags) });
                }
            }
        }

        Ok(AcqDescriptor {
            kspace_data: self.kspace_data,
            kspace_tags: self.kspace_tags,
            is_3d,
            image_size,
            sensitivity_maps: self.sensitivity_maps,
            subsampling: self.subsampling,
            resolved,
            shifted_kspace_dims: self.shifted_kspace_dims,
            shifted_image_dims: self.shifted_image_dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_utils::from_col_major;
    use crate::pattern::AxisSelector;
    use ndarray::ShapeBuilder;

    fn zeros(dims: &[usize]) -> ArrayD<Complex32> {
        from_col_major(dims, vec![Complex32::ZERO; dims.iter().product()])
    }

    #[test]
    fn size_inferred_from_fully_sampled_data() {
        let desc = AcqDescriptor::builder()
            .kspace_data(zeros(&[32, 24]))
            .is_3d(false)
            .build()
            .unwrap();
        assert_eq!(desc.image_size(), &[32, 24]);
        assert!(desc.batch_shape().is_empty());
    }

    #[test]
    fn size_inferred_from_mask_pattern() {
        let mask = ArrayD::from_shape_fn(vec![16, 12].f(), |ix| ix[0] % 2 == 0);
        let desc = AcqDescriptor::builder()
            .subsampling(SamplePattern::Mask(mask))
            .build()
            .unwrap();
        assert!(!desc.is_3d());
        assert_eq!(desc.image_size(), &[16, 12]);
    }

    #[test]
    fn conflicting_sizes_are_rejected() {
        // the size-mismatch rejection: (64,64,8) maps against (32,32,8) data
        let err = AcqDescriptor::builder()
            .kspace_data(zeros(&[32, 32, 8]))
            .sensitivity_maps(zeros(&[64, 64, 8]))
            .is_3d(false)
            .build()
            .unwrap_err();
        match err {
            ConfigError::ImageSizeConflict { a, b, .. } => {
                assert!(
                    (a == vec![64, 64] && b == vec![32, 32])
                        || (a == vec![32, 32] && b == vec![64, 64])
                );
            }
            other => panic!("expected a size conflict, got {other}"),
        }
    }

    #[test]
    fn coil_count_mismatch_is_rejected() {
        let err = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16, 4]))
            .sensitivity_maps(zeros(&[16, 16, 8]))
            .is_3d(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::CoilCountMismatch { maps: 8, data: 4 }));
    }

    #[test]
    fn tagged_data_must_lead_with_freq_axes() {
        let err = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16]))
            .kspace_tags(vec![Tag::FreqY, Tag::FreqX])
            .is_3d(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::TagOrder { .. }));
    }

    #[test]
    fn coil_tag_must_follow_freq_axes() {
        let err = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16, 4, 5]))
            .kspace_tags(vec![
                Tag::FreqX,
                Tag::FreqY,
                Tag::other("slice"),
                Tag::Coil,
            ])
            .sensitivity_maps(zeros(&[16, 16, 4]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingCoilTag { .. }));
    }

    #[test]
    fn third_freq_tag_implies_3d() {
        let desc = AcqDescriptor::builder()
            .kspace_data(zeros(&[8, 8, 4]))
            .kspace_tags(vec![Tag::FreqX, Tag::FreqY, Tag::FreqZ])
            .build()
            .unwrap();
        assert!(desc.is_3d());
        assert_eq!(desc.image_size(), &[8, 8, 4]);
    }

    #[test]
    fn batch_axes_sit_past_transform_and_coil() {
        let desc = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16, 4, 5, 3]))
            .sensitivity_maps(zeros(&[16, 16, 4]))
            .is_3d(false)
            .build()
            .unwrap();
        assert_eq!(desc.ncoils(), Some(4));
        assert_eq!(desc.batch_shape(), vec![5, 3]);
    }

    #[test]
    fn subsampled_data_matches_pattern_codomain() {
        let pattern = SamplePattern::PerAxis(vec![
            AxisSelector::Full,
            AxisSelector::Indices(vec![0, 2, 4, 6]),
        ]);
        let desc = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 4]))
            .subsampling(pattern.clone())
            .image_size(vec![16, 8])
            .build()
            .unwrap();
        assert_eq!(desc.kspace_group_count(), 2);

        let err = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 5]))
            .subsampling(pattern)
            .image_size(vec![16, 8])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DataShapeMismatch { .. }));
    }

    #[test]
    fn multi_slice_maps_need_a_matching_slice_axis() {
        let desc = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16, 4, 5]))
            .sensitivity_maps(zeros(&[16, 16, 5, 4]))
            .is_3d(false)
            .build()
            .unwrap();
        assert_eq!(desc.map_slices(), 5);

        let err = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16, 4, 6]))
            .sensitivity_maps(zeros(&[16, 16, 5, 4]))
            .is_3d(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MapSliceMismatch { maps: 5, data: 6 }));
    }

    #[test]
    fn builder_round_trip_overrides_one_field() {
        let desc = AcqDescriptor::builder()
            .kspace_data(zeros(&[16, 16, 3]))
            .is_3d(false)
            .build()
            .unwrap();
        let updated = desc
            .to_builder()
            .kspace_data(zeros(&[16, 16, 7]))
            .build()
            .unwrap();
        assert_eq!(updated.batch_shape(), vec![7]);
        // the original descriptor is untouched
        assert_eq!(desc.batch_shape(), vec![3]);
    }

    #[test]
    fn missing_everything_is_rejected() {
        let err = AcqDescriptor::builder().is_3d(false).build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingImageSize));
    }
}
