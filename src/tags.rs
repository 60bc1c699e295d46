// Semantic axis tags carried alongside shape metadata. Tag tuples are
// compared element-for-element at operator composition time.

use std::fmt;

/// semantic identity of one array axis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// image-space axes in canonical order
    X,
    Y,
    Z,
    /// frequency (k-space) axes in canonical order
    FreqX,
    FreqY,
    FreqZ,
    /// receiver-channel axis
    Coil,
    /// collapsed output axis of a non-separable subsampling pattern
    Samples,
    /// arbitrary batch axis (slice, time, contrast, ...)
    Other(String),
}

impl Tag {
    /// canonical image tag for transform axis `axis` (0-based)
    pub fn image(axis: usize) -> Tag {
        match axis {
            0 => Tag::X,
            1 => Tag::Y,
            2 => Tag::Z,
            _ => panic!("no canonical image tag for axis {axis}"),
        }
    }

    /// canonical frequency tag for transform axis `axis` (0-based)
    pub fn freq(axis: usize) -> Tag {
        match axis {
            0 => Tag::FreqX,
            1 => Tag::FreqY,
            2 => Tag::FreqZ,
            _ => panic!("no canonical frequency tag for axis {axis}"),
        }
    }

    pub fn other(name: impl Into<String>) -> Tag {
        Tag::Other(name.into())
    }

    pub fn is_freq(&self) -> bool {
        matches!(self, Tag::FreqX | Tag::FreqY | Tag::FreqZ)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::X => write!(f, "x"),
            Tag::Y => write!(f, "y"),
            Tag::Z => write!(f, "z"),
            Tag::FreqX => write!(f, "freq-x"),
            Tag::FreqY => write!(f, "freq-y"),
            Tag::FreqZ => write!(f, "freq-z"),
            Tag::Coil => write!(f, "coil"),
            Tag::Samples => write!(f, "samples"),
            Tag::Other(name) => write!(f, "{name}"),
        }
    }
}

/// canonical image-domain tag tuple: spatial axes then batch tags in their
/// original order
pub fn image_tags(spatial_rank: usize, batch: &[Tag]) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(spatial_rank + batch.len());
    for a in 0..spatial_rank {
        tags.push(Tag::image(a));
    }
    tags.extend_from_slice(batch);
    tags
}

/// canonical frequency tag tuple for a fully sampled grid
pub fn freq_tags(spatial_rank: usize) -> Vec<Tag> {
    (0..spatial_rank).map(Tag::freq).collect()
}

/// canonical k-space tag tuple: transform-output tags, a coil tag when coils
/// are present, then batch tags in their original order
pub fn kspace_tags(transform: &[Tag], with_coil: bool, batch: &[Tag]) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(transform.len() + 1 + batch.len());
    tags.extend_from_slice(transform);
    if with_coil {
        tags.push(Tag::Coil);
    }
    tags.extend_from_slice(batch);
    tags
}

/// render a tag tuple for error messages
pub fn render(tags: &[Tag]) -> Vec<String> {
    tags.iter().map(|t| t.to_string()).collect()
}
