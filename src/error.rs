use thiserror::Error;

/// errors raised while constructing an acquisition descriptor or parsing a
/// configuration record. These are always fatal and reported before any
/// operator is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("image size could not be derived from any source (k-space data, sensitivity maps, subsampling pattern); supply it explicitly")]
    MissingImageSize,

    #[error("image dimensionality could not be derived; set is_3d explicitly or supply tagged data or an image size")]
    UnknownDimensionality,

    #[error("image size {a:?} from {src_a} conflicts with {b:?} from {src_b}")]
    ImageSizeConflict {
        src_a: &'static str,
        a: Vec<usize>,
        src_b: &'static str,
        b: Vec<usize>,
    },

    #[error("declared {declared}D acquisition but image size is {image_size:?}")]
    DimensionalityMismatch {
        declared: usize,
        image_size: Vec<usize>,
    },

    #[error("sensitivity maps must have 3 or 4 axes, got {rank}")]
    MapRank { rank: usize },

    #[error("sensitivity map spatial shape {maps:?} does not match image size {image:?}")]
    MapShapeMismatch {
        maps: Vec<usize>,
        image: Vec<usize>,
    },

    #[error("sensitivity maps carry {maps} coils but the k-space coil axis has extent {data}")]
    CoilCountMismatch { maps: usize, data: usize },

    #[error("sensitivity maps carry {maps} slices but the k-space slice axis has extent {data}")]
    MapSliceMismatch { maps: usize, data: usize },

    #[error("k-space data rank {rank} is too small, expected at least {expected} leading axes")]
    DataRank { rank: usize, expected: usize },

    #[error("k-space transform-axis shape {got:?} does not match the expected shape {expected:?}")]
    DataShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("k-space axis tags must lead with {expected:?}, got {got:?}")]
    TagOrder {
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("a coil tag must immediately follow the frequency axes when sensitivity maps are given; tags are {got:?}")]
    MissingCoilTag { got: Vec<String> },

    #[error("tag tuple has {tags} entries but the data has {axes} axes")]
    TagCount { tags: usize, axes: usize },

    #[error("shifted axis index {axis} is out of range for {naxes} transform axes")]
    ShiftAxisRange { axis: usize, naxes: usize },

    #[error("invalid subsampling pattern: {0}")]
    Pattern(#[from] OperatorError),

    #[error("invalid configuration options: {0}")]
    Options(String),
}

/// errors raised while constructing or composing linear operators
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("cannot compose: inner codomain {inner:?} does not match outer domain {outer:?}")]
    ShapeMismatch {
        inner: Vec<usize>,
        outer: Vec<usize>,
    },

    #[error("cannot compose: inner codomain tags {inner:?} do not match outer domain tags {outer:?}")]
    TagMismatch {
        inner: Vec<String>,
        outer: Vec<String>,
    },

    #[error("operator input shape {got:?} does not begin with the operator domain {domain:?}")]
    ApplyShape {
        domain: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("subsampling pattern consumes {pattern} transform axes but the acquisition declares {declared}")]
    PatternRank { pattern: usize, declared: usize },

    #[error("pattern index {index} is out of range for a grid of {grid} samples")]
    IndexRange { index: usize, grid: usize },

    #[error("coordinate {coord:?} is out of range for grid {dims:?}")]
    CoordRange { coord: Vec<usize>, dims: Vec<usize> },

    #[error("selector for axis {axis} has length {got} but the axis extent is {expected}")]
    SelectorLength {
        axis: usize,
        expected: usize,
        got: usize,
    },

    #[error("range {start}..{end} is invalid for axis {axis} of extent {extent}")]
    RangeBounds {
        axis: usize,
        start: usize,
        end: usize,
        extent: usize,
    },

    #[error("pattern grid shape {got:?} does not match the image size {expected:?}")]
    GridShape { expected: Vec<usize>, got: Vec<usize> },

    #[error("subsampling pattern selects no samples")]
    EmptyPattern,

    #[error("transform axis {axis} is out of range for rank {rank}")]
    AxisRange { axis: usize, rank: usize },

    #[error("axis extent {len} does not support {levels} wavelet levels")]
    WaveletLength { len: usize, levels: usize },

    #[error("reconstruction requires k-space data but the descriptor has none")]
    MissingKspace,
}

/// top-level reconstruction error
#[derive(Debug, Error)]
pub enum ReconError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    #[error("slice solve failed at batch index {index:?}: {source}")]
    Slice {
        index: Vec<usize>,
        #[source]
        source: Box<ReconError>,
    },

    #[error("solver failed: {0}")]
    Solver(String),
}
