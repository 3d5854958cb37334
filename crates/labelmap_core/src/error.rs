//! Error types for the segmentation core.

use crate::types::{RepresentationKind, SegmentIndex};
use labelmap_volume::VolumeError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in segmentation operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Volume store error.
    #[error("volume error: {0}")]
    Volume(#[from] VolumeError),

    /// The reserved background index was referenced.
    #[error("segment index {segment_index} is reserved")]
    InvalidIndex {
        /// The offending index.
        segment_index: SegmentIndex,
    },

    /// A segment with this index already exists.
    #[error("segment {segment_index} already exists in segmentation {segmentation_id}")]
    DuplicateSegment {
        /// The segmentation.
        segmentation_id: String,
        /// The duplicate index.
        segment_index: SegmentIndex,
    },

    /// No segmentation is registered under the identifier.
    #[error("segmentation not found: {segmentation_id}")]
    UnknownSegmentation {
        /// The identifier that was looked up.
        segmentation_id: String,
    },

    /// The segmentation has no segment with this index.
    #[error("segment {segment_index} not found in segmentation {segmentation_id}")]
    UnknownSegment {
        /// The segmentation.
        segmentation_id: String,
        /// The missing index.
        segment_index: SegmentIndex,
    },

    /// The segmentation has no representation in the viewport group.
    #[error("segmentation {segmentation_id} has no representation in group {group_id}")]
    MissingRepresentation {
        /// The segmentation.
        segmentation_id: String,
        /// The viewport group searched.
        group_id: String,
    },

    /// No viewport group exists to target.
    #[error("no viewport groups are registered")]
    NoViewportGroups,

    /// The referenced volume is not in the volume store.
    #[error("referenced volume not found: {volume_id}")]
    MissingVolume {
        /// The volume identifier.
        volume_id: String,
    },

    /// A segment's first slice does not lie on a slice of the reference volume.
    #[error(
        "segment {segment_index} starts at estimated slice {estimated_slice}, which is not within {tolerance} of a slice boundary"
    )]
    MisalignedSlice {
        /// The imported segment.
        segment_index: SegmentIndex,
        /// Estimated (fractional) destination slice.
        estimated_slice: f64,
        /// Tolerance that was exceeded.
        tolerance: f64,
    },

    /// An allocated buffer does not have the shape of its source.
    #[error("volume shape mismatch: expected {expected:?}, got {actual:?}")]
    VolumeShapeMismatch {
        /// Dimensions of the referenced volume.
        expected: [usize; 3],
        /// Dimensions of the allocated buffer.
        actual: [usize; 3],
    },

    /// The engine's segmentation lacks a labelmap representation.
    #[error("segmentation {segmentation_id} has no labelmap representation (found {found:?})")]
    UnsupportedRepresentation {
        /// The segmentation.
        segmentation_id: String,
        /// Representation kinds the engine reported.
        found: Vec<RepresentationKind>,
    },

    /// A segmentation already exists under the identifier.
    #[error("segmentation already exists: {segmentation_id}")]
    SegmentationExists {
        /// The identifier.
        segmentation_id: String,
    },

    /// An import into the identifier is already running.
    #[error("import already in progress for segmentation {segmentation_id}")]
    ImportInProgress {
        /// The identifier.
        segmentation_id: String,
    },

    /// Opacity outside `[0, 1]`.
    #[error("opacity {opacity} is outside [0, 1]")]
    InvalidOpacity {
        /// The rejected value.
        opacity: f32,
    },

    /// Imported segment data is malformed.
    #[error("invalid data for segment {segment_index}: {message}")]
    InvalidSegmentData {
        /// The imported segment.
        segment_index: SegmentIndex,
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown segmentation error.
    pub fn unknown_segmentation(segmentation_id: impl Into<String>) -> Self {
        Self::UnknownSegmentation {
            segmentation_id: segmentation_id.into(),
        }
    }

    /// Creates an unknown segment error.
    pub fn unknown_segment(segmentation_id: impl Into<String>, segment_index: SegmentIndex) -> Self {
        Self::UnknownSegment {
            segmentation_id: segmentation_id.into(),
            segment_index,
        }
    }

    /// Creates a missing representation error.
    pub fn missing_representation(
        segmentation_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self::MissingRepresentation {
            segmentation_id: segmentation_id.into(),
            group_id: group_id.into(),
        }
    }

    /// Creates an invalid segment data error.
    pub fn invalid_segment_data(segment_index: SegmentIndex, message: impl Into<String>) -> Self {
        Self::InvalidSegmentData {
            segment_index,
            message: message.into(),
        }
    }
}
