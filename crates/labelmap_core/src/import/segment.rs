//! Discrete per-segment slice stacks and their merge into a labelmap.

use crate::error::{CoreError, CoreResult};
use crate::types::{Rgb, SegmentIndex, BACKGROUND_INDEX};
use labelmap_volume::{VolumeGeometry, Voxel, VoxelFormat};
use serde::{Deserialize, Serialize};

/// One segment's contiguous stack of binary slices.
///
/// `pixel_data` holds `frame_count` frames of `columns * rows` values each,
/// frame after frame. Any nonzero value marks the voxel as belonging to the
/// segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscreteSegment {
    /// Index written into the labelmap.
    pub segment_index: SegmentIndex,
    /// Display label.
    pub label: String,
    /// Display color; the palette default is used when absent.
    #[serde(default)]
    pub color: Option<Rgb>,
    /// Number of frames in the stack.
    pub frame_count: usize,
    /// Physical position of the first frame.
    pub first_position: [f64; 3],
    /// Frame-major mask values.
    pub pixel_data: Vec<u8>,
}

impl DiscreteSegment {
    /// Creates a segment from its mask.
    #[must_use]
    pub fn new(
        segment_index: SegmentIndex,
        label: impl Into<String>,
        frame_count: usize,
        first_position: [f64; 3],
        pixel_data: Vec<u8>,
    ) -> Self {
        Self {
            segment_index,
            label: label.into(),
            color: None,
            frame_count,
            first_position,
            pixel_data,
        }
    }

    /// Sets the display color.
    #[must_use]
    pub const fn with_color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    /// Checks the segment against the destination geometry and format.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for index 0, or `InvalidSegmentData` if the
    /// index does not fit `format` or the mask length is not
    /// `frame_count * columns * rows`.
    pub fn validate(&self, geometry: &VolumeGeometry, format: VoxelFormat) -> CoreResult<()> {
        if self.segment_index == BACKGROUND_INDEX {
            return Err(CoreError::InvalidIndex {
                segment_index: self.segment_index,
            });
        }
        if self.segment_index > format.max_label() {
            return Err(CoreError::invalid_segment_data(
                self.segment_index,
                format!("index exceeds the largest label {}", format.max_label()),
            ));
        }
        let Some(expected) = self.frame_count.checked_mul(geometry.frame_len()) else {
            return Err(CoreError::invalid_segment_data(
                self.segment_index,
                format!("{} frames overflow the mask length", self.frame_count),
            ));
        };
        if self.pixel_data.len() != expected {
            return Err(CoreError::invalid_segment_data(
                self.segment_index,
                format!(
                    "expected {expected} mask values ({} frames of {}), got {}",
                    self.frame_count,
                    geometry.frame_len(),
                    self.pixel_data.len()
                ),
            ));
        }
        Ok(())
    }
}

/// Writes a segment's index wherever its mask is set, starting at frame
/// `frame_offset` of `destination`.
///
/// Voxels already holding another index are overwritten. Frames past the
/// end of the destination, including frames whose index overflows, are
/// skipped; the number skipped is returned.
pub fn write_segment(
    destination: &mut [Voxel],
    geometry: &VolumeGeometry,
    frame_offset: usize,
    segment: &DiscreteSegment,
) -> usize {
    let frame_len = geometry.frame_len();
    if frame_len == 0 {
        return 0;
    }

    let mut clipped = 0;
    for (local_frame, mask) in segment.pixel_data.chunks(frame_len).enumerate() {
        let Some(frame) = frame_offset
            .checked_add(local_frame)
            .filter(|&frame| frame < geometry.num_frames())
        else {
            clipped += 1;
            continue;
        };
        let start = frame * frame_len;
        let Some(target) = destination.get_mut(start..start + frame_len) else {
            clipped += 1;
            continue;
        };
        for (voxel, _) in target.iter_mut().zip(mask).filter(|(_, m)| **m != 0) {
            *voxel = segment.segment_index;
        }
    }
    clipped
}
