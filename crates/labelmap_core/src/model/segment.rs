//! Segment metadata.

use crate::error::{CoreError, CoreResult};
use crate::types::{Rgb, Rgba, SegmentIndex};
use serde::{Deserialize, Serialize};

/// One labeled region of a segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Display label.
    pub label: String,
    /// Index of the segment; equal to its key in the segmentation.
    pub segment_index: SegmentIndex,
    /// Display color.
    pub color: Rgb,
    /// Opacity in `[0, 1]`.
    pub opacity: f32,
    /// Whether the segment is drawn.
    pub is_visible: bool,
    /// Whether edits to the segment's voxels are blocked.
    pub is_locked: bool,
}

impl Segment {
    /// Creates a visible, unlocked segment.
    #[must_use]
    pub fn new(segment_index: SegmentIndex, label: impl Into<String>, color: Rgba) -> Self {
        Self {
            label: label.into(),
            segment_index,
            color: color.rgb,
            opacity: color.alpha,
            is_visible: true,
            is_locked: false,
        }
    }

    /// Returns color and opacity combined.
    #[must_use]
    pub const fn rgba(&self) -> Rgba {
        Rgba::new(self.color, self.opacity)
    }
}

/// Optional properties applied when adding or updating a segment.
///
/// Every present field is applied; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentProperties {
    /// New label.
    pub label: Option<String>,
    /// New color.
    pub color: Option<Rgb>,
    /// New opacity.
    pub opacity: Option<f32>,
    /// New visibility.
    pub visibility: Option<bool>,
    /// New lock state.
    pub is_locked: Option<bool>,
    /// Make the segment the active one.
    pub active: bool,
}

impl SegmentProperties {
    /// Creates an empty property set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the color.
    #[must_use]
    pub const fn color(mut self, color: Rgb) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the opacity.
    #[must_use]
    pub const fn opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn visibility(mut self, visible: bool) -> Self {
        self.visibility = Some(visible);
        self
    }

    /// Sets the lock state.
    #[must_use]
    pub const fn locked(mut self, locked: bool) -> Self {
        self.is_locked = Some(locked);
        self
    }

    /// Marks the segment active.
    #[must_use]
    pub const fn active(mut self) -> Self {
        self.active = true;
        self
    }

    /// Checks value ranges before anything is applied.
    pub fn validate(&self) -> CoreResult<()> {
        match self.opacity {
            Some(opacity) => validate_opacity(opacity),
            None => Ok(()),
        }
    }
}

/// Rejects opacities outside `[0, 1]` (and NaN).
pub(crate) fn validate_opacity(opacity: f32) -> CoreResult<()> {
    if (0.0..=1.0).contains(&opacity) {
        Ok(())
    } else {
        Err(CoreError::InvalidOpacity { opacity })
    }
}
