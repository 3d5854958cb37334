//! Input for creating or merging a segmentation record.

use crate::model::Segment;
use crate::types::{RepresentationKind, SegmentIndex};
use std::collections::{BTreeMap, BTreeSet};

/// Fields to create a segmentation with, or to merge into an existing one.
///
/// Absent fields keep their current value on merge and take defaults on
/// create. `segments` is only read on create; a merge never restructures an
/// existing record's segments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationSchema {
    /// Identifier of the segmentation.
    pub id: String,
    /// Display label; empty labels are ignored.
    pub label: Option<String>,
    /// Representation kind.
    pub kind: Option<RepresentationKind>,
    /// External labelmap volume.
    pub volume_id: Option<String>,
    /// Initial segments (create only).
    pub segments: Option<BTreeMap<SegmentIndex, Segment>>,
    /// Active segment.
    pub active_segment_index: Option<SegmentIndex>,
    /// Cached statistics, replacing the current ones.
    pub cached_stats: Option<BTreeMap<String, f64>>,
    /// Display text, replacing the current one.
    pub display_text: Option<Vec<String>>,
    /// Indices that must be locked; every other segment is unlocked.
    pub segments_locked: Option<BTreeSet<SegmentIndex>>,
    /// Visibility.
    pub is_visible: Option<bool>,
}

impl SegmentationSchema {
    /// Creates a schema that only names the segmentation.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the representation kind.
    #[must_use]
    pub const fn kind(mut self, kind: RepresentationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets the labelmap volume.
    #[must_use]
    pub fn volume_id(mut self, volume_id: impl Into<String>) -> Self {
        self.volume_id = Some(volume_id.into());
        self
    }

    /// Sets the initial segments.
    #[must_use]
    pub fn segments(mut self, segments: impl IntoIterator<Item = Segment>) -> Self {
        self.segments = Some(
            segments
                .into_iter()
                .map(|segment| (segment.segment_index, segment))
                .collect(),
        );
        self
    }

    /// Sets the active segment.
    #[must_use]
    pub const fn active_segment_index(mut self, segment_index: SegmentIndex) -> Self {
        self.active_segment_index = Some(segment_index);
        self
    }

    /// Sets the cached statistics.
    #[must_use]
    pub fn cached_stats(mut self, stats: BTreeMap<String, f64>) -> Self {
        self.cached_stats = Some(stats);
        self
    }

    /// Sets the display text.
    #[must_use]
    pub fn display_text(mut self, lines: Vec<String>) -> Self {
        self.display_text = Some(lines);
        self
    }

    /// Sets the locked segment indices.
    #[must_use]
    pub fn segments_locked(mut self, locked: impl IntoIterator<Item = SegmentIndex>) -> Self {
        self.segments_locked = Some(locked.into_iter().collect());
        self
    }

    /// Sets the visibility.
    #[must_use]
    pub const fn visible(mut self, visible: bool) -> Self {
        self.is_visible = Some(visible);
        self
    }

    /// Returns the label if it is present and non-empty.
    pub(crate) fn non_empty_label(&self) -> Option<&str> {
        self.label.as_deref().filter(|label| !label.is_empty())
    }
}
