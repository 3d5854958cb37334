//! Segmentation record.

use crate::error::{CoreError, CoreResult};
use crate::model::Segment;
use crate::types::{RepresentationKind, SegmentIndex, BACKGROUND_INDEX};
use serde::Serialize;
use std::collections::BTreeMap;

/// The viewer-visible record of one segmentation.
///
/// Voxel data lives in the external volume named by `volume_id`; this record
/// holds metadata only.
///
/// # Invariants
///
/// - Index `0` never has a segment
/// - `segment_count()` equals the number of segments
/// - `active_segment_index()` is `None` or the index of a present segment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Segmentation {
    /// Unique identifier.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Representation kind of the voxel data.
    #[serde(rename = "type")]
    pub kind: RepresentationKind,
    /// Identifier of the external labelmap volume.
    pub volume_id: Option<String>,
    segments: BTreeMap<SegmentIndex, Segment>,
    segment_count: usize,
    active_segment_index: Option<SegmentIndex>,
    color_lut_index: u32,
    /// Whether this is the active segmentation of its group.
    pub is_active: bool,
    /// Whether the segmentation is drawn.
    pub is_visible: bool,
    /// Statistics computed by the engine or the application.
    pub cached_stats: BTreeMap<String, f64>,
    /// Lines shown alongside the segmentation.
    pub display_text: Vec<String>,
}

impl Segmentation {
    pub(crate) fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: RepresentationKind,
        color_lut_index: u32,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            volume_id: None,
            segments: BTreeMap::new(),
            segment_count: 0,
            active_segment_index: None,
            color_lut_index,
            is_active: false,
            is_visible: true,
            cached_stats: BTreeMap::new(),
            display_text: Vec::new(),
        }
    }

    /// Returns all segments keyed by index.
    #[must_use]
    pub fn segments(&self) -> &BTreeMap<SegmentIndex, Segment> {
        &self.segments
    }

    /// Returns the segment with the given index.
    #[must_use]
    pub fn segment(&self, segment_index: SegmentIndex) -> Option<&Segment> {
        self.segments.get(&segment_index)
    }

    pub(crate) fn segment_mut(&mut self, segment_index: SegmentIndex) -> CoreResult<&mut Segment> {
        let id = &self.id;
        self.segments
            .get_mut(&segment_index)
            .ok_or_else(|| CoreError::unknown_segment(id.clone(), segment_index))
    }

    /// Returns true if a segment with the index exists.
    #[must_use]
    pub fn contains_segment(&self, segment_index: SegmentIndex) -> bool {
        self.segments.contains_key(&segment_index)
    }

    /// Returns the number of segments.
    #[must_use]
    pub const fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Returns the index of the active segment.
    #[must_use]
    pub const fn active_segment_index(&self) -> Option<SegmentIndex> {
        self.active_segment_index
    }

    /// Returns the palette index of this segmentation.
    #[must_use]
    pub const fn color_lut_index(&self) -> u32 {
        self.color_lut_index
    }

    pub(crate) fn assign_color_lut_index(&mut self, index: u32) {
        self.color_lut_index = index;
    }

    /// Returns the lowest segment index present.
    #[must_use]
    pub fn lowest_segment_index(&self) -> Option<SegmentIndex> {
        self.segments.keys().next().copied()
    }

    /// Inserts a new segment.
    pub(crate) fn insert_segment(&mut self, segment: Segment) -> CoreResult<()> {
        let index = segment.segment_index;
        if index == BACKGROUND_INDEX {
            return Err(CoreError::InvalidIndex {
                segment_index: index,
            });
        }
        if self.segments.contains_key(&index) {
            return Err(CoreError::DuplicateSegment {
                segmentation_id: self.id.clone(),
                segment_index: index,
            });
        }
        self.segments.insert(index, segment);
        self.segment_count += 1;
        Ok(())
    }

    /// Removes a segment, returning it if it was present.
    ///
    /// The active index is left alone; callers pick a replacement.
    pub(crate) fn remove_segment(&mut self, segment_index: SegmentIndex) -> Option<Segment> {
        let removed = self.segments.remove(&segment_index)?;
        self.segment_count -= 1;
        if self.active_segment_index == Some(segment_index) {
            self.active_segment_index = None;
        }
        Some(removed)
    }

    /// Sets the active segment; `Some` must name a present segment.
    pub(crate) fn set_active_segment_index(
        &mut self,
        segment_index: Option<SegmentIndex>,
    ) -> CoreResult<()> {
        if let Some(index) = segment_index {
            if !self.segments.contains_key(&index) {
                return Err(CoreError::unknown_segment(self.id.clone(), index));
            }
        }
        self.active_segment_index = segment_index;
        Ok(())
    }

    /// Describes the first broken invariant, if any.
    #[must_use]
    pub fn invariant_violation(&self) -> Option<String> {
        if self.segments.contains_key(&BACKGROUND_INDEX) {
            return Some("background index has a segment".to_string());
        }
        if self.segment_count != self.segments.len() {
            return Some(format!(
                "segment count {} != {} segments",
                self.segment_count,
                self.segments.len()
            ));
        }
        if let Some((key, segment)) = self
            .segments
            .iter()
            .find(|(key, segment)| **key != segment.segment_index)
        {
            return Some(format!(
                "segment keyed {key} claims index {}",
                segment.segment_index
            ));
        }
        match self.active_segment_index {
            Some(index) if !self.segments.contains_key(&index) => {
                Some(format!("active segment {index} is not present"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rgba;

    fn segment(index: SegmentIndex) -> Segment {
        Segment::new(index, format!("Segment {index}"), Rgba::opaque([1, 2, 3]))
    }

    fn segmentation() -> Segmentation {
        Segmentation::new("seg", "Segmentation", RepresentationKind::Labelmap, 0)
    }

    #[test]
    fn insert_counts_segments() {
        let mut seg = segmentation();
        seg.insert_segment(segment(1)).unwrap();
        seg.insert_segment(segment(3)).unwrap();

        assert_eq!(seg.segment_count(), 2);
        assert_eq!(seg.lowest_segment_index(), Some(1));
        assert!(seg.invariant_violation().is_none());
    }

    #[test]
    fn insert_rejects_background_and_duplicates() {
        let mut seg = segmentation();
        assert!(matches!(
            seg.insert_segment(segment(0)),
            Err(CoreError::InvalidIndex { segment_index: 0 })
        ));

        seg.insert_segment(segment(2)).unwrap();
        assert!(matches!(
            seg.insert_segment(segment(2)),
            Err(CoreError::DuplicateSegment { segment_index: 2, .. })
        ));
        assert_eq!(seg.segment_count(), 1);
    }

    #[test]
    fn removing_active_segment_clears_active() {
        let mut seg = segmentation();
        seg.insert_segment(segment(1)).unwrap();
        seg.set_active_segment_index(Some(1)).unwrap();

        assert!(seg.remove_segment(1).is_some());
        assert_eq!(seg.active_segment_index(), None);
        assert!(seg.remove_segment(1).is_none());
        assert_eq!(seg.segment_count(), 0);
    }

    #[test]
    fn active_index_must_exist() {
        let mut seg = segmentation();
        assert!(matches!(
            seg.set_active_segment_index(Some(4)),
            Err(CoreError::UnknownSegment { segment_index: 4, .. })
        ));
        assert!(seg.set_active_segment_index(None).is_ok());
    }
}
