//! Property-based test generators using proptest.
//!
//! Operations are generated over a small pool of segmentation identifiers
//! and segment indices so that sequences collide often: duplicate adds,
//! removes of absent segments and edits of removed segmentations all show
//! up regularly.

use crate::fixtures::TestHarness;
use labelmap_core::{CoreResult, Rgb, SegmentIndex, SegmentProperties, SegmentationSchema};
use proptest::prelude::*;

/// Segmentation identifiers used by generated operations.
pub const SEGMENTATION_IDS: &[&str] = &["liver", "kidney", "spleen"];

/// Strategy for segment indices, including the reserved index 0.
pub fn segment_index_strategy() -> impl Strategy<Value = SegmentIndex> {
    prop_oneof![
        1 => Just(0u16),
        9 => 1..=12u16,
    ]
}

/// Strategy for one of [`SEGMENTATION_IDS`].
pub fn segmentation_id_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(SEGMENTATION_IDS)
}

/// Strategy for colors.
pub fn rgb_strategy() -> impl Strategy<Value = Rgb> {
    prop::array::uniform3(any::<u8>())
}

/// Strategy for opacities, occasionally out of range.
pub fn opacity_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![
        9 => 0.0f32..=1.0,
        1 => Just(1.5f32),
    ]
}

/// A public operation applied to a [`TestHarness`].
#[derive(Debug, Clone)]
pub enum SegmentOp {
    /// Create (or merge into) a segmentation and show it.
    CreateSegmentation(&'static str),
    /// Remove a segmentation.
    RemoveSegmentation(&'static str),
    /// Add a segment with optional properties.
    AddSegment {
        /// Target segmentation.
        segmentation_id: &'static str,
        /// Segment index.
        segment_index: SegmentIndex,
        /// Color property.
        color: Option<Rgb>,
        /// Opacity property.
        opacity: Option<f32>,
        /// Request the segment become active.
        active: bool,
    },
    /// Remove a segment.
    RemoveSegment(&'static str, SegmentIndex),
    /// Make a segment active.
    SetActive(&'static str, SegmentIndex),
    /// Show or hide a segment.
    SetVisibility(&'static str, SegmentIndex, bool),
    /// Lock or unlock a segment.
    SetLocked(&'static str, SegmentIndex, bool),
    /// Recolor a segment.
    SetColor(&'static str, SegmentIndex, Rgb),
    /// Change a segment's opacity.
    SetOpacity(&'static str, SegmentIndex, f32),
    /// Toggle a segmentation's visibility.
    ToggleVisibility(&'static str),
}

/// Strategy for one operation.
pub fn segment_op_strategy() -> impl Strategy<Value = SegmentOp> {
    let id = segmentation_id_strategy;
    let index = segment_index_strategy;
    prop_oneof![
        2 => id().prop_map(SegmentOp::CreateSegmentation),
        1 => id().prop_map(SegmentOp::RemoveSegmentation),
        5 => (
            id(),
            index(),
            prop::option::of(rgb_strategy()),
            prop::option::of(opacity_strategy()),
            any::<bool>(),
        )
            .prop_map(|(segmentation_id, segment_index, color, opacity, active)| {
                SegmentOp::AddSegment {
                    segmentation_id,
                    segment_index,
                    color,
                    opacity,
                    active,
                }
            }),
        3 => (id(), index()).prop_map(|(s, i)| SegmentOp::RemoveSegment(s, i)),
        2 => (id(), index()).prop_map(|(s, i)| SegmentOp::SetActive(s, i)),
        1 => (id(), index(), any::<bool>()).prop_map(|(s, i, v)| SegmentOp::SetVisibility(s, i, v)),
        1 => (id(), index(), any::<bool>()).prop_map(|(s, i, v)| SegmentOp::SetLocked(s, i, v)),
        1 => (id(), index(), rgb_strategy()).prop_map(|(s, i, c)| SegmentOp::SetColor(s, i, c)),
        1 => (id(), index(), opacity_strategy()).prop_map(|(s, i, o)| SegmentOp::SetOpacity(s, i, o)),
        1 => id().prop_map(SegmentOp::ToggleVisibility),
    ]
}

/// Strategy for a sequence of operations.
pub fn segment_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<SegmentOp>> {
    prop::collection::vec(segment_op_strategy(), 1..max_len)
}

/// Applies an operation, returning whether it succeeded.
///
/// Errors are expected for many generated operations and are not treated as
/// test failures; invariants are checked by the caller.
pub fn apply_op(harness: &TestHarness, op: &SegmentOp) -> bool {
    let mutator = harness.mutator();
    let result: CoreResult<()> = match op {
        SegmentOp::CreateSegmentation(id) => harness
            .add_or_update_segmentation(SegmentationSchema::new(*id))
            .and_then(|record| {
                if harness.groups_with_segmentation(&record.id).is_empty() {
                    harness.add_representation_to_group(crate::fixtures::DEFAULT_GROUP, id)?;
                }
                Ok(())
            }),
        SegmentOp::RemoveSegmentation(id) => harness.remove_segmentation(id),
        SegmentOp::AddSegment {
            segmentation_id,
            segment_index,
            color,
            opacity,
            active,
        } => {
            let mut properties = SegmentProperties::new();
            properties.color = *color;
            properties.opacity = *opacity;
            properties.active = *active;
            mutator
                .add_segment(segmentation_id, *segment_index, &properties, None)
                .map(|_| ())
        }
        SegmentOp::RemoveSegment(id, index) => mutator.remove_segment(id, *index).map(|_| ()),
        SegmentOp::SetActive(id, index) => mutator.set_active_segment(id, *index).map(|_| ()),
        SegmentOp::SetVisibility(id, index, visible) => mutator
            .set_segment_visibility(id, *index, *visible, None)
            .map(|_| ()),
        SegmentOp::SetLocked(id, index, locked) => {
            mutator.set_segment_locked(id, *index, *locked).map(|_| ())
        }
        SegmentOp::SetColor(id, index, color) => mutator
            .set_segment_color(id, *index, *color, None)
            .map(|_| ()),
        SegmentOp::SetOpacity(id, index, opacity) => mutator
            .set_segment_opacity(id, *index, *opacity, None)
            .map(|_| ()),
        SegmentOp::ToggleVisibility(id) => mutator.toggle_segmentation_visibility(id).map(|_| ()),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn op_strategy_generates() {
        let mut runner = TestRunner::default();
        for _ in 0..50 {
            let ops = segment_ops_strategy(10)
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(!ops.is_empty());
        }
    }

    #[test]
    fn create_then_add_succeeds() {
        let harness = TestHarness::new();
        assert!(apply_op(&harness, &SegmentOp::CreateSegmentation("liver")));
        assert!(apply_op(
            &harness,
            &SegmentOp::AddSegment {
                segmentation_id: "liver",
                segment_index: 1,
                color: Some([1, 2, 3]),
                opacity: None,
                active: false,
            }
        ));
        assert!(!apply_op(&harness, &SegmentOp::RemoveSegment("liver", 0)));
    }
}
