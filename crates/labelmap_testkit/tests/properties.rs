//! Property tests over random sequences of segmentation operations.

use labelmap_core::{AnnotationEngine, CoreError, SegmentProperties};
use labelmap_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Checks every cross-cutting invariant of the harness state.
fn check_state(harness: &TestHarness) -> Result<(), TestCaseError> {
    let records = harness.segmentations();

    for record in &records {
        prop_assert_eq!(record.invariant_violation(), None, "{}", record.id);
        prop_assert!(record.segment(0).is_none());
        prop_assert_eq!(record.segment_count(), record.segments().len());
        if let Some(active) = record.active_segment_index() {
            prop_assert!(record.contains_segment(active));
            prop_assert_eq!(harness.engine.active_segment_index(&record.id), Some(active));
        }
    }

    let palettes: BTreeSet<u32> = records.iter().map(|r| r.color_lut_index()).collect();
    prop_assert_eq!(palettes.len(), records.len(), "palette indices are shared");

    for record in &records {
        let Ok(uid) = harness.sync().resolve_representation(DEFAULT_GROUP, &record.id) else {
            continue;
        };
        for segment in record.segments().values() {
            let drawn = harness
                .sync()
                .segment_rgba(DEFAULT_GROUP, &uid, segment.segment_index);
            prop_assert_eq!(drawn, segment.rgba());
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_operations_preserve_invariants(ops in segment_ops_strategy(40)) {
        let harness = TestHarness::new();
        for op in &ops {
            apply_op(&harness, op);
            check_state(&harness)?;
        }
    }

    #[test]
    fn palette_reuses_lowest_free_index(removed in 0usize..4) {
        let harness = TestHarness::new();
        let ids = ["a", "b", "c", "d"];
        let mut indices = Vec::new();
        for id in ids {
            indices.push(harness.seed_segmentation(id, &[]).color_lut_index());
        }

        harness.remove_segmentation(ids[removed]).unwrap();
        let reused = harness.seed_segmentation("e", &[]).color_lut_index();

        prop_assert_eq!(reused, indices[removed]);
    }

    #[test]
    fn background_index_never_added(
        id in segmentation_id_strategy(),
        color in prop::option::of(rgb_strategy()),
        create in any::<bool>(),
    ) {
        let harness = TestHarness::new();
        if create {
            harness.seed_segmentation(id, &[1]);
        }
        let mut properties = SegmentProperties::new();
        properties.color = color;

        let result = harness.mutator().add_segment(id, 0, &properties, None);

        prop_assert!(
            matches!(result, Err(CoreError::InvalidIndex { segment_index: 0 })),
            "expected InvalidIndex for segment_index 0, got {:?}",
            result
        );
        prop_assert!(harness.recorder.events().is_empty());
    }

    #[test]
    fn removing_segments_leaves_lowest_active(
        indices in prop::collection::btree_set(1u16..=12, 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let harness = TestHarness::new();
        let indices: Vec<u16> = indices.into_iter().collect();
        harness.seed_segmentation("seg", &indices);
        let removed = indices[pick.index(indices.len())];
        harness.mutator().set_active_segment("seg", removed).unwrap();

        let record = harness.mutator().remove_segment("seg", removed).unwrap().unwrap();

        let expected = indices.iter().copied().find(|i| *i != removed);
        prop_assert_eq!(record.active_segment_index(), expected);
        prop_assert_eq!(
            harness.engine.active_segment_index("seg"),
            Some(expected.unwrap_or(1))
        );
    }
}
