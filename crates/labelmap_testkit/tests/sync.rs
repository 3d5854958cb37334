//! Integration tests for reconciling engine notifications into the store.

use labelmap_core::{Config, EngineNotification, EventKind, RepresentationKind};
use labelmap_testkit::prelude::*;

fn harness_with_segments() -> TestHarness {
    let harness = TestHarness::new();
    harness.seed_segmentation("seg", &[1, 2]);
    harness
}

#[test]
fn engine_metadata_is_merged_into_the_store() {
    let harness = harness_with_segments();

    assert!(harness.engine.edit_segmentation("seg", |state| {
        state.label = "Edited".into();
        state.segments_locked.insert(2);
        state.cached_stats.insert("volume".into(), 12.5);
        state.active_segment_index = Some(2);
    }));
    harness.engine.emit_metadata_modified("seg");

    let record = harness.segmentation("seg").unwrap();
    assert_eq!(record.label, "Edited");
    assert!(!record.segment(1).unwrap().is_locked);
    assert!(record.segment(2).unwrap().is_locked);
    assert_eq!(record.active_segment_index(), Some(2));
    assert_eq!(record.cached_stats.get("volume"), Some(&12.5));
    assert_eq!(record.segment_count(), 2);

    assert_eq!(harness.recorder.kinds(), vec![EventKind::SegmentationUpdated]);
    let stats = harness.sync_stats();
    assert_eq!(stats.received, 1);
    assert_eq!(stats.reconciled, 1);
    assert_eq!(stats.failed, 0);
}

#[test]
fn notifications_for_unknown_segmentations_are_dropped() {
    let harness = harness_with_segments();

    harness.engine.emit_metadata_modified("ghost");
    harness.engine.emit(&EngineNotification::DataModified {
        segmentation_id: "ghost".into(),
        modified_frames: vec![0],
    });

    assert!(harness.recorder.events().is_empty());
    assert!(harness.diagnostics().is_empty());
    assert!(harness.segmentation("ghost").is_none());
    assert_eq!(harness.sync_stats().dropped, 2);
}

#[test]
fn non_labelmap_state_is_recorded_and_skipped() {
    let harness = harness_with_segments();
    let before = harness.segmentation("seg").unwrap();

    harness.engine.edit_segmentation("seg", |state| {
        state.representation_kinds = vec![RepresentationKind::Contour];
        state.label = "Ignored".into();
    });
    harness.engine.emit_metadata_modified("seg");

    assert_eq!(harness.segmentation("seg").unwrap(), before);
    assert!(harness.recorder.events().is_empty());
    let diagnostics = harness.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].segmentation_id, "seg");
    assert_eq!(diagnostics[0].notification, "metadata-modified");
    assert!(diagnostics[0].error.contains("labelmap"));

    // Later notifications still flow.
    harness.engine.edit_segmentation("seg", |state| {
        state.representation_kinds = vec![RepresentationKind::Labelmap];
    });
    harness.engine.emit_metadata_modified("seg");

    assert_eq!(harness.segmentation("seg").unwrap().label, "Ignored");
    assert_eq!(harness.recorder.kinds(), vec![EventKind::SegmentationUpdated]);
    let stats = harness.sync_stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.reconciled, 1);
}

#[test]
fn absent_active_segment_leaves_record_unchanged() {
    let harness = harness_with_segments();
    let before = harness.segmentation("seg").unwrap();

    harness.engine.edit_segmentation("seg", |state| {
        state.active_segment_index = Some(9);
        state.label = "Partial".into();
    });
    harness.engine.emit_metadata_modified("seg");

    assert_eq!(harness.segmentation("seg").unwrap(), before);
    assert_eq!(harness.diagnostics().len(), 1);
}

#[test]
fn diagnostics_are_bounded_and_drainable() {
    let harness = TestHarness::with_config(Config::default().diagnostics_capacity(2));
    harness.seed_segmentation("seg", &[1]);
    harness.engine.edit_segmentation("seg", |state| {
        state.representation_kinds = vec![RepresentationKind::Surface];
    });

    for _ in 0..3 {
        harness.engine.emit_metadata_modified("seg");
    }

    assert_eq!(harness.diagnostics().len(), 2);
    assert_eq!(harness.sync_stats().failed, 3);
    assert_eq!(harness.drain_diagnostics().len(), 2);
    assert!(harness.diagnostics().is_empty());
}

#[test]
fn data_modified_is_forwarded() {
    let harness = harness_with_segments();

    harness.engine.emit(&EngineNotification::DataModified {
        segmentation_id: "seg".into(),
        modified_frames: vec![1, 2],
    });

    let events = harness.recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::SegmentationDataModified);
    assert_eq!(events[0].segmentation_id.as_deref(), Some("seg"));
    assert_eq!(harness.sync_stats().forwarded, 1);
}

#[test]
fn shutdown_stops_reconciliation() {
    let harness = harness_with_segments();
    assert!(harness.is_listening());

    harness.shutdown();
    harness.shutdown();

    assert!(!harness.is_listening());
    assert_eq!(harness.engine.listener_count(), 0);
    harness.engine.edit_segmentation("seg", |state| state.label = "Late".into());
    harness.engine.emit_metadata_modified("seg");

    assert_ne!(harness.segmentation("seg").unwrap().label, "Late");
    assert!(harness.recorder.events().is_empty());
    assert_eq!(harness.sync_stats().received, 0);
}

#[test]
fn dropping_the_manager_releases_the_listener() {
    let harness = harness_with_segments();
    let engine = harness.engine.clone();
    assert_eq!(engine.listener_count(), 1);

    drop(harness);

    assert_eq!(engine.listener_count(), 0);
}
