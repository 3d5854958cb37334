//! Outbound mirroring and inbound reconciliation.

use crate::engine::{AnnotationEngine, EngineNotification, ViewportGroups};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBroadcaster, SegmentationEvent};
use crate::model::{Segmentation, SegmentationSchema};
use crate::store::SegmentationStore;
use crate::sync::diagnostics::{DiagnosticLog, SyncCounters, SyncDiagnostic, SyncStats};
use crate::types::{RepresentationKind, RepresentationUid, Rgb, Rgba, SegmentIndex};
use std::sync::Arc;
use tracing::{debug, warn};

/// Mirrors store changes into the engine and engine changes into the store.
///
/// Outbound calls address a segmentation's representation in a viewport
/// group. The representation is found by scanning the group's
/// representations for the segmentation; when a segmentation has several
/// representations in one group, the first one listed is used.
///
/// Inbound notifications never return errors: failures are logged, counted
/// and kept as [`SyncDiagnostic`]s.
pub struct ExternalSyncAdapter {
    engine: Arc<dyn AnnotationEngine>,
    groups: Arc<dyn ViewportGroups>,
    store: Arc<SegmentationStore>,
    events: Arc<EventBroadcaster>,
    counters: SyncCounters,
    diagnostics: DiagnosticLog,
}

impl std::fmt::Debug for ExternalSyncAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalSyncAdapter")
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl ExternalSyncAdapter {
    /// Creates an adapter keeping up to `diagnostics_capacity` diagnostics.
    pub fn new(
        engine: Arc<dyn AnnotationEngine>,
        groups: Arc<dyn ViewportGroups>,
        store: Arc<SegmentationStore>,
        events: Arc<EventBroadcaster>,
        diagnostics_capacity: usize,
    ) -> Self {
        Self {
            engine,
            groups,
            store,
            events,
            counters: SyncCounters::default(),
            diagnostics: DiagnosticLog::new(diagnostics_capacity),
        }
    }

    /// Returns the engine the adapter drives.
    pub fn engine(&self) -> &Arc<dyn AnnotationEngine> {
        &self.engine
    }

    /// Returns the viewport group registry.
    pub fn groups(&self) -> &Arc<dyn ViewportGroups> {
        &self.groups
    }

    // === Outbound ===

    /// Resolves an optional group to a concrete one, defaulting to the
    /// first registered group.
    ///
    /// # Errors
    ///
    /// Returns `NoViewportGroups` if no group is given and none exist.
    pub fn target_group(&self, group_id: Option<&str>) -> CoreResult<String> {
        match group_id {
            Some(group_id) => Ok(group_id.to_string()),
            None => self
                .groups
                .group_ids()
                .into_iter()
                .next()
                .ok_or(CoreError::NoViewportGroups),
        }
    }

    /// Finds the segmentation's representation in a group.
    ///
    /// # Errors
    ///
    /// Returns `MissingRepresentation` if the group has none.
    pub fn resolve_representation(
        &self,
        group_id: &str,
        segmentation_id: &str,
    ) -> CoreResult<RepresentationUid> {
        self.engine
            .representations(group_id)
            .into_iter()
            .find(|r| r.segmentation_id == segmentation_id)
            .map(|r| r.uid)
            .ok_or_else(|| CoreError::missing_representation(segmentation_id, group_id))
    }

    /// Lists groups holding a representation of the segmentation.
    pub fn groups_with_segmentation(&self, segmentation_id: &str) -> Vec<String> {
        self.groups
            .group_ids()
            .into_iter()
            .filter(|group_id| self.resolve_representation(group_id, segmentation_id).is_ok())
            .collect()
    }

    /// Reads a segment's color as the engine currently draws it.
    ///
    /// Falls back to opaque black if the engine has no entry for the index.
    pub fn segment_rgba(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
    ) -> Rgba {
        self.engine
            .segment_color(group_id, uid, segment_index)
            .unwrap_or(Rgba::opaque([0, 0, 0]))
    }

    /// Writes a segment's color, keeping the engine's opacity.
    pub fn write_segment_color(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        rgb: Rgb,
    ) {
        let current = self.segment_rgba(group_id, uid, segment_index);
        self.engine
            .set_segment_color(group_id, uid, segment_index, current.with_rgb(rgb));
    }

    /// Writes a segment's opacity, keeping the engine's color.
    pub fn write_segment_opacity(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        opacity: f32,
    ) {
        let current = self.segment_rgba(group_id, uid, segment_index);
        self.engine
            .set_segment_color(group_id, uid, segment_index, current.with_alpha(opacity));
    }

    /// Writes a segment's visibility.
    pub fn write_segment_visibility(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        visible: bool,
    ) {
        self.engine
            .set_segment_visibility(group_id, uid, segment_index, visible);
    }

    /// Writes a segment's lock state.
    pub fn write_segment_locked(&self, segmentation_id: &str, segment_index: SegmentIndex, locked: bool) {
        self.engine
            .set_segment_locked(segmentation_id, segment_index, locked);
    }

    /// Writes the active segment.
    pub fn write_active_segment(&self, segmentation_id: &str, segment_index: SegmentIndex) {
        self.engine
            .set_active_segment_index(segmentation_id, segment_index);
    }

    /// Pushes a record's appearance into a representation: every segment's
    /// color, opacity and visibility, then the segmentation's visibility.
    pub fn hydrate_representation(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segmentation: &Segmentation,
    ) {
        for segment in segmentation.segments().values() {
            self.engine
                .set_segment_color(group_id, uid, segment.segment_index, segment.rgba());
            self.engine.set_segment_visibility(
                group_id,
                uid,
                segment.segment_index,
                segment.is_visible,
            );
        }
        self.engine
            .set_representation_visibility(group_id, uid, segmentation.is_visible);
    }

    /// Re-renders every viewport of a group.
    pub fn render_group(&self, group_id: &str) {
        let viewports = self.groups.viewport_ids(group_id);
        if !viewports.is_empty() {
            self.groups.render_viewports(&viewports);
        }
    }

    // === Inbound ===

    /// Handles one engine notification.
    ///
    /// Data-modified notifications are re-broadcast for known segmentations.
    /// Metadata-modified notifications are reconciled into the store and
    /// broadcast as updates. Notifications for segmentations the store does
    /// not hold are dropped.
    pub fn handle_notification(&self, notification: &EngineNotification) {
        self.counters.record_received();
        let segmentation_id = notification.segmentation_id();

        let Some(record) = self.store.get(segmentation_id) else {
            self.counters.record_dropped();
            debug!(
                segmentation_id,
                notification = notification.name(),
                "dropped notification for unknown segmentation"
            );
            return;
        };

        match notification {
            EngineNotification::DataModified { .. } => {
                self.counters.record_forwarded();
                self.events.publish(&SegmentationEvent::data_modified(record));
            }
            EngineNotification::MetadataModified { .. } => match self.reconcile(segmentation_id) {
                Ok(updated) => {
                    self.counters.record_reconciled();
                    self.events.publish(&SegmentationEvent::updated(updated));
                }
                Err(error) => {
                    self.counters.record_failed();
                    warn!(
                        segmentation_id,
                        notification = notification.name(),
                        %error,
                        "failed to reconcile engine metadata"
                    );
                    self.diagnostics.push(SyncDiagnostic {
                        segmentation_id: segmentation_id.to_string(),
                        notification: notification.name(),
                        error: error.to_string(),
                    });
                }
            },
        }
    }

    /// Merges the engine's view of a segmentation into the store.
    fn reconcile(&self, segmentation_id: &str) -> CoreResult<Segmentation> {
        let state = self
            .engine
            .segmentation_state(segmentation_id)
            .ok_or_else(|| CoreError::unknown_segmentation(segmentation_id))?;

        if !state
            .representation_kinds
            .contains(&RepresentationKind::Labelmap)
        {
            return Err(CoreError::UnsupportedRepresentation {
                segmentation_id: segmentation_id.to_string(),
                found: state.representation_kinds,
            });
        }

        let mut schema = SegmentationSchema::new(segmentation_id)
            .label(state.label)
            .kind(RepresentationKind::Labelmap)
            .cached_stats(state.cached_stats)
            .segments_locked(state.segments_locked);
        schema.active_segment_index = state.active_segment_index;

        self.store.merge_metadata(&schema)
    }

    /// Returns retained diagnostics, oldest first.
    pub fn diagnostics(&self) -> Vec<SyncDiagnostic> {
        self.diagnostics.entries()
    }

    /// Removes and returns retained diagnostics.
    pub fn drain_diagnostics(&self) -> Vec<SyncDiagnostic> {
        self.diagnostics.drain()
    }

    /// Returns inbound notification counters.
    pub fn stats(&self) -> SyncStats {
        self.counters.snapshot()
    }
}
