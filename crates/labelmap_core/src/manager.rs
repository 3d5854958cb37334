//! Segmentation manager facade.

use crate::config::{Config, RenderConfiguration, RenderConfigurationUpdate, ThresholdGate};
use crate::engine::{
    AnnotationEngine, EngineNotification, SegmentationRegistration, ViewportGroups,
};
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBroadcaster, EventKind, SegmentationEvent, SubscriptionToken};
use crate::import::{DiscreteSegment, VolumeImportEngine};
use crate::model::{Segment, Segmentation, SegmentationSchema};
use crate::mutator::SegmentMutator;
use crate::store::{SegmentationStore, UpsertOutcome};
use crate::sync::{ExternalSyncAdapter, SyncDiagnostic, SyncStats};
use crate::types::{ListenerId, RepresentationUid, SegmentIndex};
use labelmap_volume::{VolumeAllocator, VolumeStore};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use tracing::info;

/// Brush options applied to every viewport group.
#[derive(Debug, Clone, Copy)]
struct BrushOptions {
    size: f32,
    threshold_gate: Option<ThresholdGate>,
}

/// The segmentation state manager.
///
/// `SegmentationManager` wires the store, mutator, import engine, sync
/// adapter and event broadcaster together over one annotation engine, one
/// viewport group registry and one volume store. It subscribes to the
/// engine's notifications on construction and unsubscribes on
/// [`shutdown`](Self::shutdown) or drop.
///
/// # Example
///
/// ```rust
/// use labelmap_core::{
///     Config, InMemoryEngine, InMemoryViewportGroups, SegmentProperties, SegmentationManager,
///     SegmentationSchema,
/// };
/// use labelmap_volume::InMemoryVolumeStore;
/// use std::sync::Arc;
///
/// let manager = SegmentationManager::with_volume_store(
///     Config::default(),
///     Arc::new(InMemoryEngine::new()),
///     Arc::new(InMemoryViewportGroups::with_group("default", &["axial"])),
///     Arc::new(InMemoryVolumeStore::new()),
/// );
///
/// manager.add_or_update_segmentation(SegmentationSchema::new("seg")).unwrap();
/// manager.add_representation_to_group("default", "seg").unwrap();
/// manager
///     .mutator()
///     .add_segment("seg", 1, &SegmentProperties::new().label("Liver"), None)
///     .unwrap();
///
/// assert_eq!(manager.segment("seg", 1).unwrap().label, "Liver");
/// ```
pub struct SegmentationManager {
    config: Config,
    store: Arc<SegmentationStore>,
    events: Arc<EventBroadcaster>,
    sync: Arc<ExternalSyncAdapter>,
    mutator: SegmentMutator,
    importer: VolumeImportEngine,
    volumes: Arc<dyn VolumeStore>,
    brush: RwLock<BrushOptions>,
    listener: Mutex<Option<ListenerId>>,
}

impl SegmentationManager {
    /// Creates a manager and subscribes it to the engine's notifications.
    pub fn new(
        config: Config,
        engine: Arc<dyn AnnotationEngine>,
        groups: Arc<dyn ViewportGroups>,
        volumes: Arc<dyn VolumeStore>,
        allocator: Arc<dyn VolumeAllocator>,
    ) -> Self {
        let store = Arc::new(SegmentationStore::new(config.default_label.clone()));
        let events = Arc::new(EventBroadcaster::new());
        let sync = Arc::new(ExternalSyncAdapter::new(
            Arc::clone(&engine),
            groups,
            Arc::clone(&store),
            Arc::clone(&events),
            config.diagnostics_capacity,
        ));
        let mutator = SegmentMutator::new(
            Arc::clone(&store),
            Arc::clone(&sync),
            Arc::clone(&events),
            Arc::clone(&volumes),
            config.segment_label_prefix.clone(),
        );
        let importer = VolumeImportEngine::new(
            Arc::clone(&store),
            Arc::clone(&sync),
            Arc::clone(&events),
            Arc::clone(&volumes),
            allocator,
            config.alignment_tolerance,
            config.voxel_format,
        );

        let defaults = RenderConfiguration::default();
        let weak: Weak<ExternalSyncAdapter> = Arc::downgrade(&sync);
        let listener = engine.subscribe(Arc::new(move |notification: &EngineNotification| {
            if let Some(sync) = weak.upgrade() {
                sync.handle_notification(notification);
            }
        }));

        Self {
            config,
            store,
            events,
            sync,
            mutator,
            importer,
            volumes,
            brush: RwLock::new(BrushOptions {
                size: defaults.brush_size,
                threshold_gate: defaults.brush_threshold_gate,
            }),
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Creates a manager over a store that also allocates derived volumes.
    pub fn with_volume_store<V>(
        config: Config,
        engine: Arc<dyn AnnotationEngine>,
        groups: Arc<dyn ViewportGroups>,
        volumes: Arc<V>,
    ) -> Self
    where
        V: VolumeStore + VolumeAllocator + 'static,
    {
        let allocator: Arc<dyn VolumeAllocator> = volumes.clone();
        Self::new(config, engine, groups, volumes, allocator)
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the segment mutator.
    #[must_use]
    pub fn mutator(&self) -> &SegmentMutator {
        &self.mutator
    }

    /// Returns the import engine.
    #[must_use]
    pub fn importer(&self) -> &VolumeImportEngine {
        &self.importer
    }

    /// Returns the sync adapter.
    #[must_use]
    pub fn sync(&self) -> &ExternalSyncAdapter {
        &self.sync
    }

    /// Returns the event broadcaster.
    #[must_use]
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribes to one kind of event.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionToken
    where
        F: Fn(&SegmentationEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// Removes a subscription.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        self.events.unsubscribe(token)
    }

    // ========================================================================
    // Segmentations
    // ========================================================================

    /// Creates a segmentation or merges `schema` into an existing one.
    ///
    /// A create registers the segmentation and its palette with the engine
    /// and publishes `SEGMENTATION_ADDED`; a merge publishes
    /// `SEGMENTATION_UPDATED`. Existing segments are never reset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for initial segments at index 0, or
    /// `UnknownSegment` when a merge names an absent active segment.
    pub fn add_or_update_segmentation(&self, schema: SegmentationSchema) -> CoreResult<Segmentation> {
        let (outcome, record) = self.store.upsert_metadata(schema)?;
        match outcome {
            UpsertOutcome::Created { mut color_lut } => {
                let engine = self.sync.engine();
                engine.add_segmentation(SegmentationRegistration {
                    segmentation_id: record.id.clone(),
                    label: record.label.clone(),
                    kind: record.kind,
                    volume_id: record.volume_id.clone(),
                });
                for segment in record.segments().values() {
                    color_lut.set_color(usize::from(segment.segment_index), segment.rgba());
                }
                engine.add_color_lut(record.color_lut_index(), color_lut);
                info!(segmentation_id = %record.id, "added segmentation");
                self.events
                    .publish(&SegmentationEvent::added(record.clone()));
            }
            UpsertOutcome::Updated => {
                self.events
                    .publish(&SegmentationEvent::updated(record.clone()));
            }
        }
        Ok(record)
    }

    /// Removes a segmentation everywhere.
    ///
    /// Representations are removed from every group, the engine forgets the
    /// segmentation, its labelmap buffer is freed and its palette index is
    /// released. Publishes `SEGMENTATION_REMOVED`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation`.
    pub fn remove_segmentation(&self, segmentation_id: &str) -> CoreResult<()> {
        let record = self
            .store
            .get(segmentation_id)
            .ok_or_else(|| CoreError::unknown_segmentation(segmentation_id))?;

        let engine = self.sync.engine();
        for group_id in self.sync.groups_with_segmentation(segmentation_id) {
            engine.remove_representations(&group_id, segmentation_id);
            self.sync.render_group(&group_id);
        }
        engine.remove_segmentation(segmentation_id);
        if let Some(volume_id) = &record.volume_id {
            self.volumes.remove_volume_buffer(volume_id);
        }
        self.store.remove(segmentation_id);

        info!(segmentation_id, "removed segmentation");
        self.events
            .publish(&SegmentationEvent::removed(segmentation_id));
        Ok(())
    }

    /// Shows a segmentation in a viewport group.
    ///
    /// The new representation is bound to the segmentation's palette and
    /// receives every stored segment appearance. Publishes
    /// `SEGMENTATION_UPDATED`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation`.
    pub fn add_representation_to_group(
        &self,
        group_id: &str,
        segmentation_id: &str,
    ) -> CoreResult<RepresentationUid> {
        let record = self
            .store
            .get(segmentation_id)
            .ok_or_else(|| CoreError::unknown_segmentation(segmentation_id))?;

        let uid = self.sync.engine().add_representation(
            group_id,
            segmentation_id,
            record.kind,
            record.color_lut_index(),
        );
        self.sync.hydrate_representation(group_id, &uid, &record);
        if let Some(active) = record.active_segment_index() {
            self.sync.write_active_segment(segmentation_id, active);
        }
        self.sync.render_group(group_id);
        self.events
            .publish(&SegmentationEvent::updated(record));
        Ok(uid)
    }

    /// Lists the groups showing a segmentation.
    #[must_use]
    pub fn groups_with_segmentation(&self, segmentation_id: &str) -> Vec<String> {
        self.sync.groups_with_segmentation(segmentation_id)
    }

    /// Creates a segmentation from discrete segments.
    ///
    /// # Errors
    ///
    /// See [`VolumeImportEngine::create_from_discrete_segments`].
    pub async fn create_from_discrete_segments(
        &self,
        referenced_volume_id: &str,
        segments: Vec<DiscreteSegment>,
        segmentation_id: &str,
    ) -> CoreResult<Segmentation> {
        self.importer
            .create_from_discrete_segments(referenced_volume_id, segments, segmentation_id)
            .await
    }

    /// Creates a segmentation with an empty labelmap.
    ///
    /// # Errors
    ///
    /// See [`VolumeImportEngine::create_empty_derived`].
    pub async fn create_empty_derived(
        &self,
        referenced_volume_id: &str,
        segmentation_id: Option<&str>,
        label: Option<&str>,
    ) -> CoreResult<Segmentation> {
        self.importer
            .create_empty_derived(referenced_volume_id, segmentation_id, label)
            .await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns a segmentation.
    #[must_use]
    pub fn segmentation(&self, segmentation_id: &str) -> Option<Segmentation> {
        self.store.get(segmentation_id)
    }

    /// Returns every segmentation, ordered by identifier.
    #[must_use]
    pub fn segmentations(&self) -> Vec<Segmentation> {
        self.store.list()
    }

    /// Returns the active segmentation.
    #[must_use]
    pub fn active_segmentation(&self) -> Option<Segmentation> {
        self.store.list().into_iter().find(|s| s.is_active)
    }

    /// Returns a segmentation's active segment.
    #[must_use]
    pub fn active_segment(&self, segmentation_id: &str) -> Option<Segment> {
        let record = self.store.get(segmentation_id)?;
        let index = record.active_segment_index()?;
        record.segment(index).cloned()
    }

    /// Returns one segment.
    #[must_use]
    pub fn segment(&self, segmentation_id: &str, segment_index: SegmentIndex) -> Option<Segment> {
        self.store.get(segmentation_id)?.segment(segment_index).cloned()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Returns the current render configuration.
    #[must_use]
    pub fn configuration(&self) -> RenderConfiguration {
        let brush = *self.brush.read();
        RenderConfiguration::from_parts(
            self.sync.engine().render_settings(),
            brush.size,
            brush.threshold_gate,
        )
    }

    /// Applies a partial configuration change.
    ///
    /// Render options go to the engine; brush options go to every viewport
    /// group. Publishes `SEGMENTATION_CONFIGURATION_CHANGED` with the full
    /// configuration.
    pub fn set_configuration(&self, update: &RenderConfigurationUpdate) -> RenderConfiguration {
        let mut configuration = self.configuration();
        configuration.merge(update);

        let engine = self.sync.engine();
        if update.touches_render() {
            engine.set_render_settings(configuration.render_settings());
        }
        if update.touches_brush() {
            *self.brush.write() = BrushOptions {
                size: configuration.brush_size,
                threshold_gate: configuration.brush_threshold_gate,
            };
            for group_id in self.sync.groups().group_ids() {
                if update.brush_size.is_some() {
                    engine.set_brush_size(&group_id, configuration.brush_size);
                }
                if update.brush_threshold_gate.is_some() {
                    engine.set_brush_threshold_gate(&group_id, configuration.brush_threshold_gate);
                }
            }
        }
        for group_id in self.sync.groups().group_ids() {
            self.sync.render_group(&group_id);
        }

        self.events
            .publish(&SegmentationEvent::configuration_changed(configuration));
        configuration
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Returns retained inbound sync diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<SyncDiagnostic> {
        self.sync.diagnostics()
    }

    /// Removes and returns retained inbound sync diagnostics.
    pub fn drain_diagnostics(&self) -> Vec<SyncDiagnostic> {
        self.sync.drain_diagnostics()
    }

    /// Returns inbound sync counters.
    #[must_use]
    pub fn sync_stats(&self) -> SyncStats {
        self.sync.stats()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stops listening to engine notifications. Idempotent.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            self.sync.engine().unsubscribe(listener);
            info!("segmentation manager shut down");
        }
    }

    /// Returns true until [`shutdown`](Self::shutdown) runs.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener.lock().is_some()
    }
}

impl std::fmt::Debug for SegmentationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationManager")
            .field("segmentations", &self.store.len())
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

impl Drop for SegmentationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCall, InMemoryEngine, InMemoryViewportGroups};
    use labelmap_volume::InMemoryVolumeStore;

    fn manager() -> (SegmentationManager, Arc<InMemoryEngine>) {
        let engine = Arc::new(InMemoryEngine::new());
        let manager = SegmentationManager::with_volume_store(
            Config::default(),
            engine.clone(),
            Arc::new(InMemoryViewportGroups::with_group("default", &["axial"])),
            Arc::new(InMemoryVolumeStore::new()),
        );
        (manager, engine)
    }

    #[test]
    fn create_registers_with_engine() {
        let (manager, engine) = manager();
        let record = manager
            .add_or_update_segmentation(SegmentationSchema::new("a").label("Liver"))
            .unwrap();

        assert_eq!(record.label, "Liver");
        assert!(engine.segmentation_state("a").is_some());
        assert!(engine.color_lut(record.color_lut_index()).is_some());
    }

    #[test]
    fn shutdown_unsubscribes_once() {
        let (manager, engine) = manager();
        assert_eq!(engine.listener_count(), 1);
        manager.shutdown();
        manager.shutdown();
        assert_eq!(engine.listener_count(), 0);
        assert!(!manager.is_listening());
    }

    #[test]
    fn drop_unsubscribes() {
        let (manager, engine) = manager();
        drop(manager);
        assert_eq!(engine.listener_count(), 0);
    }

    #[test]
    fn remove_unknown_segmentation_fails() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.remove_segmentation("nope"),
            Err(CoreError::UnknownSegmentation { .. })
        ));
    }

    #[test]
    fn brush_settings_reach_every_group() {
        let (manager, engine) = manager();
        let configuration = manager.set_configuration(&RenderConfigurationUpdate {
            brush_size: Some(12.0),
            ..Default::default()
        });

        assert_eq!(configuration.brush_size, 12.0);
        assert_eq!(engine.brush_size("default"), Some(12.0));
        assert!(!engine
            .calls()
            .iter()
            .any(|call| matches!(call, EngineCall::SetRenderSettings { .. })));
    }
}
