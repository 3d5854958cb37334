//! Test fixtures and harness helpers.
//!
//! Provides a segmentation manager wired to in-memory collaborators, with
//! one viewport group (`default`, viewport `axial`) and one reference volume
//! (`ct`).

use labelmap_core::{
    Config, EventKind, InMemoryEngine, InMemoryViewportGroups, SegmentIndex, SegmentProperties,
    Segmentation, SegmentationEvent, SegmentationManager, SegmentationSchema,
};
use labelmap_volume::{InMemoryVolumeStore, Volume, VolumeGeometry, VolumeStore, Voxel};
use parking_lot::Mutex;
use std::sync::Arc;

/// Identifier of the reference volume registered by [`TestHarness`].
pub const REFERENCE_VOLUME_ID: &str = "ct";

/// Identifier of the viewport group registered by [`TestHarness`].
pub const DEFAULT_GROUP: &str = "default";

/// A 4x4x6 grid, 1mm in-plane, 2mm between slices, at the origin.
pub fn reference_geometry() -> VolumeGeometry {
    VolumeGeometry::new([4, 4, 6], [0.0, 0.0, 0.0], [1.0, 1.0, 2.0])
}

/// A zero-filled reference volume.
pub fn reference_volume(volume_id: &str) -> Volume {
    Volume::zeroed(volume_id, reference_geometry())
}

/// Builds a slice stack mask with every voxel set.
pub fn full_mask(geometry: &VolumeGeometry, frame_count: usize) -> Vec<u8> {
    vec![1; geometry.frame_len() * frame_count]
}

/// One recorded broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Segmentation the event concerned, if any.
    pub segmentation_id: Option<String>,
}

/// Records every event a manager publishes.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
}

impl EventRecorder {
    /// Subscribes a recorder to every event kind.
    pub fn attach(manager: &SegmentationManager) -> Self {
        let recorder = Self::default();
        for kind in EventKind::ALL {
            let sink = Arc::clone(&recorder.events);
            manager.subscribe(kind, move |event: &SegmentationEvent| {
                sink.lock().push(RecordedEvent {
                    kind: event.kind(),
                    segmentation_id: event.segmentation_id().map(str::to_string),
                });
            });
        }
        recorder
    }

    /// Returns recorded events in publish order.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Returns recorded event kinds in publish order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    /// Counts recorded events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

/// A manager wired to in-memory collaborators.
pub struct TestHarness {
    /// The manager under test.
    pub manager: SegmentationManager,
    /// The engine the manager drives.
    pub engine: Arc<InMemoryEngine>,
    /// The viewport group registry.
    pub groups: Arc<InMemoryViewportGroups>,
    /// The volume store, also used as allocator.
    pub volumes: Arc<InMemoryVolumeStore>,
    /// Recorder attached to the manager.
    pub recorder: EventRecorder,
}

impl TestHarness {
    /// Creates a harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a harness with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let engine = Arc::new(InMemoryEngine::new());
        let groups = Arc::new(InMemoryViewportGroups::with_group(DEFAULT_GROUP, &["axial"]));
        let volumes = Arc::new(InMemoryVolumeStore::new());
        volumes.insert(reference_volume(REFERENCE_VOLUME_ID));

        let manager = SegmentationManager::with_volume_store(
            config,
            engine.clone(),
            groups.clone(),
            volumes.clone(),
        );
        let recorder = EventRecorder::attach(&manager);
        Self {
            manager,
            engine,
            groups,
            volumes,
            recorder,
        }
    }

    /// Creates a segmentation with its own labelmap, shows it in the
    /// default group and adds the given segments.
    ///
    /// Recorded events and engine calls are cleared afterwards.
    pub fn seed_segmentation(&self, segmentation_id: &str, indices: &[SegmentIndex]) -> Segmentation {
        let volume_id = format!("{segmentation_id}-labelmap");
        self.volumes.insert(Volume::zeroed(volume_id.clone(), reference_geometry()));

        self.manager
            .add_or_update_segmentation(SegmentationSchema::new(segmentation_id).volume_id(volume_id))
            .expect("Failed to create segmentation");
        self.manager
            .add_representation_to_group(DEFAULT_GROUP, segmentation_id)
            .expect("Failed to add representation");
        for &index in indices {
            self.manager
                .mutator()
                .add_segment(segmentation_id, index, &SegmentProperties::new(), None)
                .expect("Failed to add segment");
        }

        self.recorder.clear();
        self.engine.clear_calls();
        self.manager
            .segmentation(segmentation_id)
            .expect("Seeded segmentation missing")
    }

    /// Writes `index` into the given voxels of a segmentation's labelmap.
    pub fn paint(&self, segmentation_id: &str, positions: &[usize], index: Voxel) {
        let volume = self.labelmap_volume(segmentation_id);
        let mut voxels = volume.scalar_data().write();
        for &position in positions {
            voxels[position] = index;
        }
    }

    /// Returns a copy of a segmentation's labelmap voxels.
    pub fn labelmap(&self, segmentation_id: &str) -> Vec<Voxel> {
        self.labelmap_volume(segmentation_id).scalar_data().to_vec()
    }

    /// Returns a segmentation's labelmap volume.
    pub fn labelmap_volume(&self, segmentation_id: &str) -> Volume {
        let record = self
            .manager
            .segmentation(segmentation_id)
            .expect("Unknown segmentation");
        let volume_id = record.volume_id.expect("Segmentation has no labelmap");
        self.volumes
            .get_volume(&volume_id)
            .expect("Labelmap volume missing")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestHarness {
    type Target = SegmentationManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_registers_reference_volume() {
        let harness = TestHarness::new();
        assert!(harness.volumes.contains(REFERENCE_VOLUME_ID));
        assert_eq!(harness.engine.listener_count(), 1);
    }

    #[test]
    fn seed_creates_segments_and_clears_recording() {
        let harness = TestHarness::new();
        let record = harness.seed_segmentation("seg", &[1, 2]);

        assert_eq!(record.segment_count(), 2);
        assert_eq!(record.active_segment_index(), Some(1));
        assert!(harness.recorder.events().is_empty());
        assert!(harness.engine.calls().is_empty());
    }

    #[test]
    fn paint_writes_labelmap() {
        let harness = TestHarness::new();
        harness.seed_segmentation("seg", &[3]);
        harness.paint("seg", &[0, 17], 3);

        let voxels = harness.labelmap("seg");
        assert_eq!(voxels[0], 3);
        assert_eq!(voxels[17], 3);
        assert_eq!(voxels.iter().filter(|v| **v != 0).count(), 2);
    }
}
