//! Creation of labelmap segmentations backed by derived volumes.

use crate::engine::SegmentationRegistration;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventBroadcaster, SegmentationEvent};
use crate::import::align::align_first_slice;
use crate::import::segment::{write_segment, DiscreteSegment};
use crate::model::{Segment, Segmentation, SegmentationSchema};
use crate::palette::ColorLut;
use crate::store::SegmentationStore;
use crate::sync::ExternalSyncAdapter;
use crate::types::{RepresentationKind, Rgba, SegmentIndex};
use labelmap_volume::{
    DerivedVolumeOptions, Volume, VolumeAllocator, VolumeGeometry, VolumeStore, VoxelFormat,
};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Builds new segmentations from reference volumes.
///
/// # Sequencing
///
/// At most one import per segmentation identifier runs at a time; a second
/// one fails with `ImportInProgress` until the first completes or its
/// future is dropped.
pub struct VolumeImportEngine {
    store: Arc<SegmentationStore>,
    sync: Arc<ExternalSyncAdapter>,
    events: Arc<EventBroadcaster>,
    volumes: Arc<dyn VolumeStore>,
    allocator: Arc<dyn VolumeAllocator>,
    alignment_tolerance: f64,
    voxel_format: VoxelFormat,
    in_flight: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for VolumeImportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeImportEngine")
            .field("alignment_tolerance", &self.alignment_tolerance)
            .field("voxel_format", &self.voxel_format)
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

/// Marks an identifier as being imported until dropped.
struct InFlight<'a> {
    registry: &'a Mutex<HashSet<String>>,
    segmentation_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(registry: &'a Mutex<HashSet<String>>, segmentation_id: &str) -> CoreResult<Self> {
        if !registry.lock().insert(segmentation_id.to_string()) {
            return Err(CoreError::ImportInProgress {
                segmentation_id: segmentation_id.to_string(),
            });
        }
        Ok(Self {
            registry,
            segmentation_id: segmentation_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.segmentation_id);
    }
}

/// A validated segment and the frame it starts at.
struct Placement<'a> {
    segment: &'a DiscreteSegment,
    frame_offset: usize,
}

impl VolumeImportEngine {
    /// Creates an import engine over shared components.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SegmentationStore>,
        sync: Arc<ExternalSyncAdapter>,
        events: Arc<EventBroadcaster>,
        volumes: Arc<dyn VolumeStore>,
        allocator: Arc<dyn VolumeAllocator>,
        alignment_tolerance: f64,
        voxel_format: VoxelFormat,
    ) -> Self {
        Self {
            store,
            sync,
            events,
            volumes,
            allocator,
            alignment_tolerance,
            voxel_format,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Returns true while an import into `segmentation_id` is running.
    pub fn is_importing(&self, segmentation_id: &str) -> bool {
        self.in_flight.lock().contains(segmentation_id)
    }

    /// Creates a segmentation by merging per-segment slice stacks into a
    /// new labelmap shaped like `referenced_volume_id`.
    ///
    /// Every segment is validated and aligned before the buffer is
    /// allocated. Segments are then written in input order, so a later
    /// segment overwrites an earlier one where both are set. The new record
    /// holds one segment per input, with segment 1 active if present and
    /// the lowest index otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving no record and no buffer behind, if:
    /// - Another import into the identifier is running (`ImportInProgress`)
    /// - The identifier is taken (`SegmentationExists`)
    /// - The reference volume is absent (`MissingVolume`)
    /// - A segment is malformed (`InvalidIndex`, `InvalidSegmentData`,
    ///   `DuplicateSegment`)
    /// - A segment's first slice is off the slice grid (`MisalignedSlice`)
    /// - The allocated buffer has the wrong shape (`VolumeShapeMismatch`)
    /// - Allocation fails (`Volume`)
    pub async fn create_from_discrete_segments(
        &self,
        referenced_volume_id: &str,
        segments: Vec<DiscreteSegment>,
        segmentation_id: &str,
    ) -> CoreResult<Segmentation> {
        let _guard = InFlight::acquire(&self.in_flight, segmentation_id)?;
        self.ensure_vacant(segmentation_id)?;
        let reference = self.reference(referenced_volume_id)?;
        let geometry = *reference.geometry();
        let placements = self.place(segmentation_id, &geometry, &segments)?;

        let volume = self
            .allocate(referenced_volume_id, segmentation_id, &geometry)
            .await?;
        self.ensure_still_vacant(segmentation_id, &volume)?;

        {
            let mut voxels = volume.scalar_data().write();
            for placement in &placements {
                let clipped = write_segment(
                    voxels.as_mut_slice(),
                    &geometry,
                    placement.frame_offset,
                    placement.segment,
                );
                if clipped > 0 {
                    warn!(
                        segmentation_id,
                        segment_index = placement.segment.segment_index,
                        clipped,
                        "segment extends past the last frame; extra frames skipped"
                    );
                }
            }
        }

        let defaults = ColorLut::default();
        let records: Vec<Segment> = segments
            .iter()
            .map(|s| {
                let color = match s.color {
                    Some(rgb) => Rgba::opaque(rgb),
                    None => defaults
                        .color(usize::from(s.segment_index))
                        .unwrap_or(Rgba::opaque([0, 0, 0])),
                };
                Segment::new(s.segment_index, s.label.clone(), color)
            })
            .collect();
        let active = initial_active(records.iter().map(|s| s.segment_index));

        let mut schema = SegmentationSchema::new(segmentation_id)
            .kind(RepresentationKind::Labelmap)
            .volume_id(volume.id())
            .segments(records);
        schema.active_segment_index = active;

        let created = self.register(volume.id(), schema)?;
        info!(
            segmentation_id,
            referenced_volume_id,
            segments = created.segment_count(),
            "imported segmentation"
        );
        Ok(created)
    }

    /// Creates a segmentation with an empty labelmap shaped like
    /// `referenced_volume_id`.
    ///
    /// A fresh identifier is generated when `segmentation_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `ImportInProgress`, `SegmentationExists`, `MissingVolume`,
    /// `VolumeShapeMismatch` or `Volume`.
    pub async fn create_empty_derived(
        &self,
        referenced_volume_id: &str,
        segmentation_id: Option<&str>,
        label: Option<&str>,
    ) -> CoreResult<Segmentation> {
        let segmentation_id = segmentation_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let _guard = InFlight::acquire(&self.in_flight, &segmentation_id)?;
        self.ensure_vacant(&segmentation_id)?;
        let reference = self.reference(referenced_volume_id)?;
        let geometry = *reference.geometry();

        let volume = self
            .allocate(referenced_volume_id, &segmentation_id, &geometry)
            .await?;
        self.ensure_still_vacant(&segmentation_id, &volume)?;

        let mut schema = SegmentationSchema::new(segmentation_id.as_str())
            .kind(RepresentationKind::Labelmap)
            .volume_id(volume.id());
        schema.label = label.map(str::to_string);

        let created = self.register(volume.id(), schema)?;
        info!(
            segmentation_id = %created.id,
            referenced_volume_id,
            "created empty segmentation"
        );
        Ok(created)
    }

    fn ensure_vacant(&self, segmentation_id: &str) -> CoreResult<()> {
        if self.store.contains(segmentation_id) {
            return Err(CoreError::SegmentationExists {
                segmentation_id: segmentation_id.to_string(),
            });
        }
        Ok(())
    }

    /// Re-checks the identifier after the allocation wait, releasing the
    /// new buffer if it was claimed meanwhile.
    fn ensure_still_vacant(&self, segmentation_id: &str, volume: &Volume) -> CoreResult<()> {
        if let Err(error) = self.ensure_vacant(segmentation_id) {
            warn!(segmentation_id, "identifier claimed during allocation");
            self.volumes.remove_volume_buffer(volume.id());
            return Err(error);
        }
        Ok(())
    }

    fn reference(&self, referenced_volume_id: &str) -> CoreResult<Volume> {
        self.volumes
            .get_volume(referenced_volume_id)
            .ok_or_else(|| CoreError::MissingVolume {
                volume_id: referenced_volume_id.to_string(),
            })
    }

    /// Validates every segment and computes its destination frame.
    fn place<'a>(
        &self,
        segmentation_id: &str,
        geometry: &VolumeGeometry,
        segments: &'a [DiscreteSegment],
    ) -> CoreResult<Vec<Placement<'a>>> {
        let mut seen = BTreeSet::new();
        let mut placements = Vec::with_capacity(segments.len());
        for segment in segments {
            segment.validate(geometry, self.voxel_format)?;
            if !seen.insert(segment.segment_index) {
                return Err(CoreError::DuplicateSegment {
                    segmentation_id: segmentation_id.to_string(),
                    segment_index: segment.segment_index,
                });
            }

            let alignment =
                align_first_slice(geometry, segment.first_position, self.alignment_tolerance);
            let frame_offset = alignment
                .frame_offset
                .ok_or(CoreError::MisalignedSlice {
                    segment_index: segment.segment_index,
                    estimated_slice: alignment.estimated_slice,
                    tolerance: self.alignment_tolerance,
                })?;
            placements.push(Placement {
                segment,
                frame_offset,
            });
        }
        Ok(placements)
    }

    /// Allocates the derived buffer and re-checks its shape after the wait.
    async fn allocate(
        &self,
        referenced_volume_id: &str,
        segmentation_id: &str,
        expected: &VolumeGeometry,
    ) -> CoreResult<Volume> {
        let options = DerivedVolumeOptions::new(segmentation_id, self.voxel_format);
        let volume = self
            .allocator
            .create_derived_volume(referenced_volume_id, options)
            .await?;

        if !volume.geometry().same_shape(expected) || !volume.is_consistent() {
            self.volumes.remove_volume_buffer(volume.id());
            return Err(CoreError::VolumeShapeMismatch {
                expected: expected.dimensions,
                actual: volume.geometry().dimensions,
            });
        }
        Ok(volume)
    }

    /// Creates the record and its palette, registers the segmentation with
    /// the engine, then announces it.
    ///
    /// The record is created before the engine hears of it, so an identifier
    /// claimed while the buffer was being allocated fails here without
    /// touching engine state this import does not own.
    fn register(&self, volume_id: &str, schema: SegmentationSchema) -> CoreResult<Segmentation> {
        let (mut color_lut, created) = match self.store.create_metadata(&schema) {
            Ok(result) => result,
            Err(error) => {
                self.volumes.remove_volume_buffer(volume_id);
                return Err(error);
            }
        };
        let segmentation_id = created.id.clone();

        let engine = self.sync.engine();
        engine.add_segmentation(SegmentationRegistration {
            segmentation_id: segmentation_id.clone(),
            label: created.label.clone(),
            kind: RepresentationKind::Labelmap,
            volume_id: Some(volume_id.to_string()),
        });
        for segment in created.segments().values() {
            color_lut.set_color(usize::from(segment.segment_index), segment.rgba());
        }
        engine.add_color_lut(created.color_lut_index(), color_lut);
        if let Some(active) = created.active_segment_index() {
            self.sync.write_active_segment(&segmentation_id, active);
        }

        self.events
            .publish(&SegmentationEvent::added(created.clone()));
        Ok(created)
    }
}

/// Segment 1 if present, else the lowest index.
fn initial_active(indices: impl Iterator<Item = SegmentIndex>) -> Option<SegmentIndex> {
    let indices: BTreeSet<_> = indices.collect();
    if indices.contains(&1) {
        Some(1)
    } else {
        indices.first().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_active_prefers_one() {
        assert_eq!(initial_active([3, 1, 2].into_iter()), Some(1));
        assert_eq!(initial_active([4, 3].into_iter()), Some(3));
        assert_eq!(initial_active(std::iter::empty()), None);
    }

    #[test]
    fn in_flight_guard_releases_on_drop() {
        let registry = Mutex::new(HashSet::new());
        let guard = InFlight::acquire(&registry, "a").unwrap();
        assert!(matches!(
            InFlight::acquire(&registry, "a"),
            Err(CoreError::ImportInProgress { .. })
        ));
        drop(guard);
        assert!(InFlight::acquire(&registry, "a").is_ok());
    }
}
