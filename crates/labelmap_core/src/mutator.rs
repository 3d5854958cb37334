//! Segment-level mutations.
//!
//! Every operation validates first, commits to the store, mirrors the change
//! into the engine, then publishes exactly one `SEGMENTATION_UPDATED`. No
//! store or voxel lock is held while the engine is called or the event is
//! published.

use crate::error::{CoreError, CoreResult};
use crate::events::{EventBroadcaster, SegmentationEvent};
use crate::model::{validate_opacity, Segment, SegmentProperties, Segmentation};
use crate::scan::clear_label;
use crate::store::SegmentationStore;
use crate::sync::ExternalSyncAdapter;
use crate::types::{RepresentationUid, Rgb, Rgba, SegmentIndex, BACKGROUND_INDEX};
use labelmap_volume::VolumeStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Adds, removes and edits segments.
pub struct SegmentMutator {
    store: Arc<SegmentationStore>,
    sync: Arc<ExternalSyncAdapter>,
    events: Arc<EventBroadcaster>,
    volumes: Arc<dyn VolumeStore>,
    segment_label_prefix: String,
}

impl std::fmt::Debug for SegmentMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentMutator")
            .field("segment_label_prefix", &self.segment_label_prefix)
            .finish_non_exhaustive()
    }
}

/// A representation an appearance change is written to.
struct Target {
    group_id: String,
    uid: RepresentationUid,
}

impl SegmentMutator {
    /// Creates a mutator over shared components.
    pub fn new(
        store: Arc<SegmentationStore>,
        sync: Arc<ExternalSyncAdapter>,
        events: Arc<EventBroadcaster>,
        volumes: Arc<dyn VolumeStore>,
        segment_label_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sync,
            events,
            volumes,
            segment_label_prefix: segment_label_prefix.into(),
        }
    }

    /// Adds a segment.
    ///
    /// The segment starts with the color the engine currently draws for its
    /// index, then `properties` are applied. If the segmentation has no
    /// active segment, the new one becomes active. One update event is
    /// published for the whole call.
    ///
    /// # Errors
    ///
    /// Checked in this order, before anything changes:
    /// - `InvalidIndex` for index 0
    /// - `UnknownSegmentation`
    /// - `InvalidOpacity` for an out-of-range opacity property
    /// - `NoViewportGroups` / `MissingRepresentation`
    /// - `DuplicateSegment`
    pub fn add_segment(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        properties: &SegmentProperties,
        group_id: Option<&str>,
    ) -> CoreResult<Segmentation> {
        reject_background(segment_index)?;
        let record = self.require(segmentation_id)?;
        properties.validate()?;
        let target = self.target(segmentation_id, group_id)?;
        if record.contains_segment(segment_index) {
            return Err(CoreError::DuplicateSegment {
                segmentation_id: segmentation_id.to_string(),
                segment_index,
            });
        }

        let color = self
            .sync
            .segment_rgba(&target.group_id, &target.uid, segment_index);
        let label = properties
            .label
            .clone()
            .unwrap_or_else(|| format!("{} {segment_index}", self.segment_label_prefix));

        let (became_active, updated) = self.store.update(segmentation_id, |record| {
            record.insert_segment(Segment::new(segment_index, label, color))?;
            apply_properties(record, segment_index, properties)?;
            let activate = properties.active || record.active_segment_index().is_none();
            if activate {
                record.set_active_segment_index(Some(segment_index))?;
            }
            Ok(activate)
        })?;

        self.mirror_properties(segmentation_id, segment_index, properties, Some(&target));
        if became_active {
            self.sync.write_active_segment(segmentation_id, segment_index);
        }
        debug!(segmentation_id, segment_index, "added segment");
        Ok(self.finish(Some(&target.group_id), updated))
    }

    /// Removes a segment and clears its voxels.
    ///
    /// Returns `None` without publishing anything if the segment does not
    /// exist. If the removed segment was active, the lowest remaining index
    /// becomes active; with no segments left the record has no active
    /// segment and the engine is pointed at index 1.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIndex` for index 0 or `UnknownSegmentation`.
    pub fn remove_segment(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
    ) -> CoreResult<Option<Segmentation>> {
        reject_background(segment_index)?;
        let record = self.require(segmentation_id)?;
        if !record.contains_segment(segment_index) {
            debug!(segmentation_id, segment_index, "segment absent; nothing to remove");
            return Ok(None);
        }

        let (engine_active, updated) = self.store.update(segmentation_id, |record| {
            let was_active = record.active_segment_index() == Some(segment_index);
            record.remove_segment(segment_index);
            if !was_active {
                return Ok(None);
            }
            let next = record.lowest_segment_index();
            record.set_active_segment_index(next)?;
            Ok(Some(next.unwrap_or(1)))
        })?;

        if let Some(frames) = self
            .clear_voxels(&updated, segment_index)
            .filter(|frames| !frames.is_empty())
        {
            self.sync
                .engine()
                .notify_data_modified(segmentation_id, &frames);
        }
        if let Some(next) = engine_active {
            self.sync.write_active_segment(segmentation_id, next);
        }
        debug!(segmentation_id, segment_index, "removed segment");
        Ok(Some(self.finish(None, updated)))
    }

    /// Shows or hides a segment.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation`, `UnknownSegment`, `NoViewportGroups`
    /// or `MissingRepresentation`.
    pub fn set_segment_visibility(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        visible: bool,
        group_id: Option<&str>,
    ) -> CoreResult<Segmentation> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().visibility(visible),
            group_id,
        )
    }

    /// Locks or unlocks a segment.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation` or `UnknownSegment`.
    pub fn set_segment_locked(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        locked: bool,
    ) -> CoreResult<Segmentation> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().locked(locked),
            None,
        )
    }

    /// Renames a segment.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation` or `UnknownSegment`.
    pub fn set_segment_label(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        label: impl Into<String>,
    ) -> CoreResult<Segmentation> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().label(label),
            None,
        )
    }

    /// Sets a segment's color, keeping its opacity.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation`, `UnknownSegment`, `NoViewportGroups`
    /// or `MissingRepresentation`.
    pub fn set_segment_color(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        color: Rgb,
        group_id: Option<&str>,
    ) -> CoreResult<Segmentation> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().color(color),
            group_id,
        )
    }

    /// Sets a segment's opacity, keeping its color.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOpacity`, `UnknownSegmentation`, `UnknownSegment`,
    /// `NoViewportGroups` or `MissingRepresentation`.
    pub fn set_segment_opacity(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        opacity: f32,
        group_id: Option<&str>,
    ) -> CoreResult<Segmentation> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().opacity(opacity),
            group_id,
        )
    }

    /// Sets color and opacity with a single engine write.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOpacity`, `UnknownSegmentation`, `UnknownSegment`,
    /// `NoViewportGroups` or `MissingRepresentation`.
    pub fn set_segment_rgba(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        color: Rgba,
        group_id: Option<&str>,
    ) -> CoreResult<Segmentation> {
        validate_opacity(color.alpha)?;
        let target = self.segment_target(segmentation_id, segment_index, group_id)?;

        let ((), updated) = self.store.update(segmentation_id, |record| {
            let segment = record.segment_mut(segment_index)?;
            segment.color = color.rgb;
            segment.opacity = color.alpha;
            Ok(())
        })?;

        self.sync
            .engine()
            .set_segment_color(&target.group_id, &target.uid, segment_index, color);
        Ok(self.finish(Some(&target.group_id), updated))
    }

    /// Applies every present property to an existing segment.
    ///
    /// A representation is only required when the properties change
    /// appearance (color, opacity, visibility).
    ///
    /// # Errors
    ///
    /// Returns `InvalidOpacity`, `UnknownSegmentation`, `UnknownSegment`,
    /// `NoViewportGroups` or `MissingRepresentation`.
    pub fn update_segment(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        properties: &SegmentProperties,
        group_id: Option<&str>,
    ) -> CoreResult<Segmentation> {
        properties.validate()?;
        let target = if touches_appearance(properties) {
            Some(self.segment_target(segmentation_id, segment_index, group_id)?)
        } else {
            self.require_segment(segmentation_id, segment_index)?;
            None
        };

        let ((), updated) = self.store.update(segmentation_id, |record| {
            apply_properties(record, segment_index, properties)?;
            if properties.active {
                record.set_active_segment_index(Some(segment_index))?;
            }
            Ok(())
        })?;

        self.mirror_properties(segmentation_id, segment_index, properties, target.as_ref());
        if properties.active {
            self.sync.write_active_segment(segmentation_id, segment_index);
        }
        debug!(segmentation_id, segment_index, "updated segment");
        Ok(self.finish(target.as_ref().map(|t| t.group_id.as_str()), updated))
    }

    /// Makes a segment the active one.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation` or `UnknownSegment`.
    pub fn set_active_segment(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
    ) -> CoreResult<Segmentation> {
        self.update_segment(
            segmentation_id,
            segment_index,
            &SegmentProperties::new().active(),
            None,
        )
    }

    /// Makes a segmentation the active one; every other segmentation
    /// becomes inactive.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation` or `MissingRepresentation`.
    pub fn set_active_segmentation_for_group(
        &self,
        segmentation_id: &str,
        group_id: &str,
    ) -> CoreResult<Segmentation> {
        self.require(segmentation_id)?;
        let uid = self.sync.resolve_representation(group_id, segmentation_id)?;

        self.store
            .update_all(|record| record.is_active = record.id == segmentation_id);
        let updated = self.require(segmentation_id)?;

        self.sync
            .engine()
            .set_active_representation(group_id, &uid);
        Ok(self.finish(Some(group_id), updated))
    }

    /// Flips a segmentation's visibility in every group showing it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation`.
    pub fn toggle_segmentation_visibility(&self, segmentation_id: &str) -> CoreResult<Segmentation> {
        let ((), updated) = self.store.update(segmentation_id, |record| {
            record.is_visible = !record.is_visible;
            Ok(())
        })?;

        for group_id in self.sync.groups_with_segmentation(segmentation_id) {
            if let Ok(uid) = self.sync.resolve_representation(&group_id, segmentation_id) {
                self.sync
                    .engine()
                    .set_representation_visibility(&group_id, &uid, updated.is_visible);
                self.sync.render_group(&group_id);
            }
        }
        Ok(self.finish(None, updated))
    }

    fn require(&self, segmentation_id: &str) -> CoreResult<Segmentation> {
        self.store
            .get(segmentation_id)
            .ok_or_else(|| CoreError::unknown_segmentation(segmentation_id))
    }

    fn require_segment(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
    ) -> CoreResult<Segmentation> {
        let record = self.require(segmentation_id)?;
        if record.contains_segment(segment_index) {
            Ok(record)
        } else {
            Err(CoreError::unknown_segment(segmentation_id, segment_index))
        }
    }

    fn target(&self, segmentation_id: &str, group_id: Option<&str>) -> CoreResult<Target> {
        let group_id = self.sync.target_group(group_id)?;
        let uid = self.sync.resolve_representation(&group_id, segmentation_id)?;
        Ok(Target { group_id, uid })
    }

    fn segment_target(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        group_id: Option<&str>,
    ) -> CoreResult<Target> {
        self.require_segment(segmentation_id, segment_index)?;
        self.target(segmentation_id, group_id)
    }

    /// Writes stored property changes to the engine, one field at a time.
    fn mirror_properties(
        &self,
        segmentation_id: &str,
        segment_index: SegmentIndex,
        properties: &SegmentProperties,
        target: Option<&Target>,
    ) {
        if let Some(target) = target {
            if let Some(color) = properties.color {
                self.sync
                    .write_segment_color(&target.group_id, &target.uid, segment_index, color);
            }
            if let Some(opacity) = properties.opacity {
                self.sync
                    .write_segment_opacity(&target.group_id, &target.uid, segment_index, opacity);
            }
            if let Some(visible) = properties.visibility {
                self.sync
                    .write_segment_visibility(&target.group_id, &target.uid, segment_index, visible);
            }
        }
        if let Some(locked) = properties.is_locked {
            self.sync
                .write_segment_locked(segmentation_id, segment_index, locked);
        }
    }

    /// Zeroes a removed segment's voxels; returns the modified frames.
    fn clear_voxels(&self, record: &Segmentation, segment_index: SegmentIndex) -> Option<Vec<usize>> {
        let volume_id = record.volume_id.as_deref()?;
        let Some(volume) = self.volumes.get_volume(volume_id) else {
            warn!(
                segmentation_id = %record.id,
                volume_id,
                "labelmap volume missing; voxels not cleared"
            );
            return None;
        };

        let frame_len = volume.geometry().frame_len();
        let mut voxels = volume.scalar_data().write();
        Some(clear_label(voxels.as_mut_slice(), frame_len, segment_index))
    }

    fn finish(&self, group_id: Option<&str>, updated: Segmentation) -> Segmentation {
        if let Some(group_id) = group_id {
            self.sync.render_group(group_id);
        }
        self.events
            .publish(&SegmentationEvent::updated(updated.clone()));
        updated
    }
}

fn reject_background(segment_index: SegmentIndex) -> CoreResult<()> {
    if segment_index == BACKGROUND_INDEX {
        Err(CoreError::InvalidIndex { segment_index })
    } else {
        Ok(())
    }
}

const fn touches_appearance(properties: &SegmentProperties) -> bool {
    properties.color.is_some() || properties.opacity.is_some() || properties.visibility.is_some()
}

/// Applies the metadata part of `properties` to a stored segment.
fn apply_properties(
    record: &mut Segmentation,
    segment_index: SegmentIndex,
    properties: &SegmentProperties,
) -> CoreResult<()> {
    let segment = record.segment_mut(segment_index)?;
    if let Some(label) = &properties.label {
        segment.label = label.clone();
    }
    if let Some(color) = properties.color {
        segment.color = color;
    }
    if let Some(opacity) = properties.opacity {
        segment.opacity = opacity;
    }
    if let Some(visible) = properties.visibility {
        segment.is_visible = visible;
    }
    if let Some(locked) = properties.is_locked {
        segment.is_locked = locked;
    }
    Ok(())
}
