//! Segmentation store.
//!
//! The store is the single source of truth for segmentation metadata. It
//! never touches voxels and never calls the rendering engine; callers mirror
//! changes outward and broadcast events themselves.

use crate::error::{CoreError, CoreResult};
use crate::model::{Segmentation, SegmentationSchema};
use crate::palette::{ColorLut, ColorPaletteAllocator};
use crate::types::RepresentationKind;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use tracing::debug;

/// Whether an upsert created a record or merged into an existing one.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// A new record was created and given this palette.
    Created {
        /// Fresh palette for the new record's `color_lut_index`.
        color_lut: ColorLut,
    },
    /// An existing record was updated.
    Updated,
}

impl UpsertOutcome {
    /// Returns true for a create.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created { .. })
    }
}

/// Canonical mapping from segmentation identifier to its record.
///
/// # Thread Safety
///
/// All methods take `&self`; records are guarded by a read-write lock and
/// readers receive clones. Lock order is records, then palette.
#[derive(Debug)]
pub struct SegmentationStore {
    /// Label given to records created without one.
    default_label: String,
    records: RwLock<BTreeMap<String, Segmentation>>,
    palette: Mutex<ColorPaletteAllocator>,
}

impl Default for SegmentationStore {
    fn default() -> Self {
        Self::new("Segmentation")
    }
}

impl SegmentationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(default_label: impl Into<String>) -> Self {
        Self::with_allocator(default_label, ColorPaletteAllocator::new())
    }

    /// Creates an empty store with a custom palette allocator.
    #[must_use]
    pub fn with_allocator(default_label: impl Into<String>, allocator: ColorPaletteAllocator) -> Self {
        Self {
            default_label: default_label.into(),
            records: RwLock::new(BTreeMap::new()),
            palette: Mutex::new(allocator),
        }
    }

    /// Returns the label given to records created without one.
    #[must_use]
    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Returns a copy of the record for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Segmentation> {
        self.records.read().get(id).cloned()
    }

    /// Returns copies of all records, ordered by identifier.
    #[must_use]
    pub fn list(&self) -> Vec<Segmentation> {
        self.records.read().values().cloned().collect()
    }

    /// Returns true if a record exists for `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns true if a palette index is held by a live record.
    #[must_use]
    pub fn is_palette_index_allocated(&self, index: u32) -> bool {
        self.palette.lock().is_allocated(index)
    }

    /// Creates a record or merges `schema` into the existing one.
    ///
    /// On create, the record starts with the schema's segments (or none),
    /// is inactive and visible, and receives the lowest free palette index.
    /// On merge, only fields present in the schema change.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving the store unchanged, if:
    /// - Initial segments contain index 0 (`InvalidIndex`)
    /// - A merge names an active segment the record lacks (`UnknownSegment`)
    pub fn upsert_metadata(
        &self,
        schema: SegmentationSchema,
    ) -> CoreResult<(UpsertOutcome, Segmentation)> {
        let mut records = self.records.write();

        if let Some(existing) = records.get(&schema.id) {
            let mut merged = existing.clone();
            merge_schema(&mut merged, &schema)?;
            records.insert(schema.id.clone(), merged.clone());
            debug!(segmentation_id = %schema.id, "merged segmentation metadata");
            return Ok((UpsertOutcome::Updated, merged));
        }

        let (color_lut, created) = self.insert_new(&mut records, &schema)?;
        Ok((UpsertOutcome::Created { color_lut }, created))
    }

    /// Creates a record for `schema`; never merges into an existing one.
    ///
    /// Returns the new record and its fresh palette.
    ///
    /// # Errors
    ///
    /// Returns `SegmentationExists` if a record already exists for the
    /// identifier, or `InvalidIndex` if the initial segments contain index 0.
    /// The store is unchanged on error.
    pub fn create_metadata(
        &self,
        schema: &SegmentationSchema,
    ) -> CoreResult<(ColorLut, Segmentation)> {
        let mut records = self.records.write();
        if records.contains_key(&schema.id) {
            return Err(CoreError::SegmentationExists {
                segmentation_id: schema.id.clone(),
            });
        }
        self.insert_new(&mut records, schema)
    }

    /// Builds a fresh record from `schema` and inserts it under the held lock.
    fn insert_new(
        &self,
        records: &mut BTreeMap<String, Segmentation>,
        schema: &SegmentationSchema,
    ) -> CoreResult<(ColorLut, Segmentation)> {
        let label = schema
            .non_empty_label()
            .unwrap_or(&self.default_label)
            .to_string();
        let kind = schema.kind.unwrap_or(RepresentationKind::Labelmap);
        let mut created = Segmentation::new(schema.id.clone(), label, kind, 0);
        for segment in schema.segments.clone().unwrap_or_default().into_values() {
            created.insert_segment(segment)?;
        }
        let initial_active = schema
            .active_segment_index
            .filter(|&index| created.contains_segment(index));
        created.set_active_segment_index(initial_active)?;
        created.volume_id = schema.volume_id.clone();
        if let Some(stats) = &schema.cached_stats {
            created.cached_stats = stats.clone();
        }
        if let Some(lines) = &schema.display_text {
            created.display_text = lines.clone();
        }
        if let Some(visible) = schema.is_visible {
            created.is_visible = visible;
        }
        apply_locks(&mut created, schema);

        let (color_lut_index, color_lut) = self.palette.lock().allocate();
        created.assign_color_lut_index(color_lut_index);
        records.insert(schema.id.clone(), created.clone());
        debug!(
            segmentation_id = %schema.id,
            color_lut_index,
            segments = created.segment_count(),
            "created segmentation"
        );
        Ok((color_lut, created))
    }

    /// Merges `schema` into an existing record; never creates one.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation` if no record exists, or
    /// `UnknownSegment` if the schema names an absent active segment. The
    /// record is unchanged on error.
    pub fn merge_metadata(&self, schema: &SegmentationSchema) -> CoreResult<Segmentation> {
        let mut records = self.records.write();
        let existing = records
            .get(&schema.id)
            .ok_or_else(|| CoreError::unknown_segmentation(&schema.id))?;
        let mut merged = existing.clone();
        merge_schema(&mut merged, schema)?;
        records.insert(schema.id.clone(), merged.clone());
        debug!(segmentation_id = %schema.id, "merged segmentation metadata");
        Ok(merged)
    }

    /// Applies `f` to a copy of the record and commits it if `f` succeeds.
    ///
    /// Returns `f`'s result and the committed record. A failing `f` leaves
    /// the stored record untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSegmentation` if no record exists, or `f`'s error.
    pub fn update<T, F>(&self, id: &str, f: F) -> CoreResult<(T, Segmentation)>
    where
        F: FnOnce(&mut Segmentation) -> CoreResult<T>,
    {
        let mut records = self.records.write();
        let current = records
            .get(id)
            .ok_or_else(|| CoreError::unknown_segmentation(id))?;

        let mut draft = current.clone();
        let value = f(&mut draft)?;
        debug_assert!(draft.invariant_violation().is_none());
        records.insert(id.to_string(), draft.clone());
        Ok((value, draft))
    }

    /// Applies `f` to every record.
    pub fn update_all<F>(&self, mut f: F)
    where
        F: FnMut(&mut Segmentation),
    {
        for record in self.records.write().values_mut() {
            f(record);
        }
    }

    /// Removes a record and releases its palette index.
    pub fn remove(&self, id: &str) -> Option<Segmentation> {
        let mut records = self.records.write();
        let removed = records.remove(id)?;
        self.palette.lock().release(removed.color_lut_index());
        debug!(segmentation_id = %id, "removed segmentation");
        Some(removed)
    }
}

fn merge_schema(record: &mut Segmentation, schema: &SegmentationSchema) -> CoreResult<()> {
    if let Some(label) = schema.non_empty_label() {
        record.label = label.to_string();
    }
    if let Some(kind) = schema.kind {
        record.kind = kind;
    }
    if let Some(volume_id) = &schema.volume_id {
        record.volume_id = Some(volume_id.clone());
    }
    if let Some(index) = schema.active_segment_index {
        record.set_active_segment_index(Some(index))?;
    }
    if let Some(stats) = &schema.cached_stats {
        record.cached_stats = stats.clone();
    }
    if let Some(lines) = &schema.display_text {
        record.display_text = lines.clone();
    }
    if let Some(visible) = schema.is_visible {
        record.is_visible = visible;
    }
    apply_locks(record, schema);
    Ok(())
}

/// Lock flags follow the schema's set; indices without a segment are ignored.
fn apply_locks(record: &mut Segmentation, schema: &SegmentationSchema) {
    let Some(locked) = &schema.segments_locked else {
        return;
    };
    let indices: Vec<_> = record.segments().keys().copied().collect();
    for index in indices {
        if let Ok(segment) = record.segment_mut(index) {
            segment.is_locked = locked.contains(&index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Segment;
    use crate::types::Rgba;

    fn segment(index: u16) -> Segment {
        Segment::new(index, format!("Segment {index}"), Rgba::opaque([5, 5, 5]))
    }

    #[test]
    fn create_uses_defaults() {
        let store = SegmentationStore::default();
        let (outcome, record) = store
            .upsert_metadata(SegmentationSchema::new("a"))
            .unwrap();

        assert!(outcome.is_created());
        assert_eq!(record.label, "Segmentation");
        assert_eq!(record.segment_count(), 0);
        assert_eq!(record.active_segment_index(), None);
        assert!(!record.is_active);
        assert!(record.is_visible);
        assert_eq!(record.color_lut_index(), 0);
    }

    #[test]
    fn empty_label_falls_back_to_default() {
        let store = SegmentationStore::new("Mask");
        let (_, record) = store
            .upsert_metadata(SegmentationSchema::new("a").label(""))
            .unwrap();
        assert_eq!(record.label, "Mask");
    }

    #[test]
    fn update_merges_without_resetting_segments() {
        let store = SegmentationStore::default();
        store
            .upsert_metadata(SegmentationSchema::new("a").segments([segment(1), segment(2)]))
            .unwrap();

        let (outcome, record) = store
            .upsert_metadata(
                SegmentationSchema::new("a")
                    .label("Liver")
                    .segments([segment(9)])
                    .active_segment_index(2),
            )
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(record.label, "Liver");
        assert_eq!(record.segments().keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(record.active_segment_index(), Some(2));
    }

    #[test]
    fn merge_with_unknown_active_index_leaves_record_untouched() {
        let store = SegmentationStore::default();
        store
            .upsert_metadata(SegmentationSchema::new("a").segments([segment(1)]))
            .unwrap();

        let result = store.upsert_metadata(SegmentationSchema::new("a").label("X").active_segment_index(7));
        assert!(matches!(result, Err(CoreError::UnknownSegment { segment_index: 7, .. })));
        assert_eq!(store.get("a").unwrap().label, "Segmentation");
    }

    #[test]
    fn create_ignores_active_index_without_segment() {
        let store = SegmentationStore::default();
        let (_, record) = store
            .upsert_metadata(SegmentationSchema::new("a").active_segment_index(1))
            .unwrap();
        assert_eq!(record.active_segment_index(), None);
    }

    #[test]
    fn palette_indices_are_distinct_and_reused() {
        let store = SegmentationStore::default();
        for id in ["a", "b", "c"] {
            store.upsert_metadata(SegmentationSchema::new(id)).unwrap();
        }
        assert_eq!(store.get("b").unwrap().color_lut_index(), 1);

        store.remove("b").unwrap();
        assert!(!store.is_palette_index_allocated(1));

        let (_, record) = store.upsert_metadata(SegmentationSchema::new("d")).unwrap();
        assert_eq!(record.color_lut_index(), 1);
    }

    #[test]
    fn failed_create_does_not_allocate() {
        let store = SegmentationStore::default();
        let result = store.upsert_metadata(SegmentationSchema::new("a").segments([segment(0)]));
        assert!(result.is_err());
        assert!(store.is_empty());
        assert!(!store.is_palette_index_allocated(0));
    }

    #[test]
    fn update_commits_only_on_success() {
        let store = SegmentationStore::default();
        store
            .upsert_metadata(SegmentationSchema::new("a").segments([segment(1)]))
            .unwrap();

        let result: CoreResult<((), Segmentation)> = store.update("a", |record| {
            record.label = "changed".into();
            Err(CoreError::unknown_segment("a", 3))
        });
        assert!(result.is_err());
        assert_eq!(store.get("a").unwrap().label, "Segmentation");

        let (removed, record) = store
            .update("a", |record| Ok(record.remove_segment(1).is_some()))
            .unwrap();
        assert!(removed);
        assert_eq!(record.segment_count(), 0);
    }

    #[test]
    fn merge_metadata_never_creates() {
        let store = SegmentationStore::default();
        let result = store.merge_metadata(&SegmentationSchema::new("a").label("X"));
        assert!(matches!(result, Err(CoreError::UnknownSegmentation { .. })));
        assert!(store.is_empty());

        store
            .upsert_metadata(SegmentationSchema::new("a").segments([segment(1), segment(2)]))
            .unwrap();
        let merged = store
            .merge_metadata(&SegmentationSchema::new("a").segments_locked([2, 40]))
            .unwrap();
        assert!(!merged.segment(1).unwrap().is_locked);
        assert!(merged.segment(2).unwrap().is_locked);
    }

    #[test]
    fn create_metadata_never_merges() {
        let store = SegmentationStore::default();
        let (_, created) = store
            .create_metadata(&SegmentationSchema::new("a").segments([segment(1)]))
            .unwrap();
        assert_eq!(created.color_lut_index(), 0);

        let again = store.create_metadata(&SegmentationSchema::new("a").label("Other"));
        assert!(matches!(again, Err(CoreError::SegmentationExists { .. })));
        let stored = store.get("a").unwrap();
        assert_eq!(stored.label, "Segmentation");
        assert_eq!(stored.segment_count(), 1);
        assert!(!store.is_palette_index_allocated(1));
    }

    #[test]
    fn update_unknown_segmentation_fails() {
        let store = SegmentationStore::default();
        let result = store.update("missing", |_| Ok(()));
        assert!(matches!(result, Err(CoreError::UnknownSegmentation { .. })));
    }

    #[test]
    fn locks_follow_schema() {
        let store = SegmentationStore::default();
        store
            .upsert_metadata(SegmentationSchema::new("a").segments([segment(1), segment(2)]))
            .unwrap();

        let (_, record) = store
            .upsert_metadata(SegmentationSchema::new("a").segments_locked([2, 40]))
            .unwrap();
        assert!(!record.segment(1).unwrap().is_locked);
        assert!(record.segment(2).unwrap().is_locked);
    }
}
