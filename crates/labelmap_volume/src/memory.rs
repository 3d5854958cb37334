//! In-memory volume store.

use crate::error::{VolumeError, VolumeResult};
use crate::store::{AllocationFuture, DerivedVolumeOptions, VolumeAllocator, VolumeStore};
use crate::volume::Volume;
use parking_lot::RwLock;
use std::collections::HashMap;

/// An in-memory volume store.
///
/// Suitable for:
/// - Unit and integration tests
/// - Command-line tools
/// - Embedding where no GPU-side cache exists
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use labelmap_volume::{InMemoryVolumeStore, Volume, VolumeGeometry, VolumeStore};
///
/// let store = InMemoryVolumeStore::new();
/// store.insert(Volume::zeroed("ct", VolumeGeometry::new([2, 2, 2], [0.0; 3], [1.0; 3])));
/// assert!(store.remove_volume_buffer("ct"));
/// assert!(store.get_volume("ct").is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVolumeStore {
    volumes: RwLock<HashMap<String, Volume>>,
}

impl InMemoryVolumeStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a volume, replacing any volume with the same identifier.
    pub fn insert(&self, volume: Volume) {
        self.volumes.write().insert(volume.id().to_string(), volume);
    }

    /// Returns true if a volume is registered under `volume_id`.
    #[must_use]
    pub fn contains(&self, volume_id: &str) -> bool {
        self.volumes.read().contains_key(volume_id)
    }

    /// Returns the number of registered volumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.volumes.read().len()
    }

    /// Returns true if no volumes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.volumes.read().is_empty()
    }

    fn derive(&self, source_id: &str, options: DerivedVolumeOptions) -> VolumeResult<Volume> {
        let mut volumes = self.volumes.write();
        let source = volumes
            .get(source_id)
            .ok_or_else(|| VolumeError::NotFound {
                volume_id: source_id.to_string(),
            })?;
        if volumes.contains_key(&options.volume_id) {
            return Err(VolumeError::AlreadyExists {
                volume_id: options.volume_id,
            });
        }

        let derived =
            Volume::zeroed(options.volume_id.clone(), *source.geometry()).with_format(options.format);
        volumes.insert(options.volume_id, derived.clone());
        Ok(derived)
    }
}

impl VolumeStore for InMemoryVolumeStore {
    fn get_volume(&self, volume_id: &str) -> Option<Volume> {
        self.volumes.read().get(volume_id).cloned()
    }

    fn remove_volume_buffer(&self, volume_id: &str) -> bool {
        self.volumes.write().remove(volume_id).is_some()
    }
}

impl VolumeAllocator for InMemoryVolumeStore {
    fn create_derived_volume<'a>(
        &'a self,
        source_id: &'a str,
        options: DerivedVolumeOptions,
    ) -> AllocationFuture<'a> {
        Box::pin(async move { self.derive(source_id, options) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{VolumeGeometry, VoxelFormat};

    fn source() -> Volume {
        Volume::with_data(
            "ct",
            VolumeGeometry::new([2, 2, 3], [0.0, 0.0, -5.0], [0.5, 0.5, 2.0]),
            (0..12).collect(),
        )
        .unwrap()
    }

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryVolumeStore::new();
        assert!(store.is_empty());
        assert!(store.get_volume("ct").is_none());
    }

    #[test]
    fn memory_insert_and_get_share_buffer() {
        let store = InMemoryVolumeStore::new();
        let volume = source();
        store.insert(volume.clone());

        let fetched = store.get_volume("ct").unwrap();
        assert!(fetched.scalar_data().ptr_eq(volume.scalar_data()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_remove_buffer() {
        let store = InMemoryVolumeStore::new();
        store.insert(source());

        assert!(store.remove_volume_buffer("ct"));
        assert!(!store.remove_volume_buffer("ct"));
        assert!(!store.contains("ct"));
    }

    #[tokio::test]
    async fn memory_derived_volume_copies_geometry() {
        let store = InMemoryVolumeStore::new();
        store.insert(source());

        let derived = store
            .create_derived_volume("ct", DerivedVolumeOptions::new("seg", VoxelFormat::U16))
            .await
            .unwrap();

        assert_eq!(derived.id(), "seg");
        assert_eq!(derived.geometry(), source().geometry());
        assert_eq!(derived.format(), VoxelFormat::U16);
        assert!(derived.scalar_data().read().iter().all(|&v| v == 0));
        assert!(store.contains("seg"));
    }

    #[tokio::test]
    async fn memory_derived_volume_missing_source_fails() {
        let store = InMemoryVolumeStore::new();
        let result = store
            .create_derived_volume("nope", DerivedVolumeOptions::new("seg", VoxelFormat::U8))
            .await;
        assert!(matches!(result, Err(VolumeError::NotFound { .. })));
    }

    #[tokio::test]
    async fn memory_derived_volume_existing_target_fails() {
        let store = InMemoryVolumeStore::new();
        store.insert(source());
        let options = DerivedVolumeOptions::new("seg", VoxelFormat::U8);

        store
            .create_derived_volume("ct", options.clone())
            .await
            .unwrap();
        let result = store.create_derived_volume("ct", options).await;
        assert!(matches!(result, Err(VolumeError::AlreadyExists { .. })));
    }
}
