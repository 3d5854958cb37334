//! Volume store and allocator trait definitions.

use crate::error::VolumeResult;
use crate::volume::{Volume, VoxelFormat};
use std::future::Future;
use std::pin::Pin;

/// Future returned by [`VolumeAllocator::create_derived_volume`].
pub type AllocationFuture<'a> = Pin<Box<dyn Future<Output = VolumeResult<Volume>> + Send + 'a>>;

/// Read access to externally owned volumes.
///
/// Stores are **opaque owners**: they hand out shared handles to voxel
/// buffers but never interpret labels. Only the store may free or reshape a
/// buffer.
///
/// # Invariants
///
/// - `get_volume` returns a handle sharing voxels with every other handle
///   for the same identifier
/// - After `remove_volume_buffer`, `get_volume` returns `None`
pub trait VolumeStore: Send + Sync {
    /// Looks up a volume by identifier.
    fn get_volume(&self, volume_id: &str) -> Option<Volume>;

    /// Frees the voxel buffer registered under `volume_id`.
    ///
    /// Returns true if a volume was removed.
    fn remove_volume_buffer(&self, volume_id: &str) -> bool;
}

/// Options for allocating a volume derived from a source volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedVolumeOptions {
    /// Identifier under which the new volume is registered.
    pub volume_id: String,
    /// Label storage width.
    pub format: VoxelFormat,
}

impl DerivedVolumeOptions {
    /// Creates options for a derived volume.
    #[must_use]
    pub fn new(volume_id: impl Into<String>, format: VoxelFormat) -> Self {
        Self {
            volume_id: volume_id.into(),
            format,
        }
    }
}

/// Allocates derived labelmap volumes.
///
/// A derived volume copies the source's geometry and starts zero-filled.
/// Allocation may suspend; callers must re-validate the returned geometry
/// since the source can change while the allocation is pending.
pub trait VolumeAllocator: Send + Sync {
    /// Allocates a zero-filled volume shaped like `source_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The source volume does not exist (`NotFound`)
    /// - The target identifier is taken (`AlreadyExists`)
    fn create_derived_volume<'a>(
        &'a self,
        source_id: &'a str,
        options: DerivedVolumeOptions,
    ) -> AllocationFuture<'a>;
}
