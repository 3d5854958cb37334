//! Volume geometry and shared voxel buffers.

use crate::error::{VolumeError, VolumeResult};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::Arc;

/// A single labelmap voxel value.
///
/// `0` is background; any other value is a segment index.
pub type Voxel = u16;

/// Storage width requested for a derived labelmap buffer.
///
/// Buffers are always held as [`Voxel`] in memory; the format caps the
/// largest segment index the buffer may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoxelFormat {
    /// 8-bit labels (up to 255 segments).
    #[default]
    U8,
    /// 16-bit labels.
    U16,
}

impl VoxelFormat {
    /// Returns the largest label value representable in this format.
    #[must_use]
    pub const fn max_label(self) -> Voxel {
        match self {
            VoxelFormat::U8 => u8::MAX as Voxel,
            VoxelFormat::U16 => Voxel::MAX,
        }
    }
}

/// Shape and physical placement of a volume.
///
/// `dimensions` is `[columns, rows, frames]`; frames are stacked along the
/// third axis, `spacing[2]` apart, starting at `origin`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeGeometry {
    /// Voxel counts along x, y and z.
    pub dimensions: [usize; 3],
    /// Physical position of the first voxel.
    pub origin: [f64; 3],
    /// Physical distance between voxel centers along each axis.
    pub spacing: [f64; 3],
}

impl VolumeGeometry {
    /// Creates a new geometry.
    #[must_use]
    pub const fn new(dimensions: [usize; 3], origin: [f64; 3], spacing: [f64; 3]) -> Self {
        Self {
            dimensions,
            origin,
            spacing,
        }
    }

    /// Number of columns (x).
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.dimensions[0]
    }

    /// Number of rows (y).
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.dimensions[1]
    }

    /// Number of frames (z).
    #[must_use]
    pub const fn num_frames(&self) -> usize {
        self.dimensions[2]
    }

    /// Number of voxels in one frame.
    #[must_use]
    pub const fn frame_len(&self) -> usize {
        self.dimensions[0] * self.dimensions[1]
    }

    /// Total number of voxels.
    #[must_use]
    pub const fn voxel_count(&self) -> usize {
        self.frame_len() * self.dimensions[2]
    }

    /// Distance between consecutive frames.
    #[must_use]
    pub const fn slice_spacing(&self) -> f64 {
        self.spacing[2]
    }

    /// Returns true if both geometries describe the same voxel grid shape.
    #[must_use]
    pub fn same_shape(&self, other: &VolumeGeometry) -> bool {
        self.dimensions == other.dimensions
    }
}

/// A voxel buffer shared between the segmentation core and its renderer.
///
/// Cloning is cheap and yields another handle to the same voxels. The
/// length is fixed at creation; only the owning store may replace a buffer.
#[derive(Clone, Default)]
pub struct VoxelBuffer {
    inner: Arc<RwLock<Vec<Voxel>>>,
}

impl VoxelBuffer {
    /// Creates a zero-initialized buffer of `len` voxels.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    /// Wraps existing voxel data.
    #[must_use]
    pub fn from_vec(data: Vec<Voxel>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns the number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if the buffer holds no voxels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the buffer for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Voxel>> {
        self.inner.read()
    }

    /// Locks the buffer for in-place writes.
    ///
    /// The guard derefs to a `Vec`, but callers must not change its length.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Voxel>> {
        self.inner.write()
    }

    /// Returns a copy of the voxels.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Voxel> {
        self.inner.read().clone()
    }

    /// Returns true if both handles refer to the same voxels.
    #[must_use]
    pub fn ptr_eq(&self, other: &VoxelBuffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for VoxelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoxelBuffer")
            .field("len", &self.len())
            .finish()
    }
}

/// A volume: geometry plus a shared voxel buffer.
#[derive(Debug, Clone)]
pub struct Volume {
    id: String,
    geometry: VolumeGeometry,
    format: VoxelFormat,
    scalar_data: VoxelBuffer,
}

impl Volume {
    /// Creates a zero-filled volume.
    #[must_use]
    pub fn zeroed(id: impl Into<String>, geometry: VolumeGeometry) -> Self {
        Self {
            id: id.into(),
            geometry,
            format: VoxelFormat::default(),
            scalar_data: VoxelBuffer::zeroed(geometry.voxel_count()),
        }
    }

    /// Creates a volume over existing voxel data.
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if `data` does not hold exactly
    /// `geometry.voxel_count()` voxels.
    pub fn with_data(
        id: impl Into<String>,
        geometry: VolumeGeometry,
        data: Vec<Voxel>,
    ) -> VolumeResult<Self> {
        if data.len() != geometry.voxel_count() {
            return Err(VolumeError::LengthMismatch {
                dimensions: geometry.dimensions,
                expected: geometry.voxel_count(),
                actual: data.len(),
            });
        }
        Ok(Self {
            id: id.into(),
            geometry,
            format: VoxelFormat::default(),
            scalar_data: VoxelBuffer::from_vec(data),
        })
    }

    /// Sets the voxel format.
    #[must_use]
    pub fn with_format(mut self, format: VoxelFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the volume identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the volume geometry.
    #[must_use]
    pub const fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Returns the voxel format.
    #[must_use]
    pub const fn format(&self) -> VoxelFormat {
        self.format
    }

    /// Returns the shared voxel buffer.
    #[must_use]
    pub const fn scalar_data(&self) -> &VoxelBuffer {
        &self.scalar_data
    }

    /// Returns true if the buffer length matches the declared geometry.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.scalar_data.len() == self.geometry.voxel_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> VolumeGeometry {
        VolumeGeometry::new([4, 3, 2], [0.0; 3], [1.0, 1.0, 2.5])
    }

    #[test]
    fn geometry_counts() {
        let g = geometry();
        assert_eq!(g.columns(), 4);
        assert_eq!(g.rows(), 3);
        assert_eq!(g.num_frames(), 2);
        assert_eq!(g.frame_len(), 12);
        assert_eq!(g.voxel_count(), 24);
        assert_eq!(g.slice_spacing(), 2.5);
    }

    #[test]
    fn zeroed_volume_is_consistent() {
        let volume = Volume::zeroed("v", geometry());
        assert!(volume.is_consistent());
        assert!(volume.scalar_data().read().iter().all(|&v| v == 0));
    }

    #[test]
    fn with_data_rejects_wrong_length() {
        let result = Volume::with_data("v", geometry(), vec![0; 5]);
        assert!(matches!(
            result,
            Err(VolumeError::LengthMismatch {
                expected: 24,
                actual: 5,
                ..
            })
        ));
    }

    #[test]
    fn clones_share_voxels() {
        let volume = Volume::zeroed("v", geometry());
        let other = volume.clone();
        other.scalar_data().write()[3] = 7;

        assert_eq!(volume.scalar_data().read()[3], 7);
        assert!(volume.scalar_data().ptr_eq(other.scalar_data()));
    }

    #[test]
    fn format_caps_labels() {
        assert_eq!(VoxelFormat::U8.max_label(), 255);
        assert_eq!(VoxelFormat::U16.max_label(), u16::MAX);
    }
}
