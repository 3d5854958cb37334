//! # Labelmap Volume
//!
//! Voxel buffer and volume store abstractions for labelmap segmentations.
//!
//! This crate is the lowest layer of the workspace. Volumes are
//! **externally owned**: the store allocates, reshapes and frees them, while
//! the segmentation core only reads and writes voxel values in place through a
//! shared [`VoxelBuffer`].
//!
//! ## Design Principles
//!
//! - A buffer is shared by reference; cloning a [`Volume`] never copies voxels
//! - Stores know nothing about segments, colors or representations
//! - Allocation of derived buffers is the only asynchronous operation
//! - Implementations must be `Send + Sync`
//!
//! ## Available Stores
//!
//! - [`InMemoryVolumeStore`] - For tests, tools and embedding
//!
//! ## Example
//!
//! ```rust
//! use labelmap_volume::{InMemoryVolumeStore, Volume, VolumeGeometry, VolumeStore};
//!
//! let store = InMemoryVolumeStore::new();
//! let geometry = VolumeGeometry::new([4, 4, 6], [0.0; 3], [1.0, 1.0, 2.0]);
//! store.insert(Volume::zeroed("ct", geometry));
//!
//! let volume = store.get_volume("ct").unwrap();
//! assert_eq!(volume.scalar_data().len(), 96);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
mod store;
mod volume;

pub use error::{VolumeError, VolumeResult};
pub use memory::InMemoryVolumeStore;
pub use store::{AllocationFuture, DerivedVolumeOptions, VolumeAllocator, VolumeStore};
pub use volume::{Volume, VolumeGeometry, Voxel, VoxelBuffer, VoxelFormat};
