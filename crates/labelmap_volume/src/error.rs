//! Error types for volume operations.

use thiserror::Error;

/// Result type for volume operations.
pub type VolumeResult<T> = Result<T, VolumeError>;

/// Errors that can occur while looking up or allocating volumes.
#[derive(Debug, Error)]
pub enum VolumeError {
    /// No volume is registered under the identifier.
    #[error("volume not found: {volume_id}")]
    NotFound {
        /// The identifier that was looked up.
        volume_id: String,
    },

    /// A volume is already registered under the identifier.
    #[error("volume already exists: {volume_id}")]
    AlreadyExists {
        /// The identifier that was requested.
        volume_id: String,
    },

    /// The voxel buffer length does not match the declared geometry.
    #[error("buffer length {actual} does not match geometry {dimensions:?} ({expected} voxels)")]
    LengthMismatch {
        /// Declared dimensions.
        dimensions: [usize; 3],
        /// Voxel count implied by the dimensions.
        expected: usize,
        /// Actual buffer length.
        actual: usize,
    },

    /// Allocation failed inside the store.
    #[error("allocation failed: {0}")]
    Allocation(String),
}
