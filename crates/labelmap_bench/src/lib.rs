//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use labelmap_core::DiscreteSegment;
use labelmap_volume::{VolumeGeometry, Voxel};

/// A square, 1mm isotropic grid at the origin.
pub fn cube(edge: usize, frames: usize) -> VolumeGeometry {
    VolumeGeometry::new([edge, edge, frames], [0.0; 3], [1.0; 3])
}

/// Voxels cycling through `labels` in runs of `run` voxels, with background
/// between runs.
pub fn striped_labels(geometry: &VolumeGeometry, labels: Voxel, run: usize) -> Vec<Voxel> {
    let run = run.max(1);
    (0..geometry.voxel_count())
        .map(|i| {
            let stripe = i / run;
            if stripe % 2 == 0 {
                0
            } else {
                (stripe / 2 % usize::from(labels.max(1))) as Voxel + 1
            }
        })
        .collect()
}

/// One segment per slab of `frames_per_segment` frames, each with a
/// checkerboard mask.
pub fn slab_segments(geometry: &VolumeGeometry, frames_per_segment: usize) -> Vec<DiscreteSegment> {
    let frames_per_segment = frames_per_segment.max(1);
    let mask: Vec<u8> = (0..geometry.frame_len() * frames_per_segment)
        .map(|i| u8::from(i % 2 == 0))
        .collect();
    (0..geometry.num_frames() / frames_per_segment)
        .map(|slab| {
            let index = (slab % 255) as u16 + 1;
            let z = geometry.origin[2] + (slab * frames_per_segment) as f64 * geometry.slice_spacing();
            DiscreteSegment::new(
                index,
                format!("Slab {slab}"),
                frames_per_segment,
                [geometry.origin[0], geometry.origin[1], z],
                mask.clone(),
            )
        })
        .collect()
}
