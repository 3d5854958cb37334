//! Voxel scan used when a segment is removed.

use labelmap_volume::Voxel;
use std::collections::BTreeSet;

/// Zeroes every voxel equal to `label` and returns the frames that changed.
///
/// `voxels` is read frame by frame, `frame_len` voxels per frame. Labels may
/// be scattered anywhere, so the whole buffer is always visited. The
/// returned frame numbers are ascending and unique. A trailing partial frame
/// is scanned like a full one.
pub fn clear_label(voxels: &mut [Voxel], frame_len: usize, label: Voxel) -> Vec<usize> {
    if frame_len == 0 {
        return Vec::new();
    }

    let mut modified = BTreeSet::new();
    for (frame, chunk) in voxels.chunks_mut(frame_len).enumerate() {
        for voxel in chunk.iter_mut().filter(|voxel| **voxel == label) {
            *voxel = 0;
            modified.insert(frame);
        }
    }
    modified.into_iter().collect()
}
