//! Slice alignment of imported segments.

use labelmap_volume::VolumeGeometry;

/// Where a segment's first slice lands in the reference volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceAlignment {
    /// Distance from the volume origin in slice spacings.
    pub estimated_slice: f64,
    /// Destination frame, if the estimate is within tolerance of one.
    pub frame_offset: Option<usize>,
}

impl SliceAlignment {
    /// Returns true if the segment starts on a slice boundary.
    #[must_use]
    pub const fn is_aligned(&self) -> bool {
        self.frame_offset.is_some()
    }
}

/// Euclidean distance between two physical points.
#[must_use]
pub fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

/// Computes the destination frame of a segment whose first slice sits at
/// `first_position`.
///
/// The estimate is `distance(first_position, origin) / slice_spacing`. It is
/// accepted when it lies within `tolerance` of an integer; a zero or
/// non-finite spacing never aligns.
#[must_use]
pub fn align_first_slice(
    geometry: &VolumeGeometry,
    first_position: [f64; 3],
    tolerance: f64,
) -> SliceAlignment {
    let estimated_slice = distance(first_position, geometry.origin) / geometry.slice_spacing();
    let rounded = estimated_slice.round();
    let frame_offset = if estimated_slice.is_finite() && (estimated_slice - rounded).abs() <= tolerance
    {
        // `rounded` is a finite, non-negative integer here.
        Some(rounded as usize)
    } else {
        None
    };
    SliceAlignment {
        estimated_slice,
        frame_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> VolumeGeometry {
        VolumeGeometry::new([4, 4, 6], [0.0, 0.0, 0.0], [1.0, 1.0, 2.0])
    }

    #[test]
    fn exact_positions_align() {
        let a = align_first_slice(&geometry(), [0.0, 0.0, 0.0], 1e-4);
        let b = align_first_slice(&geometry(), [0.0, 0.0, 6.0], 1e-4);
        assert_eq!(a.frame_offset, Some(0));
        assert_eq!(b.frame_offset, Some(3));
        assert_eq!(b.estimated_slice, 3.0);
    }

    #[test]
    fn off_boundary_position_is_rejected() {
        let alignment = align_first_slice(&geometry(), [0.0, 0.0, 6.9], 1e-4);
        assert!(!alignment.is_aligned());
        assert!((alignment.estimated_slice - 3.45).abs() < 1e-9);
    }

    #[test]
    fn tiny_drift_is_tolerated() {
        let alignment = align_first_slice(&geometry(), [0.0, 0.0, 4.00005], 1e-4);
        assert_eq!(alignment.frame_offset, Some(2));
    }

    #[test]
    fn zero_spacing_never_aligns() {
        let flat = VolumeGeometry::new([2, 2, 2], [0.0; 3], [1.0, 1.0, 0.0]);
        assert!(!align_first_slice(&flat, [0.0, 0.0, 1.0], 1e-4).is_aligned());
        assert!(!align_first_slice(&flat, [0.0, 0.0, 0.0], 1e-4).is_aligned());
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(distance([0.0, 3.0, 0.0], [4.0, 0.0, 0.0]), 5.0);
    }
}
