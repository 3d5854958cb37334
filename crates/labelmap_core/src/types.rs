//! Core type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a segment within a segmentation.
///
/// `0` is reserved for background and never names a segment.
pub type SegmentIndex = u16;

/// The reserved background index.
pub const BACKGROUND_INDEX: SegmentIndex = 0;

/// An RGB color.
pub type Rgb = [u8; 3];

/// Kind of data a segmentation representation draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RepresentationKind {
    /// Dense voxel labelmap.
    Labelmap,
    /// Planar contours.
    Contour,
    /// Surface mesh.
    Surface,
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepresentationKind::Labelmap => "labelmap",
            RepresentationKind::Contour => "contour",
            RepresentationKind::Surface => "surface",
        };
        f.write_str(name)
    }
}

/// A color with opacity, as the rendering engine stores it per segment.
///
/// `alpha` is the opacity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    /// Red, green and blue channels.
    pub rgb: Rgb,
    /// Opacity.
    pub alpha: f32,
}

impl Rgba {
    /// Creates a color.
    #[must_use]
    pub const fn new(rgb: Rgb, alpha: f32) -> Self {
        Self { rgb, alpha }
    }

    /// Creates a fully opaque color.
    #[must_use]
    pub const fn opaque(rgb: Rgb) -> Self {
        Self { rgb, alpha: 1.0 }
    }

    /// Returns a copy with the color channels replaced.
    #[must_use]
    pub const fn with_rgb(self, rgb: Rgb) -> Self {
        Self { rgb, ..self }
    }

    /// Returns a copy with the opacity replaced.
    #[must_use]
    pub const fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }
}

/// Handle to a segmentation representation inside a viewport group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepresentationUid(pub String);

impl RepresentationUid {
    /// Creates a representation handle.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the raw handle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepresentationUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "repr:{}", self.0)
    }
}

/// Identifier returned when an engine listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener:{}", self.0)
    }
}
