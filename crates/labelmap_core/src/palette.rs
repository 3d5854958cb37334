//! Color palette allocation.
//!
//! Every live segmentation owns one palette (color lookup table), addressed
//! by a small integer. Indices are handed out lowest-free-first and become
//! reusable once released. Each allocation receives its own copy of the
//! default palette, so editing one segmentation's colors never leaks into
//! another's.

use crate::types::{Rgb, Rgba};
use std::collections::BTreeSet;

/// Default segment colors, cycled to fill a palette.
pub const DEFAULT_SEGMENT_COLORS: &[Rgb] = &[
    [221, 84, 84],
    [77, 228, 121],
    [166, 70, 235],
    [189, 180, 116],
    [109, 182, 196],
    [204, 101, 157],
    [123, 211, 94],
    [93, 87, 218],
    [225, 128, 80],
    [73, 232, 172],
    [181, 119, 186],
    [176, 193, 112],
    [105, 153, 200],
    [208, 97, 120],
    [90, 215, 101],
    [97, 130, 210],
];

/// Number of entries in a default palette, background included.
pub const PALETTE_SIZE: usize = 256;

/// A color lookup table indexed by segment index.
///
/// Entry `0` is the transparent background.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorLut {
    colors: Vec<Rgba>,
}

impl Default for ColorLut {
    fn default() -> Self {
        let mut colors = Vec::with_capacity(PALETTE_SIZE);
        colors.push(Rgba::new([0, 0, 0], 0.0));
        colors.extend(
            DEFAULT_SEGMENT_COLORS
                .iter()
                .cycle()
                .take(PALETTE_SIZE - 1)
                .map(|&rgb| Rgba::opaque(rgb)),
        );
        Self { colors }
    }
}

impl ColorLut {
    /// Creates a palette from explicit entries.
    #[must_use]
    pub fn from_colors(colors: Vec<Rgba>) -> Self {
        Self { colors }
    }

    /// Returns the color for an index.
    #[must_use]
    pub fn color(&self, index: usize) -> Option<Rgba> {
        self.colors.get(index).copied()
    }

    /// Sets the color for an index, growing the table with opaque black if
    /// needed.
    pub fn set_color(&mut self, index: usize, color: Rgba) {
        if index >= self.colors.len() {
            self.colors.resize(index + 1, Rgba::opaque([0, 0, 0]));
        }
        self.colors[index] = color;
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Returns true if the palette has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Hands out palette indices, one per live segmentation.
#[derive(Debug, Default)]
pub struct ColorPaletteAllocator {
    /// Indices held by live segmentations.
    allocated: BTreeSet<u32>,
    /// Palette copied into every allocation.
    template: ColorLut,
}

impl ColorPaletteAllocator {
    /// Creates an allocator with the default palette.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an allocator that copies `template` into every allocation.
    #[must_use]
    pub fn with_template(template: ColorLut) -> Self {
        Self {
            allocated: BTreeSet::new(),
            template,
        }
    }

    /// Allocates the lowest free index and a fresh copy of the palette.
    pub fn allocate(&mut self) -> (u32, ColorLut) {
        let mut index = 0;
        while self.allocated.contains(&index) {
            index += 1;
        }
        self.allocated.insert(index);
        (index, self.template.clone())
    }

    /// Returns an index to the pool.
    ///
    /// Returns false if the index was not allocated.
    pub fn release(&mut self, index: u32) -> bool {
        self.allocated.remove(&index)
    }

    /// Checks if an index is currently allocated.
    #[must_use]
    pub fn is_allocated(&self, index: u32) -> bool {
        self.allocated.contains(&index)
    }

    /// Returns the number of allocated indices.
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        self.allocated.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_lowest_first() {
        let mut allocator = ColorPaletteAllocator::new();
        assert_eq!(allocator.allocate().0, 0);
        assert_eq!(allocator.allocate().0, 1);
        assert_eq!(allocator.allocate().0, 2);
        assert_eq!(allocator.allocated_count(), 3);
    }

    #[test]
    fn released_index_is_reused_lowest_first() {
        let mut allocator = ColorPaletteAllocator::new();
        for _ in 0..4 {
            allocator.allocate();
        }
        assert!(allocator.release(2));
        assert!(allocator.release(1));
        assert!(!allocator.release(1));

        assert_eq!(allocator.allocate().0, 1);
        assert_eq!(allocator.allocate().0, 2);
        assert_eq!(allocator.allocate().0, 4);
    }

    #[test]
    fn palettes_are_independent_copies() {
        let mut allocator = ColorPaletteAllocator::new();
        let (_, mut first) = allocator.allocate();
        let (_, second) = allocator.allocate();

        first.set_color(1, Rgba::opaque([1, 1, 1]));
        assert_ne!(first.color(1), second.color(1));
        assert_eq!(second.color(1), Some(Rgba::opaque(DEFAULT_SEGMENT_COLORS[0])));
    }

    #[test]
    fn default_palette_has_transparent_background() {
        let lut = ColorLut::default();
        assert_eq!(lut.len(), PALETTE_SIZE);
        assert_eq!(lut.color(0).map(|c| c.alpha), Some(0.0));
        assert_eq!(
            lut.color(17),
            Some(Rgba::opaque(DEFAULT_SEGMENT_COLORS[0]))
        );
    }

    #[test]
    fn set_color_grows_table() {
        let mut lut = ColorLut::from_colors(Vec::new());
        assert!(lut.is_empty());
        lut.set_color(3, Rgba::opaque([9, 9, 9]));
        assert_eq!(lut.len(), 4);
        assert_eq!(lut.color(3), Some(Rgba::opaque([9, 9, 9])));
    }
}
