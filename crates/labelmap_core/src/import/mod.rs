//! Import of labelmap segmentations.
//!
//! Discrete segments arrive as independent slice stacks, each positioned in
//! physical space. Import places each stack on the reference volume's slice
//! grid and merges them into one shared labelmap buffer.

mod align;
mod engine;
mod segment;

pub use align::{align_first_slice, distance, SliceAlignment};
pub use engine::VolumeImportEngine;
pub use segment::{write_segment, DiscreteSegment};
