//! Segmentation and segment records.

mod schema;
mod segment;
mod segmentation;

pub use schema::SegmentationSchema;
pub use segment::{Segment, SegmentProperties};
pub use segmentation::Segmentation;
pub(crate) use segment::validate_opacity;
