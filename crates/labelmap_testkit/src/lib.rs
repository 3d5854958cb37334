//! # Labelmap Testkit
//!
//! Test utilities for labelmap segmentations.
//!
//! This crate provides:
//! - Reference volumes and a fully wired in-memory harness
//! - An event recorder for asserting on broadcasts
//! - Property-based generators for segment operations
//!
//! ## Usage
//!
//! ```rust
//! use labelmap_testkit::prelude::*;
//!
//! let harness = TestHarness::new();
//! harness.seed_segmentation("seg", &[1, 2, 3]);
//! assert_eq!(harness.segmentation("seg").unwrap().segment_count(), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
