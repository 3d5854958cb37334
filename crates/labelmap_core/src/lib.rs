//! # Labelmap Core
//!
//! Segmentation state manager for volumetric labelmap annotations.
//!
//! This crate owns the canonical record of every segmentation (segments,
//! colors, visibility, locks, active state) and keeps it synchronized with
//! an external annotation/rendering engine that draws the voxels.
//!
//! This crate provides:
//! - [`SegmentationStore`] - the single source of truth for metadata
//! - [`ColorPaletteAllocator`] - one palette index per live segmentation
//! - [`SegmentMutator`] - segment add/remove/edit with engine mirroring
//! - [`VolumeImportEngine`] - slice-aligned merge of discrete segments
//! - [`ExternalSyncAdapter`] - outbound engine calls, inbound reconciliation
//! - [`EventBroadcaster`] - synchronous publish/subscribe
//! - [`SegmentationManager`] - the facade wiring them together
//!
//! ## Invariants
//!
//! After every public operation, for every segmentation:
//! - Index 0 never has a segment
//! - The segment count equals the number of segments
//! - The active segment index is `None` or names a present segment
//! - Palette indices are pairwise distinct across live segmentations

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod engine;
mod error;
mod events;
mod import;
mod manager;
mod model;
mod mutator;
mod palette;
mod scan;
mod store;
mod sync;
mod types;

pub use config::{
    Config, RenderConfiguration, RenderConfigurationUpdate, RenderSettings, ThresholdGate,
};
pub use engine::{
    AnnotationEngine, EngineCall, EngineListener, EngineNotification, EngineSegmentationState,
    InMemoryEngine, InMemoryViewportGroups, Representation, SegmentationRegistration,
    ViewportGroups,
};
pub use error::{CoreError, CoreResult};
pub use events::{EventBroadcaster, EventKind, SegmentationEvent, SubscriptionToken};
pub use import::{
    align_first_slice, distance, write_segment, DiscreteSegment, SliceAlignment,
    VolumeImportEngine,
};
pub use manager::SegmentationManager;
pub use model::{Segment, SegmentProperties, Segmentation, SegmentationSchema};
pub use mutator::SegmentMutator;
pub use palette::{ColorLut, ColorPaletteAllocator, DEFAULT_SEGMENT_COLORS, PALETTE_SIZE};
pub use scan::clear_label;
pub use store::{SegmentationStore, UpsertOutcome};
pub use sync::{ExternalSyncAdapter, SyncDiagnostic, SyncStats};
pub use types::{
    ListenerId, RepresentationKind, RepresentationUid, Rgb, Rgba, SegmentIndex, BACKGROUND_INDEX,
};
