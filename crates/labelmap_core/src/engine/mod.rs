//! External annotation/rendering engine interface.
//!
//! The engine owns on-screen drawing and per-viewport-group state. The core
//! talks to it exclusively through [`AnnotationEngine`] and learns about the
//! engine's own edits from [`EngineNotification`]s delivered to a registered
//! listener.
//!
//! ## Implementors
//!
//! - [`InMemoryEngine`] - Records calls and keeps state in memory
//! - [`InMemoryViewportGroups`] - Static group registry recording renders

mod groups;
mod memory;

pub use groups::InMemoryViewportGroups;
pub use memory::{EngineCall, InMemoryEngine};

use crate::config::{RenderSettings, ThresholdGate};
use crate::palette::ColorLut;
use crate::types::{ListenerId, RepresentationKind, RepresentationUid, Rgba, SegmentIndex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A segmentation representation registered in a viewport group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Representation {
    /// Handle of the representation.
    pub uid: RepresentationUid,
    /// Segmentation it draws.
    pub segmentation_id: String,
    /// What it draws.
    pub kind: RepresentationKind,
}

/// Segmentation data handed to the engine on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationRegistration {
    /// Segmentation identifier.
    pub segmentation_id: String,
    /// Display label.
    pub label: String,
    /// Representation kind of the data.
    pub kind: RepresentationKind,
    /// Labelmap volume holding the voxels.
    pub volume_id: Option<String>,
}

/// The engine's own view of a segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSegmentationState {
    /// Segmentation identifier.
    pub segmentation_id: String,
    /// Label known to the engine.
    pub label: String,
    /// Kinds of representation data the engine holds.
    pub representation_kinds: Vec<RepresentationKind>,
    /// Active segment, if any.
    pub active_segment_index: Option<SegmentIndex>,
    /// Locked segment indices.
    pub segments_locked: BTreeSet<SegmentIndex>,
    /// Statistics computed by the engine.
    pub cached_stats: BTreeMap<String, f64>,
}

impl EngineSegmentationState {
    /// Creates the state for a newly registered segmentation.
    #[must_use]
    pub fn from_registration(registration: &SegmentationRegistration) -> Self {
        Self {
            segmentation_id: registration.segmentation_id.clone(),
            label: registration.label.clone(),
            representation_kinds: vec![registration.kind],
            active_segment_index: None,
            segments_locked: BTreeSet::new(),
            cached_stats: BTreeMap::new(),
        }
    }
}

/// A notification emitted by the engine about its own changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineNotification {
    /// Voxels of the segmentation changed.
    DataModified {
        /// Segmentation identifier.
        segmentation_id: String,
        /// Frames that changed.
        modified_frames: Vec<usize>,
    },
    /// The engine's metadata for the segmentation changed.
    MetadataModified {
        /// Segmentation identifier.
        segmentation_id: String,
    },
}

impl EngineNotification {
    /// Returns the segmentation the notification concerns.
    #[must_use]
    pub fn segmentation_id(&self) -> &str {
        match self {
            EngineNotification::DataModified {
                segmentation_id, ..
            }
            | EngineNotification::MetadataModified { segmentation_id } => segmentation_id,
        }
    }

    /// Returns a short name for logs and diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            EngineNotification::DataModified { .. } => "data-modified",
            EngineNotification::MetadataModified { .. } => "metadata-modified",
        }
    }
}

/// Callback receiving engine notifications.
pub type EngineListener = Arc<dyn Fn(&EngineNotification) + Send + Sync>;

/// The annotation/rendering engine the core keeps in sync.
///
/// Group-scoped calls address a representation by its handle; segmentation
/// scoped calls (locks, active segment) apply across groups.
///
/// # Reentrancy
///
/// The engine may deliver notifications synchronously from inside any call.
/// Implementations must not hold internal locks while invoking listeners.
pub trait AnnotationEngine: Send + Sync {
    /// Registers a segmentation's data.
    fn add_segmentation(&self, registration: SegmentationRegistration);

    /// Forgets a segmentation and all engine state about it.
    fn remove_segmentation(&self, segmentation_id: &str);

    /// Returns the engine's state for a segmentation.
    fn segmentation_state(&self, segmentation_id: &str) -> Option<EngineSegmentationState>;

    /// Adds a representation of a segmentation to a group.
    fn add_representation(
        &self,
        group_id: &str,
        segmentation_id: &str,
        kind: RepresentationKind,
        color_lut_index: u32,
    ) -> RepresentationUid;

    /// Removes every representation of a segmentation from a group.
    fn remove_representations(&self, group_id: &str, segmentation_id: &str);

    /// Lists the representations in a group.
    fn representations(&self, group_id: &str) -> Vec<Representation>;

    /// Registers a palette under an index.
    fn add_color_lut(&self, index: u32, color_lut: ColorLut);

    /// Returns the color of a segment in a representation.
    fn segment_color(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
    ) -> Option<Rgba>;

    /// Sets the color of a segment in a representation.
    fn set_segment_color(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        color: Rgba,
    );

    /// Returns whether a segment is drawn in a representation.
    fn segment_visibility(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
    ) -> bool;

    /// Shows or hides a segment in a representation.
    fn set_segment_visibility(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        visible: bool,
    );

    /// Shows or hides a whole representation.
    fn set_representation_visibility(&self, group_id: &str, uid: &RepresentationUid, visible: bool);

    /// Returns whether a segment is locked.
    fn segment_locked(&self, segmentation_id: &str, segment_index: SegmentIndex) -> bool;

    /// Locks or unlocks a segment.
    fn set_segment_locked(&self, segmentation_id: &str, segment_index: SegmentIndex, locked: bool);

    /// Returns the active segment of a segmentation.
    fn active_segment_index(&self, segmentation_id: &str) -> Option<SegmentIndex>;

    /// Sets the active segment of a segmentation.
    fn set_active_segment_index(&self, segmentation_id: &str, segment_index: SegmentIndex);

    /// Makes a representation the active one in its group.
    fn set_active_representation(&self, group_id: &str, uid: &RepresentationUid);

    /// Returns the global render settings.
    fn render_settings(&self) -> RenderSettings;

    /// Replaces the global render settings.
    fn set_render_settings(&self, settings: RenderSettings);

    /// Sets the brush size of a group's brush tools.
    fn set_brush_size(&self, group_id: &str, size: f32);

    /// Sets the intensity gate of a group's brush tools.
    fn set_brush_threshold_gate(&self, group_id: &str, gate: Option<ThresholdGate>);

    /// Requests a partial redraw of the given frames.
    fn notify_data_modified(&self, segmentation_id: &str, modified_frames: &[usize]);

    /// Registers a notification listener.
    fn subscribe(&self, listener: EngineListener) -> ListenerId;

    /// Removes a notification listener.
    fn unsubscribe(&self, listener: ListenerId) -> bool;
}

/// Registry of viewport groups.
pub trait ViewportGroups: Send + Sync {
    /// Lists group identifiers in registration order.
    fn group_ids(&self) -> Vec<String>;

    /// Lists the viewports of a group.
    fn viewport_ids(&self, group_id: &str) -> Vec<String>;

    /// Re-renders the given viewports.
    fn render_viewports(&self, viewport_ids: &[String]);
}
