//! In-memory annotation engine.
//!
//! Keeps the engine-side state a real renderer would hold (representations
//! per group, palettes, per-segment colors and visibility, locks, active
//! segments) and records every outbound call so tests can assert on the
//! exact traffic.

use crate::config::{RenderSettings, ThresholdGate};
use crate::engine::{
    AnnotationEngine, EngineListener, EngineNotification, EngineSegmentationState,
    Representation, SegmentationRegistration,
};
use crate::palette::ColorLut;
use crate::types::{ListenerId, RepresentationKind, RepresentationUid, Rgba, SegmentIndex};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// One outbound call received by an [`InMemoryEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    /// `add_segmentation`.
    AddSegmentation {
        /// Segmentation identifier.
        segmentation_id: String,
    },
    /// `remove_segmentation`.
    RemoveSegmentation {
        /// Segmentation identifier.
        segmentation_id: String,
    },
    /// `add_representation`.
    AddRepresentation {
        /// Target group.
        group_id: String,
        /// Segmentation identifier.
        segmentation_id: String,
        /// Palette bound to the representation.
        color_lut_index: u32,
    },
    /// `remove_representations`.
    RemoveRepresentations {
        /// Target group.
        group_id: String,
        /// Segmentation identifier.
        segmentation_id: String,
    },
    /// `add_color_lut`.
    AddColorLut {
        /// Palette index.
        index: u32,
    },
    /// `set_segment_color`.
    SetSegmentColor {
        /// Target group.
        group_id: String,
        /// Segment index.
        segment_index: SegmentIndex,
        /// New color.
        color: Rgba,
    },
    /// `set_segment_visibility`.
    SetSegmentVisibility {
        /// Target group.
        group_id: String,
        /// Segment index.
        segment_index: SegmentIndex,
        /// New visibility.
        visible: bool,
    },
    /// `set_representation_visibility`.
    SetRepresentationVisibility {
        /// Target group.
        group_id: String,
        /// New visibility.
        visible: bool,
    },
    /// `set_segment_locked`.
    SetSegmentLocked {
        /// Segmentation identifier.
        segmentation_id: String,
        /// Segment index.
        segment_index: SegmentIndex,
        /// New lock state.
        locked: bool,
    },
    /// `set_active_segment_index`.
    SetActiveSegmentIndex {
        /// Segmentation identifier.
        segmentation_id: String,
        /// New active segment.
        segment_index: SegmentIndex,
    },
    /// `set_active_representation`.
    SetActiveRepresentation {
        /// Target group.
        group_id: String,
        /// Representation made active.
        uid: RepresentationUid,
    },
    /// `set_render_settings`.
    SetRenderSettings {
        /// New settings.
        settings: RenderSettings,
    },
    /// `set_brush_size`.
    SetBrushSize {
        /// Target group.
        group_id: String,
        /// New brush size.
        size: f32,
    },
    /// `set_brush_threshold_gate`.
    SetBrushThresholdGate {
        /// Target group.
        group_id: String,
        /// New gate.
        gate: Option<ThresholdGate>,
    },
    /// `notify_data_modified`.
    NotifyDataModified {
        /// Segmentation identifier.
        segmentation_id: String,
        /// Frames to redraw.
        modified_frames: Vec<usize>,
    },
}

#[derive(Debug, Clone)]
struct RepresentationState {
    representation: Representation,
    color_lut_index: u32,
    visible: bool,
    colors: BTreeMap<SegmentIndex, Rgba>,
    hidden_segments: BTreeSet<SegmentIndex>,
}

#[derive(Debug, Clone, Default)]
struct BrushState {
    size: Option<f32>,
    threshold_gate: Option<ThresholdGate>,
}

#[derive(Debug, Default)]
struct EngineState {
    segmentations: BTreeMap<String, EngineSegmentationState>,
    groups: BTreeMap<String, Vec<RepresentationState>>,
    color_luts: BTreeMap<u32, ColorLut>,
    active_representations: BTreeMap<String, RepresentationUid>,
    brushes: BTreeMap<String, BrushState>,
    render_settings: RenderSettings,
}

impl EngineState {
    fn representation(&self, group_id: &str, uid: &RepresentationUid) -> Option<&RepresentationState> {
        self.groups
            .get(group_id)?
            .iter()
            .find(|state| &state.representation.uid == uid)
    }

    fn representation_mut(
        &mut self,
        group_id: &str,
        uid: &RepresentationUid,
    ) -> Option<&mut RepresentationState> {
        self.groups
            .get_mut(group_id)?
            .iter_mut()
            .find(|state| &state.representation.uid == uid)
    }
}

/// An [`AnnotationEngine`] that keeps its state in memory.
///
/// Segment colors default to the representation's palette entry until set.
/// `notify_data_modified` dispatches a data-modified notification to every
/// listener, as a renderer does after a partial redraw; metadata-modified
/// notifications are only sent through [`InMemoryEngine::emit`].
#[derive(Default)]
pub struct InMemoryEngine {
    state: Mutex<EngineState>,
    calls: Mutex<Vec<EngineCall>>,
    listeners: Mutex<Vec<(ListenerId, EngineListener)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for InMemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEngine")
            .field("calls", &self.calls.lock().len())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl InMemoryEngine {
    /// Creates an engine with no state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Returns the number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Edits the engine's own state for a segmentation, as a tool would.
    ///
    /// Returns false if the segmentation is not registered. No notification
    /// is sent; follow with [`InMemoryEngine::emit`] to announce the change.
    pub fn edit_segmentation<F>(&self, segmentation_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut EngineSegmentationState),
    {
        let mut state = self.state.lock();
        match state.segmentations.get_mut(segmentation_id) {
            Some(segmentation) => {
                f(segmentation);
                true
            }
            None => false,
        }
    }

    /// Returns the brush size set for a group.
    #[must_use]
    pub fn brush_size(&self, group_id: &str) -> Option<f32> {
        self.state.lock().brushes.get(group_id).and_then(|b| b.size)
    }

    /// Returns the brush gate set for a group.
    #[must_use]
    pub fn brush_threshold_gate(&self, group_id: &str) -> Option<ThresholdGate> {
        self.state
            .lock()
            .brushes
            .get(group_id)
            .and_then(|b| b.threshold_gate)
    }

    /// Returns whether a representation is drawn.
    #[must_use]
    pub fn representation_visibility(&self, group_id: &str, uid: &RepresentationUid) -> Option<bool> {
        self.state
            .lock()
            .representation(group_id, uid)
            .map(|state| state.visible)
    }

    /// Returns the active representation of a group.
    #[must_use]
    pub fn active_representation(&self, group_id: &str) -> Option<RepresentationUid> {
        self.state.lock().active_representations.get(group_id).cloned()
    }

    /// Returns the palette registered under an index.
    #[must_use]
    pub fn color_lut(&self, index: u32) -> Option<ColorLut> {
        self.state.lock().color_luts.get(&index).cloned()
    }

    /// Sends a notification to every listener.
    ///
    /// Listeners run after the listener list is released, so they may call
    /// back into the engine.
    pub fn emit(&self, notification: &EngineNotification) {
        let listeners: Vec<EngineListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(notification);
        }
    }

    /// Sends a metadata-modified notification for a segmentation.
    pub fn emit_metadata_modified(&self, segmentation_id: &str) {
        self.emit(&EngineNotification::MetadataModified {
            segmentation_id: segmentation_id.to_string(),
        });
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().push(call);
    }
}

impl AnnotationEngine for InMemoryEngine {
    fn add_segmentation(&self, registration: SegmentationRegistration) {
        self.record(EngineCall::AddSegmentation {
            segmentation_id: registration.segmentation_id.clone(),
        });
        self.state.lock().segmentations.insert(
            registration.segmentation_id.clone(),
            EngineSegmentationState::from_registration(&registration),
        );
    }

    fn remove_segmentation(&self, segmentation_id: &str) {
        self.record(EngineCall::RemoveSegmentation {
            segmentation_id: segmentation_id.to_string(),
        });
        let mut state = self.state.lock();
        state.segmentations.remove(segmentation_id);
        for representations in state.groups.values_mut() {
            representations.retain(|r| r.representation.segmentation_id != segmentation_id);
        }
    }

    fn segmentation_state(&self, segmentation_id: &str) -> Option<EngineSegmentationState> {
        self.state.lock().segmentations.get(segmentation_id).cloned()
    }

    fn add_representation(
        &self,
        group_id: &str,
        segmentation_id: &str,
        kind: RepresentationKind,
        color_lut_index: u32,
    ) -> RepresentationUid {
        self.record(EngineCall::AddRepresentation {
            group_id: group_id.to_string(),
            segmentation_id: segmentation_id.to_string(),
            color_lut_index,
        });
        let uid = RepresentationUid::new(Uuid::new_v4().to_string());
        self.state
            .lock()
            .groups
            .entry(group_id.to_string())
            .or_default()
            .push(RepresentationState {
                representation: Representation {
                    uid: uid.clone(),
                    segmentation_id: segmentation_id.to_string(),
                    kind,
                },
                color_lut_index,
                visible: true,
                colors: BTreeMap::new(),
                hidden_segments: BTreeSet::new(),
            });
        uid
    }

    fn remove_representations(&self, group_id: &str, segmentation_id: &str) {
        self.record(EngineCall::RemoveRepresentations {
            group_id: group_id.to_string(),
            segmentation_id: segmentation_id.to_string(),
        });
        if let Some(representations) = self.state.lock().groups.get_mut(group_id) {
            representations.retain(|r| r.representation.segmentation_id != segmentation_id);
        }
    }

    fn representations(&self, group_id: &str) -> Vec<Representation> {
        self.state
            .lock()
            .groups
            .get(group_id)
            .map(|representations| {
                representations
                    .iter()
                    .map(|state| state.representation.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn add_color_lut(&self, index: u32, color_lut: ColorLut) {
        self.record(EngineCall::AddColorLut { index });
        self.state.lock().color_luts.insert(index, color_lut);
    }

    fn segment_color(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
    ) -> Option<Rgba> {
        let state = self.state.lock();
        let representation = state.representation(group_id, uid)?;
        if let Some(color) = representation.colors.get(&segment_index) {
            return Some(*color);
        }
        match state.color_luts.get(&representation.color_lut_index) {
            Some(lut) => lut.color(usize::from(segment_index)),
            None => ColorLut::default().color(usize::from(segment_index)),
        }
    }

    fn set_segment_color(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        color: Rgba,
    ) {
        self.record(EngineCall::SetSegmentColor {
            group_id: group_id.to_string(),
            segment_index,
            color,
        });
        if let Some(representation) = self.state.lock().representation_mut(group_id, uid) {
            representation.colors.insert(segment_index, color);
        }
    }

    fn segment_visibility(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
    ) -> bool {
        self.state
            .lock()
            .representation(group_id, uid)
            .is_some_and(|r| !r.hidden_segments.contains(&segment_index))
    }

    fn set_segment_visibility(
        &self,
        group_id: &str,
        uid: &RepresentationUid,
        segment_index: SegmentIndex,
        visible: bool,
    ) {
        self.record(EngineCall::SetSegmentVisibility {
            group_id: group_id.to_string(),
            segment_index,
            visible,
        });
        if let Some(representation) = self.state.lock().representation_mut(group_id, uid) {
            if visible {
                representation.hidden_segments.remove(&segment_index);
            } else {
                representation.hidden_segments.insert(segment_index);
            }
        }
    }

    fn set_representation_visibility(&self, group_id: &str, uid: &RepresentationUid, visible: bool) {
        self.record(EngineCall::SetRepresentationVisibility {
            group_id: group_id.to_string(),
            visible,
        });
        if let Some(representation) = self.state.lock().representation_mut(group_id, uid) {
            representation.visible = visible;
        }
    }

    fn segment_locked(&self, segmentation_id: &str, segment_index: SegmentIndex) -> bool {
        self.state
            .lock()
            .segmentations
            .get(segmentation_id)
            .is_some_and(|s| s.segments_locked.contains(&segment_index))
    }

    fn set_segment_locked(&self, segmentation_id: &str, segment_index: SegmentIndex, locked: bool) {
        self.record(EngineCall::SetSegmentLocked {
            segmentation_id: segmentation_id.to_string(),
            segment_index,
            locked,
        });
        if let Some(segmentation) = self.state.lock().segmentations.get_mut(segmentation_id) {
            if locked {
                segmentation.segments_locked.insert(segment_index);
            } else {
                segmentation.segments_locked.remove(&segment_index);
            }
        }
    }

    fn active_segment_index(&self, segmentation_id: &str) -> Option<SegmentIndex> {
        self.state
            .lock()
            .segmentations
            .get(segmentation_id)
            .and_then(|s| s.active_segment_index)
    }

    fn set_active_segment_index(&self, segmentation_id: &str, segment_index: SegmentIndex) {
        self.record(EngineCall::SetActiveSegmentIndex {
            segmentation_id: segmentation_id.to_string(),
            segment_index,
        });
        if let Some(segmentation) = self.state.lock().segmentations.get_mut(segmentation_id) {
            segmentation.active_segment_index = Some(segment_index);
        }
    }

    fn set_active_representation(&self, group_id: &str, uid: &RepresentationUid) {
        self.record(EngineCall::SetActiveRepresentation {
            group_id: group_id.to_string(),
            uid: uid.clone(),
        });
        self.state
            .lock()
            .active_representations
            .insert(group_id.to_string(), uid.clone());
    }

    fn render_settings(&self) -> RenderSettings {
        self.state.lock().render_settings
    }

    fn set_render_settings(&self, settings: RenderSettings) {
        self.record(EngineCall::SetRenderSettings { settings });
        self.state.lock().render_settings = settings;
    }

    fn set_brush_size(&self, group_id: &str, size: f32) {
        self.record(EngineCall::SetBrushSize {
            group_id: group_id.to_string(),
            size,
        });
        self.state
            .lock()
            .brushes
            .entry(group_id.to_string())
            .or_default()
            .size = Some(size);
    }

    fn set_brush_threshold_gate(&self, group_id: &str, gate: Option<ThresholdGate>) {
        self.record(EngineCall::SetBrushThresholdGate {
            group_id: group_id.to_string(),
            gate,
        });
        self.state
            .lock()
            .brushes
            .entry(group_id.to_string())
            .or_default()
            .threshold_gate = gate;
    }

    fn notify_data_modified(&self, segmentation_id: &str, modified_frames: &[usize]) {
        self.record(EngineCall::NotifyDataModified {
            segmentation_id: segmentation_id.to_string(),
            modified_frames: modified_frames.to_vec(),
        });
        self.emit(&EngineNotification::DataModified {
            segmentation_id: segmentation_id.to_string(),
            modified_frames: modified_frames.to_vec(),
        });
    }

    fn subscribe(&self, listener: EngineListener) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst));
        self.listeners.lock().push((id, listener));
        id
    }

    fn unsubscribe(&self, listener: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != listener);
        listeners.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registration(id: &str) -> SegmentationRegistration {
        SegmentationRegistration {
            segmentation_id: id.to_string(),
            label: "Seg".to_string(),
            kind: RepresentationKind::Labelmap,
            volume_id: Some(format!("{id}-volume")),
        }
    }

    #[test]
    fn representations_are_listed_per_group() {
        let engine = InMemoryEngine::new();
        engine.add_segmentation(registration("a"));
        let uid = engine.add_representation("default", "a", RepresentationKind::Labelmap, 0);

        let listed = engine.representations("default");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].uid, uid);
        assert_eq!(listed[0].segmentation_id, "a");
        assert!(engine.representations("other").is_empty());

        engine.remove_representations("default", "a");
        assert!(engine.representations("default").is_empty());
    }

    #[test]
    fn segment_color_falls_back_to_palette() {
        let engine = InMemoryEngine::new();
        let mut lut = ColorLut::default();
        lut.set_color(2, Rgba::new([1, 2, 3], 0.5));
        engine.add_color_lut(4, lut);
        let uid = engine.add_representation("g", "a", RepresentationKind::Labelmap, 4);

        assert_eq!(engine.segment_color("g", &uid, 2), Some(Rgba::new([1, 2, 3], 0.5)));

        engine.set_segment_color("g", &uid, 2, Rgba::opaque([9, 9, 9]));
        assert_eq!(engine.segment_color("g", &uid, 2), Some(Rgba::opaque([9, 9, 9])));

        let unknown = RepresentationUid::new("nope");
        assert_eq!(engine.segment_color("g", &unknown, 2), None);
    }

    #[test]
    fn locks_and_active_follow_segmentation() {
        let engine = InMemoryEngine::new();
        engine.add_segmentation(registration("a"));

        engine.set_segment_locked("a", 3, true);
        engine.set_active_segment_index("a", 3);
        assert!(engine.segment_locked("a", 3));
        assert_eq!(engine.active_segment_index("a"), Some(3));

        engine.set_segment_locked("a", 3, false);
        assert!(!engine.segment_locked("a", 3));
        assert_eq!(engine.calls().len(), 4);
    }

    #[test]
    fn data_modified_reaches_listeners() {
        let engine = InMemoryEngine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = engine.subscribe(Arc::new(move |n: &EngineNotification| {
            sink.lock().push(n.clone());
        }));

        engine.notify_data_modified("a", &[0, 2]);
        assert_eq!(
            seen.lock().as_slice(),
            &[EngineNotification::DataModified {
                segmentation_id: "a".into(),
                modified_frames: vec![0, 2],
            }]
        );

        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));
        engine.emit_metadata_modified("a");
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn listener_may_call_back_into_engine() {
        let engine = Arc::new(InMemoryEngine::new());
        engine.add_segmentation(registration("a"));
        let weak = Arc::downgrade(&engine);
        engine.subscribe(Arc::new(move |n: &EngineNotification| {
            if let Some(engine) = weak.upgrade() {
                let _ = engine.segmentation_state(n.segmentation_id());
            }
        }));
        engine.emit_metadata_modified("a");
    }

    #[test]
    fn edit_segmentation_requires_registration() {
        let engine = InMemoryEngine::new();
        assert!(!engine.edit_segmentation("a", |s| s.label = "x".into()));
        engine.add_segmentation(registration("a"));
        assert!(engine.edit_segmentation("a", |s| s.label = "x".into()));
        assert_eq!(engine.segmentation_state("a").map(|s| s.label), Some("x".into()));
    }
}
