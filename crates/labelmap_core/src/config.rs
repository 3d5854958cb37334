//! Manager configuration and render configuration.

use labelmap_volume::VoxelFormat;
use serde::{Deserialize, Serialize};

/// Configuration for a segmentation manager.
#[derive(Debug, Clone)]
pub struct Config {
    /// Label given to segmentations created without one.
    pub default_label: String,

    /// Prefix for labels of segments added without one ("Segment 3").
    pub segment_label_prefix: String,

    /// Maximum distance from an integer slice position accepted on import.
    pub alignment_tolerance: f64,

    /// Label width of derived labelmap buffers.
    pub voxel_format: VoxelFormat,

    /// Number of inbound sync diagnostics retained.
    pub diagnostics_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_label: "Segmentation".to_string(),
            segment_label_prefix: "Segment".to_string(),
            alignment_tolerance: 1e-4,
            voxel_format: VoxelFormat::U8,
            diagnostics_capacity: 256,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default segmentation label.
    #[must_use]
    pub fn default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = label.into();
        self
    }

    /// Sets the prefix for generated segment labels.
    #[must_use]
    pub fn segment_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.segment_label_prefix = prefix.into();
        self
    }

    /// Sets the slice alignment tolerance.
    #[must_use]
    pub const fn alignment_tolerance(mut self, tolerance: f64) -> Self {
        self.alignment_tolerance = tolerance;
        self
    }

    /// Sets the voxel format of derived buffers.
    #[must_use]
    pub const fn voxel_format(mut self, format: VoxelFormat) -> Self {
        self.voxel_format = format;
        self
    }

    /// Sets how many sync diagnostics are retained.
    #[must_use]
    pub const fn diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }
}

/// Intensity range a brush stroke is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdGate {
    /// Lowest accepted intensity.
    pub lower: f64,
    /// Highest accepted intensity.
    pub upper: f64,
}

/// Global render settings owned by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderSettings {
    /// Draw segment outlines.
    pub render_outline: bool,
    /// Outline width of the active segmentation.
    pub outline_width_active: f32,
    /// Fill segment interiors.
    pub render_fill: bool,
    /// Fill opacity of the active segmentation.
    pub fill_alpha: f32,
    /// Fill opacity of inactive segmentations.
    pub fill_alpha_inactive: f32,
    /// Draw segmentations that are not active.
    pub render_inactive_segmentations: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            render_outline: true,
            outline_width_active: 3.0,
            render_fill: true,
            fill_alpha: 0.5,
            fill_alpha_inactive: 0.4,
            render_inactive_segmentations: true,
        }
    }
}

/// The full set of recognised segmentation configuration options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfiguration {
    /// Draw segment outlines.
    pub render_outline: bool,
    /// Outline width of the active segmentation.
    pub outline_width_active: f32,
    /// Fill segment interiors.
    pub render_fill: bool,
    /// Fill opacity of the active segmentation.
    pub fill_alpha: f32,
    /// Fill opacity of inactive segmentations.
    pub fill_alpha_inactive: f32,
    /// Draw segmentations that are not active.
    pub render_inactive_segmentations: bool,
    /// Brush radius applied to every viewport group.
    pub brush_size: f32,
    /// Optional intensity gate for brush strokes.
    pub brush_threshold_gate: Option<ThresholdGate>,
}

impl Default for RenderConfiguration {
    fn default() -> Self {
        Self::from_parts(RenderSettings::default(), 25.0, None)
    }
}

impl RenderConfiguration {
    /// Assembles a configuration from engine settings and brush options.
    #[must_use]
    pub const fn from_parts(
        settings: RenderSettings,
        brush_size: f32,
        brush_threshold_gate: Option<ThresholdGate>,
    ) -> Self {
        Self {
            render_outline: settings.render_outline,
            outline_width_active: settings.outline_width_active,
            render_fill: settings.render_fill,
            fill_alpha: settings.fill_alpha,
            fill_alpha_inactive: settings.fill_alpha_inactive,
            render_inactive_segmentations: settings.render_inactive_segmentations,
            brush_size,
            brush_threshold_gate,
        }
    }

    /// Returns the part of the configuration the engine renders with.
    #[must_use]
    pub const fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            render_outline: self.render_outline,
            outline_width_active: self.outline_width_active,
            render_fill: self.render_fill,
            fill_alpha: self.fill_alpha,
            fill_alpha_inactive: self.fill_alpha_inactive,
            render_inactive_segmentations: self.render_inactive_segmentations,
        }
    }

    /// Applies every field present in `update`.
    pub fn merge(&mut self, update: &RenderConfigurationUpdate) {
        if let Some(v) = update.render_outline {
            self.render_outline = v;
        }
        if let Some(v) = update.outline_width_active {
            self.outline_width_active = v;
        }
        if let Some(v) = update.render_fill {
            self.render_fill = v;
        }
        if let Some(v) = update.fill_alpha {
            self.fill_alpha = v;
        }
        if let Some(v) = update.fill_alpha_inactive {
            self.fill_alpha_inactive = v;
        }
        if let Some(v) = update.render_inactive_segmentations {
            self.render_inactive_segmentations = v;
        }
        if let Some(v) = update.brush_size {
            self.brush_size = v;
        }
        if let Some(gate) = update.brush_threshold_gate {
            self.brush_threshold_gate = gate;
        }
    }
}

/// A partial configuration change; absent fields keep their value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfigurationUpdate {
    /// New outline flag.
    pub render_outline: Option<bool>,
    /// New active outline width.
    pub outline_width_active: Option<f32>,
    /// New fill flag.
    pub render_fill: Option<bool>,
    /// New active fill opacity.
    pub fill_alpha: Option<f32>,
    /// New inactive fill opacity.
    pub fill_alpha_inactive: Option<f32>,
    /// New inactive rendering flag.
    pub render_inactive_segmentations: Option<bool>,
    /// New brush size.
    pub brush_size: Option<f32>,
    /// New brush gate; `Some(None)` clears it.
    pub brush_threshold_gate: Option<Option<ThresholdGate>>,
}

impl RenderConfigurationUpdate {
    /// Returns true if any brush option is present.
    #[must_use]
    pub const fn touches_brush(&self) -> bool {
        self.brush_size.is_some() || self.brush_threshold_gate.is_some()
    }

    /// Returns true if any engine render option is present.
    #[must_use]
    pub const fn touches_render(&self) -> bool {
        self.render_outline.is_some()
            || self.outline_width_active.is_some()
            || self.render_fill.is_some()
            || self.fill_alpha.is_some()
            || self.fill_alpha_inactive.is_some()
            || self.render_inactive_segmentations.is_some()
    }
}
