//! Segmentation descriptor files.

use labelmap_core::DiscreteSegment;
use labelmap_volume::{Volume, VolumeGeometry, VoxelFormat};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Reference volume named by a descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceVolume {
    /// Volume identifier.
    pub id: String,
    /// Voxel counts along x, y and z.
    pub dimensions: [usize; 3],
    /// Position of the first voxel.
    #[serde(default)]
    pub origin: [f64; 3],
    /// Voxel spacing.
    pub spacing: [f64; 3],
}

impl ReferenceVolume {
    /// Returns the reference geometry.
    pub fn geometry(&self) -> VolumeGeometry {
        VolumeGeometry::new(self.dimensions, self.origin, self.spacing)
    }

    /// Creates an empty volume with the reference geometry.
    pub fn to_volume(&self) -> Volume {
        Volume::zeroed(self.id.clone(), self.geometry())
    }
}

/// A segmentation to import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Identifier of the segmentation to create.
    pub segmentation_id: String,
    /// Reference volume the segments are aligned to.
    pub reference: ReferenceVolume,
    /// Store labels as 16-bit values.
    #[serde(default)]
    pub wide_labels: bool,
    /// Alignment tolerance override.
    #[serde(default)]
    pub tolerance: Option<f64>,
    /// Segments in write order.
    pub segments: Vec<DiscreteSegment>,
}

impl Descriptor {
    /// Reads a descriptor from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let file = File::open(path)
            .map_err(|e| format!("Cannot open descriptor {}: {e}", path.display()))?;
        let descriptor: Descriptor = serde_json::from_reader(BufReader::new(file))?;
        Ok(descriptor)
    }

    /// Label width requested by the descriptor.
    pub fn voxel_format(&self) -> VoxelFormat {
        if self.wide_labels {
            VoxelFormat::U16
        } else {
            VoxelFormat::U8
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Two segments on a 2x2x4 grid with 2mm slices; segment 2 starts on
    /// slice 2.
    pub(crate) const SAMPLE: &str = r#"{
        "segmentationId": "seg",
        "reference": {
            "id": "ct",
            "dimensions": [2, 2, 4],
            "origin": [0.0, 0.0, 0.0],
            "spacing": [1.0, 1.0, 2.0]
        },
        "segments": [
            {
                "segmentIndex": 1,
                "label": "Liver",
                "frameCount": 2,
                "firstPosition": [0.0, 0.0, 0.0],
                "pixelData": [1, 1, 0, 0, 1, 1, 0, 0]
            },
            {
                "segmentIndex": 2,
                "label": "Kidney",
                "color": [0, 200, 0],
                "frameCount": 1,
                "firstPosition": [0.0, 0.0, 4.0],
                "pixelData": [1, 1, 1, 1]
            }
        ]
    }"#;

    pub(crate) fn write_descriptor(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_sample_descriptor() {
        let file = write_descriptor(SAMPLE);
        let descriptor = Descriptor::load(file.path()).unwrap();

        assert_eq!(descriptor.segmentation_id, "seg");
        assert_eq!(descriptor.reference.geometry().frame_len(), 4);
        assert_eq!(descriptor.segments.len(), 2);
        assert_eq!(descriptor.segments[1].color, Some([0, 200, 0]));
        assert_eq!(descriptor.voxel_format(), VoxelFormat::U8);
        assert!(descriptor.tolerance.is_none());
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Descriptor::load(&dir.path().join("absent.json"));
        assert!(result.is_err());
    }

    #[test]
    fn load_malformed_json_fails() {
        let file = write_descriptor("{ \"segmentationId\": 3 }");
        assert!(Descriptor::load(file.path()).is_err());
    }
}
