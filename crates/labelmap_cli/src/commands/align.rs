//! Align command implementation.

use super::descriptor::Descriptor;
use labelmap_core::{align_first_slice, Config};
use serde::Serialize;
use std::path::Path;

/// Where one segment lands in the reference volume.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentAlignment {
    /// Segment index.
    pub segment_index: u16,
    /// Segment label.
    pub label: String,
    /// Fractional slice the first frame falls on.
    pub estimated_slice: f64,
    /// Destination frame, if aligned.
    pub frame_offset: Option<usize>,
    /// Frames past the end of the reference volume.
    pub clipped_frames: usize,
}

/// Alignment report for a descriptor.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignReport {
    /// Reference volume identifier.
    pub reference: String,
    /// Tolerance applied.
    pub tolerance: f64,
    /// Per-segment results, in descriptor order.
    pub segments: Vec<SegmentAlignment>,
}

impl AlignReport {
    /// Returns true if every segment is aligned.
    pub fn all_aligned(&self) -> bool {
        self.segments.iter().all(|s| s.frame_offset.is_some())
    }
}

/// Runs the align command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = Descriptor::load(path)?;
    let report = align(&descriptor);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    if report.all_aligned() {
        Ok(())
    } else {
        Err("One or more segments are not on a reference slice".into())
    }
}

/// Computes the alignment of every segment in a descriptor.
pub fn align(descriptor: &Descriptor) -> AlignReport {
    let geometry = descriptor.reference.geometry();
    let tolerance = descriptor
        .tolerance
        .unwrap_or(Config::default().alignment_tolerance);

    let segments = descriptor
        .segments
        .iter()
        .map(|segment| {
            let alignment = align_first_slice(&geometry, segment.first_position, tolerance);
            let clipped_frames = alignment.frame_offset.map_or(0, |offset| {
                let in_volume = geometry.num_frames().saturating_sub(offset);
                segment.frame_count.saturating_sub(in_volume)
            });
            SegmentAlignment {
                segment_index: segment.segment_index,
                label: segment.label.clone(),
                estimated_slice: alignment.estimated_slice,
                frame_offset: alignment.frame_offset,
                clipped_frames,
            }
        })
        .collect();

    AlignReport {
        reference: descriptor.reference.id.clone(),
        tolerance,
        segments,
    }
}

fn print_text_output(report: &AlignReport) {
    println!("Reference: {}", report.reference);
    println!("Tolerance: {}", report.tolerance);
    println!();
    for segment in &report.segments {
        match segment.frame_offset {
            Some(offset) if segment.clipped_frames > 0 => println!(
                "  {:>3} {:<20} slice {:>8.4} -> frame {offset} ({} frames clipped)",
                segment.segment_index, segment.label, segment.estimated_slice, segment.clipped_frames
            ),
            Some(offset) => println!(
                "  {:>3} {:<20} slice {:>8.4} -> frame {offset}",
                segment.segment_index, segment.label, segment.estimated_slice
            ),
            None => println!(
                "  {:>3} {:<20} slice {:>8.4} -> MISALIGNED",
                segment.segment_index, segment.label, segment.estimated_slice
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::descriptor::tests::{write_descriptor, SAMPLE};

    #[test]
    fn sample_segments_are_aligned() {
        let file = write_descriptor(SAMPLE);
        let descriptor = Descriptor::load(file.path()).unwrap();

        let report = align(&descriptor);

        assert!(report.all_aligned());
        assert_eq!(report.segments[0].frame_offset, Some(0));
        assert_eq!(report.segments[1].frame_offset, Some(2));
        assert_eq!(report.segments[1].clipped_frames, 0);
    }

    #[test]
    fn off_slice_segment_is_reported() {
        let file = write_descriptor(SAMPLE);
        let mut descriptor = Descriptor::load(file.path()).unwrap();
        descriptor.segments[1].first_position = [0.0, 0.0, 5.0];

        let report = align(&descriptor);

        assert!(!report.all_aligned());
        assert_eq!(report.segments[1].frame_offset, None);
        assert!((report.segments[1].estimated_slice - 2.5).abs() < 1e-9);
    }

    #[test]
    fn overhanging_segment_counts_clipped_frames() {
        let file = write_descriptor(SAMPLE);
        let mut descriptor = Descriptor::load(file.path()).unwrap();
        descriptor.segments[0].first_position = [0.0, 0.0, 6.0];

        let report = align(&descriptor);

        assert_eq!(report.segments[0].frame_offset, Some(3));
        assert_eq!(report.segments[0].clipped_frames, 1);
    }

    #[test]
    fn distant_segment_clips_all_frames() {
        let file = write_descriptor(SAMPLE);
        let mut descriptor = Descriptor::load(file.path()).unwrap();
        descriptor.segments[0].first_position = [0.0, 0.0, 1e20];

        let report = align(&descriptor);

        assert!(report.segments[0].frame_offset.is_some());
        assert_eq!(report.segments[0].clipped_frames, 2);
    }

    #[test]
    fn run_fails_on_misalignment() {
        let json = SAMPLE.replace("[0.0, 0.0, 4.0]", "[0.0, 0.0, 4.5]");
        let file = write_descriptor(&json);
        assert!(run(file.path(), "json").is_err());
    }
}
