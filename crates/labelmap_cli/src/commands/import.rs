//! Import command implementation.

use super::descriptor::Descriptor;
use labelmap_core::{
    Config, EventKind, InMemoryEngine, InMemoryViewportGroups, SegmentationEvent,
    SegmentationManager,
};
use labelmap_volume::{InMemoryVolumeStore, VolumeStore};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const GROUP_ID: &str = "cli";

/// Summary of one imported segment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSummary {
    /// Segment index.
    pub segment_index: u16,
    /// Segment label.
    pub label: String,
    /// Display color.
    pub color: [u8; 3],
    /// Voxels holding the index.
    pub voxel_count: usize,
}

/// Import result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    /// Segmentation identifier.
    pub segmentation_id: String,
    /// Labelmap volume identifier.
    pub volume_id: Option<String>,
    /// Active segment after all removals.
    pub active_segment_index: Option<u16>,
    /// Remaining segments.
    pub segments: Vec<SegmentSummary>,
    /// Events published, in order.
    pub events: Vec<String>,
}

/// Runs the import command.
pub async fn run(
    path: &Path,
    remove: &[u16],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let descriptor = Descriptor::load(path)?;
    let report = import(&descriptor, remove).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

/// Imports a descriptor into a fresh in-memory manager, then removes the
/// requested segments.
pub async fn import(
    descriptor: &Descriptor,
    remove: &[u16],
) -> Result<ImportReport, Box<dyn std::error::Error>> {
    let mut config = Config::default().voxel_format(descriptor.voxel_format());
    if let Some(tolerance) = descriptor.tolerance {
        config = config.alignment_tolerance(tolerance);
    }

    let volumes = Arc::new(InMemoryVolumeStore::new());
    volumes.insert(descriptor.reference.to_volume());
    let manager = SegmentationManager::with_volume_store(
        config,
        Arc::new(InMemoryEngine::new()),
        Arc::new(InMemoryViewportGroups::with_group(GROUP_ID, &["main"])),
        volumes.clone(),
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = Arc::clone(&events);
        manager.subscribe(kind, move |event: &SegmentationEvent| {
            sink.lock().push(event.kind().to_string());
        });
    }

    let segmentation_id = descriptor.segmentation_id.as_str();
    manager
        .create_from_discrete_segments(
            &descriptor.reference.id,
            descriptor.segments.clone(),
            segmentation_id,
        )
        .await?;
    manager.add_representation_to_group(GROUP_ID, segmentation_id)?;

    for &segment_index in remove {
        if manager
            .mutator()
            .remove_segment(segmentation_id, segment_index)?
            .is_none()
        {
            info!(segment_index, "segment not present; skipped");
        }
    }

    let record = manager
        .segmentation(segmentation_id)
        .ok_or("Segmentation disappeared after import")?;
    let counts = match record.volume_id.as_deref().and_then(|id| volumes.get_volume(id)) {
        Some(volume) => count_labels(&volume.scalar_data().to_vec()),
        None => BTreeMap::new(),
    };

    let segments = record
        .segments()
        .values()
        .map(|segment| SegmentSummary {
            segment_index: segment.segment_index,
            label: segment.label.clone(),
            color: segment.color,
            voxel_count: counts.get(&segment.segment_index).copied().unwrap_or(0),
        })
        .collect();
    let events = events.lock().clone();

    Ok(ImportReport {
        segmentation_id: record.id.clone(),
        volume_id: record.volume_id.clone(),
        active_segment_index: record.active_segment_index(),
        segments,
        events,
    })
}

fn count_labels(voxels: &[u16]) -> BTreeMap<u16, usize> {
    let mut counts = BTreeMap::new();
    for &voxel in voxels.iter().filter(|v| **v != 0) {
        *counts.entry(voxel).or_insert(0) += 1;
    }
    counts
}

fn print_text_output(report: &ImportReport) {
    println!("Segmentation: {}", report.segmentation_id);
    if let Some(volume_id) = &report.volume_id {
        println!("Labelmap:     {volume_id}");
    }
    match report.active_segment_index {
        Some(index) => println!("Active:       {index}"),
        None => println!("Active:       (none)"),
    }
    println!();
    println!("Segments ({}):", report.segments.len());
    for segment in &report.segments {
        let [r, g, b] = segment.color;
        println!(
            "  {:>3} {:<20} #{r:02x}{g:02x}{b:02x} {:>8} voxels",
            segment.segment_index, segment.label, segment.voxel_count
        );
    }
    println!();
    println!("Events:");
    for event in &report.events {
        println!("  {event}");
    }
}
