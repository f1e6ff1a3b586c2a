//! Per-run metadata table, one row per converted folder that yielded
//! acquisition metadata.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Result;
use scopestack_core::io::metadata::AcquisitionMetadata;
use scopestack_core::pipeline::FolderSummary;
use tracing::warn;

const FIXED_COLUMNS: [&str; 4] = [
    "Folder Name",
    "X microns per pixel",
    "Z microns per pixel",
    "Frame Rate",
];

/// Append rows for `summaries` to the CSV at `path`.
///
/// A new file gets a header of the fixed columns followed by every
/// passthrough column seen in this run. An existing file keeps its header;
/// values for columns it lacks are dropped with a warning.
pub fn append_metadata_csv(path: &Path, summaries: &[FolderSummary]) -> Result<()> {
    let rows: Vec<(&str, &AcquisitionMetadata)> = summaries
        .iter()
        .filter_map(|s| s.metadata.as_ref().map(|md| (s.folder.as_str(), md)))
        .collect();
    if rows.is_empty() {
        return Ok(());
    }

    let existing = path.exists();
    let header: Vec<String> = if existing {
        let mut reader = csv::Reader::from_path(path)?;
        reader.headers()?.iter().map(str::to_string).collect()
    } else {
        let mut header: Vec<String> = FIXED_COLUMNS.iter().map(|c| c.to_string()).collect();
        for (_, md) in &rows {
            for (column, _) in &md.passthrough {
                if !header.contains(column) {
                    header.push(column.clone());
                }
            }
        }
        header
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if !existing {
        writer.write_record(&header)?;
    }

    for (folder, md) in rows {
        for (column, _) in &md.passthrough {
            if !header.contains(column) {
                warn!(folder, column = %column, "Metadata column not in existing CSV header, dropped");
            }
        }
        let record: Vec<String> = header
            .iter()
            .map(|column| cell(folder, md, column))
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn cell(folder: &str, md: &AcquisitionMetadata, column: &str) -> String {
    let number = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    match column {
        "Folder Name" => folder.to_string(),
        "X microns per pixel" => number(md.x_microns_per_pixel),
        "Z microns per pixel" => number(md.z_microns_per_pixel),
        "Frame Rate" => number(md.framerate),
        other => md
            .passthrough
            .iter()
            .find(|(k, _)| k == other)
            .map(|(_, v)| v.clone())
            .unwrap_or_default(),
    }
}
