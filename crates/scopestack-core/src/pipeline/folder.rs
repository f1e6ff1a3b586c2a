use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::assemble::{assemble, AnyHyperstack};
use crate::classify::{classify, ClassifyRequest, FolderListing};
use crate::coords::FilenameGrammar;
use crate::error::{Result, ScopeError};
use crate::io::imagej::HyperstackSink;
use crate::io::metadata::{metadata_source, AcquisitionMetadata};
use crate::io::plane_io::probe_plane;
use crate::organize::{extract_sources, resolve_channel_order, ChannelGroups};
use crate::pipeline::channels::{build_illumination_merged, build_plane_series, BuildPlan};
use crate::pipeline::config::ConversionConfig;
use crate::pipeline::runlog::RunLog;
use crate::pipeline::types::{
    CancelToken, FolderOutcome, FolderSummary, PipelineStage, ProgressReporter,
};
use crate::plane::{Pixel, PixelType};

/// Shared, read-only state for converting folders of one run.
pub struct FolderContext<'a> {
    pub config: &'a ConversionConfig,
    pub output_dir: &'a Path,
    pub sink: &'a dyn HyperstackSink,
    pub reporter: &'a dyn ProgressReporter,
    pub cancel: &'a CancelToken,
}

/// Sorted names of the regular files in `folder`.
///
/// Entries that cannot be read and names that are not UTF-8 are skipped
/// with a warning.
pub fn list_files(folder: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(folder)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        match entry.file_type() {
            Ok(t) if t.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping entry of unknown type");
                continue;
            }
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(folder = %folder.display(), name = ?raw, "Skipping file with non-UTF-8 name"),
        }
    }
    names.sort();
    Ok(names)
}

fn folder_name(folder: &Path) -> Result<String> {
    folder
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ScopeError::MissingInput(format!("bad folder path {}", folder.display())))
}

/// Output file for a folder: `{prefix}{stem}_raw.tif`.
pub fn output_path(output_dir: &Path, prefix: &str, stem: &str) -> PathBuf {
    output_dir.join(format!("{prefix}{stem}_raw.tif"))
}

fn already_exists(name: &str, output: PathBuf) -> FolderOutcome {
    info!(folder = %name, output = %output.display(), "Output already exists, skipping");
    FolderOutcome::AlreadyExists { output }
}

/// Convert one acquisition folder into one hyperstack file.
///
/// Notes and non-fatal metadata issues are appended to `log`; the folder's
/// own outcome is recorded by the caller.
pub fn process_folder(
    folder: &Path,
    ctx: &FolderContext<'_>,
    log: &mut RunLog,
) -> Result<FolderOutcome> {
    let config = ctx.config;
    let name = folder_name(folder)?;
    let names = list_files(folder)?;

    ctx.reporter.begin_stage(PipelineStage::Classifying, None);
    let instrument = config.instrument.resolve(&name, &names)?;
    let stem = instrument.output_stem(&name);

    // Requested prefix only: single-plane data falls back to no prefix,
    // which is only known after classification.
    let requested = output_path(ctx.output_dir, config.projection.output_prefix(), &stem);
    if requested.exists() {
        return Ok(already_exists(&name, requested));
    }

    let grammar = FilenameGrammar::new(instrument)?;
    let mut sources = extract_sources(&grammar, folder, &names)?;
    if sources.is_empty() {
        return Err(ScopeError::MissingInput(format!(
            "no {instrument} image files in {name}"
        )));
    }
    sources.sort_by(|a, b| a.name.cmp(&b.name));

    let info = probe_plane(&sources[0].path)?;
    let classification = classify(
        &FolderListing {
            instrument,
            sources: &sources,
            planes_per_file: info.depth,
        },
        ClassifyRequest {
            projection: config.projection,
            single_plane: config.single_plane,
        },
    )?;
    info!(
        folder = %name,
        %instrument,
        acquisition = %classification.acquisition,
        projection = %classification.projection,
        pixel_type = %info.pixel_type,
        "Classified folder"
    );

    let output = output_path(
        ctx.output_dir,
        classification.projection.output_prefix(),
        &stem,
    );
    if output.exists() {
        return Ok(already_exists(&name, output));
    }

    let metadata = if config.extract_metadata {
        match metadata_source(instrument)?.extract(folder)? {
            Some(report) => {
                for issue in report.issues {
                    log.issue(format!("{name}: {issue}"));
                }
                Some(report.metadata)
            }
            None => None,
        }
    } else {
        log.note(format!("Skipping metadata extraction {name}."));
        None
    };

    let mut groups = ChannelGroups::organize(sources)?;
    // Light-sheet stacks are completed per timepoint by the side merger.
    let truncated = if instrument.stores_stacks() {
        0
    } else {
        groups.truncate_to_shortest()
    };
    if truncated > 0 {
        log.note(format!(
            "{name}: truncated {truncated} file(s) to equalise channel lengths"
        ));
    }
    let order = resolve_channel_order(&groups, config.channel_order.as_deref())?;
    debug!(folder = %name, channels = ?order, files = ?groups.files_per_channel(), "Organised channels");

    let plan = BuildPlan {
        acquisition: classification.acquisition,
        projection: classification.projection,
        order: &order,
        cancel: ctx.cancel,
        reporter: ctx.reporter,
    };
    let (hyperstack, merges, dropped) = match info.pixel_type {
        PixelType::U8 => build::<u8>(&groups, &grammar, &plan)?,
        PixelType::U16 => build::<u16>(&groups, &grammar, &plan)?,
    };

    if dropped > 0 {
        log.note(format!(
            "{name}: dropped {dropped} file(s) of an incomplete trailing timepoint"
        ));
    }

    let metadata: Option<AcquisitionMetadata> = if classification.acquisition.is_multi_plane() {
        metadata
    } else {
        metadata.map(|md| md.per_frame(hyperstack.axis_len('T')))
    };

    ctx.cancel.check()?;
    ctx.reporter.begin_stage(PipelineStage::Writing, None);
    if let Err(e) = ctx
        .sink
        .write(&hyperstack, metadata.as_ref(), &config.luts, &output)
    {
        // A partial file would make the next run skip this folder.
        let _ = fs::remove_file(&output);
        return Err(e);
    }

    Ok(FolderOutcome::Processed(Box::new(FolderSummary {
        folder: name,
        instrument,
        acquisition: classification.acquisition,
        projection: classification.projection,
        axes: hyperstack.axes(),
        shape: hyperstack.shape().to_vec(),
        pixel_type: hyperstack.pixel_type(),
        channels: hyperstack.channels().to_vec(),
        illumination_merges: merges,
        dropped_files: truncated + dropped,
        output,
        metadata,
    })))
}

fn build<P: Pixel>(
    groups: &ChannelGroups,
    grammar: &FilenameGrammar,
    plan: &BuildPlan<'_>,
) -> Result<(AnyHyperstack, usize, usize)>
where
    AnyHyperstack: From<crate::assemble::Hyperstack<P>>,
{
    let built = if grammar.instrument().stores_stacks() {
        build_illumination_merged::<P>(groups, grammar, plan)?
    } else {
        build_plane_series::<P>(groups, plan)?
    };
    plan.reporter.begin_stage(PipelineStage::Assembling, None);
    let hyperstack = assemble(built.channels, plan.acquisition, plan.projection)?;
    Ok((
        hyperstack.into(),
        built.illumination_merges,
        built.dropped_files,
    ))
}
