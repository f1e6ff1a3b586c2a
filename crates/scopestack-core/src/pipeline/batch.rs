use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, warn};

use crate::consts::{ARCHIVE_DIR_NAME, BOOKKEEPING_PREFIX};
use crate::error::{Result, ScopeError};
use crate::io::imagej::HyperstackSink;
use crate::pipeline::config::ConversionConfig;
use crate::pipeline::folder::{process_folder, FolderContext};
use crate::pipeline::runlog::RunLog;
use crate::pipeline::types::{CancelToken, FolderOutcome, FolderSummary, ProgressReporter};

/// Acquisition folders directly under `root`, sorted by name.
///
/// Bookkeeping directories (names starting with `!`) are skipped.
pub fn discover_folders(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ScopeError::MissingInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }
    let mut folders: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|e| {
            !e.file_name()
                .to_string_lossy()
                .starts_with(BOOKKEEPING_PREFIX)
        })
        .map(|e| e.path())
        .collect();
    folders.sort();
    Ok(folders)
}

/// Convert every acquisition folder under `root`.
pub fn run_batch(
    root: &Path,
    config: &ConversionConfig,
    sink: &dyn HyperstackSink,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
    log: &mut RunLog,
) -> Result<Vec<FolderSummary>> {
    let folders = discover_folders(root)?;
    run_folders(root, &folders, config, sink, reporter, cancel, log)
}

/// Convert `folders` one after another, writing into the output directory
/// under `root`.
///
/// Folder-scoped failures become run-log entries and the run continues.
/// Cancellation and programmer errors end the run; `log` keeps everything
/// recorded up to that point.
pub fn run_folders(
    root: &Path,
    folders: &[PathBuf],
    config: &ConversionConfig,
    sink: &dyn HyperstackSink,
    reporter: &dyn ProgressReporter,
    cancel: &CancelToken,
    log: &mut RunLog,
) -> Result<Vec<FolderSummary>> {
    config.validate()?;
    let start = Instant::now();
    let output_dir = root.join(&config.output_dir_name);
    fs::create_dir_all(&output_dir)?;

    let ctx = FolderContext {
        config,
        output_dir: &output_dir,
        sink,
        reporter,
        cancel,
    };

    info!(root = %root.display(), folders = folders.len(), "Starting conversion run");
    reporter.begin_run(folders.len());

    let mut summaries = Vec::new();
    for folder in folders {
        cancel.check()?;
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());
        reporter.begin_folder(&name);

        match process_folder(folder, &ctx, log) {
            Ok(outcome) => {
                log.record(&name, &outcome);
                reporter.finish_folder(&name, Ok(&outcome));
                if let FolderOutcome::Processed(summary) = outcome {
                    summaries.push(*summary);
                }
            }
            Err(e) if e.is_folder_scoped() => {
                warn!(folder = %name, error = %e, "Folder not processed");
                let reason = e.to_string();
                log.record_failure(&name, reason.as_str());
                reporter.finish_folder(&name, Err(reason.as_str()));
            }
            Err(e) => return Err(e),
        }
    }

    log.finish(start.elapsed());
    info!(
        processed = log.processed().len(),
        skipped = log.already_exists().len(),
        failed = log.failed().len(),
        "Conversion run finished"
    );
    Ok(summaries)
}

/// Move converted source folders into the archive directory under `root`.
///
/// Returns the new locations. A folder whose archive target already exists,
/// or that fails to move, is left in place and reported in `log`.
pub fn archive_folders(root: &Path, names: &[String], log: &mut RunLog) -> Result<Vec<PathBuf>> {
    let archive = root.join(ARCHIVE_DIR_NAME);
    fs::create_dir_all(&archive)?;
    let mut moved = Vec::with_capacity(names.len());
    for name in names {
        let from = root.join(name);
        let to = archive.join(name);
        if to.exists() {
            warn!(folder = %name, "Archive target exists, leaving folder in place");
            log.issue(format!("{name}: not archived, {} already exists", to.display()));
            continue;
        }
        if let Err(e) = fs::rename(&from, &to) {
            warn!(folder = %name, error = %e, "Failed to archive folder");
            log.issue(format!("{name}: not archived, {e}"));
            continue;
        }
        moved.push(to);
    }
    Ok(moved)
}
