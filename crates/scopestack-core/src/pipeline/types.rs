use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::assemble::AxisOrder;
use crate::classify::AcquisitionType;
use crate::coords::Instrument;
use crate::error::{Result, ScopeError};
use crate::io::metadata::AcquisitionMetadata;
use crate::organize::ChannelId;
use crate::plane::PixelType;
use crate::stack::projection::Projection;

/// Folder processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Classifying,
    Loading,
    Merging,
    Assembling,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifying => write!(f, "Classifying"),
            Self::Loading => write!(f, "Loading planes"),
            Self::Merging => write!(f, "Merging illumination sides"),
            Self::Assembling => write!(f, "Assembling hyperstack"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// What became of one acquisition folder.
#[derive(Clone, Debug)]
pub enum FolderOutcome {
    Processed(Box<FolderSummary>),
    /// Output file was already there; nothing was read or written.
    AlreadyExists { output: PathBuf },
}

/// Facts about a converted folder.
#[derive(Clone, Debug)]
pub struct FolderSummary {
    pub folder: String,
    pub instrument: Instrument,
    pub acquisition: AcquisitionType,
    pub projection: Projection,
    pub axes: AxisOrder,
    pub shape: Vec<usize>,
    pub pixel_type: PixelType,
    pub channels: Vec<ChannelId>,
    /// Illumination-merger invocations (Flamingo only).
    pub illumination_merges: usize,
    /// Files dropped by channel truncation or incomplete trailing timepoints.
    pub dropped_files: usize,
    pub output: PathBuf,
    pub metadata: Option<AcquisitionMetadata>,
}

/// Thread-safe progress reporting for a conversion run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A run over `folders` acquisition folders has started.
    fn begin_run(&self, _folders: usize) {}

    fn begin_folder(&self, _name: &str) {}

    /// A stage within the current folder has started. `total_items` is the
    /// number of work items in this stage (e.g. channel count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The folder is done. `outcome` is `Err` with the failure text when the
    /// folder failed.
    fn finish_folder(&self, _name: &str, _outcome: std::result::Result<&FolderOutcome, &str>) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// Cooperative cancellation flag, checked between folders and between
/// channel groups.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ScopeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
