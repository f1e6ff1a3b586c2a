pub mod batch;
mod channels;
pub mod config;
pub mod folder;
pub mod runlog;
mod types;

pub use batch::{archive_folders, discover_folders, run_batch, run_folders};
pub use folder::{output_path, process_folder, FolderContext};
pub use runlog::RunLog;
pub use types::{
    CancelToken, FolderOutcome, FolderSummary, NoOpReporter, PipelineStage, ProgressReporter,
};
