use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("No channel token in filename: {filename}")]
    MissingChannelToken { filename: String },

    #[error("Inconsistent coordinate grouping: {0}")]
    InconsistentGrouping(String),

    #[error(
        "Channel {channel} has shape {shape:?}, expected {expected_shape:?} (from channel {reference})"
    )]
    ChannelShapeMismatch {
        reference: String,
        expected_shape: Vec<usize>,
        channel: String,
        shape: Vec<usize>,
    },

    #[error("Ambiguous acquisition classification: {0}")]
    AmbiguousClassification(String),

    #[error("Plane file not found: {}", path.display())]
    PlaneNotFound { path: PathBuf },

    #[error("Plane file unreadable: {}: {reason}", path.display())]
    PlaneUnreadable { path: PathBuf, reason: String },

    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(String),

    #[error("Pixel type mismatch in {}: expected {expected}, found {found}", path.display())]
    PixelTypeMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Empty plane sequence")]
    EmptySequence,

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScopeError {
    /// Whether this error only invalidates the acquisition folder being
    /// converted. Folder-scoped errors become "failed" run-log entries;
    /// everything else aborts the run.
    pub fn is_folder_scoped(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::Internal(_) | Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, ScopeError>;
