use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CullError {
    #[error("Malformed filename {file}: {reason}")]
    MalformedFilename { file: String, reason: String },

    #[error("Unreadable image {}: {source}", path.display())]
    UnreadableImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Frames differ in size: {left:?} vs {right:?}")]
    FrameMismatch { left: (u32, u32), right: (u32, u32) },

    #[error("Failed to rename {from} -> {to}: {reason}")]
    RenameFailure {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Failed to resize {}: {reason}", path.display())]
    ResizeFailure { path: PathBuf, reason: String },

    #[error("Failed to delete {}: {source}", path.display())]
    DeletionFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore {}: {reason}", path.display())]
    RestoreFailure { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("History error: {0}")]
    History(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CullError {
    pub fn malformed(file: impl Into<String>, reason: impl Into<String>) -> Self {
        CullError::MalformedFilename {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Per-file errors that are reported and skipped instead of aborting the batch.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CullError::InvalidConfig(_) | CullError::History(_) | CullError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CullError>;
