use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while publishing a single file
#[derive(Error, Debug)]
pub enum PublishError {
    /// Local file could not be opened or inspected
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Publish root does not exist or is not a directory
    #[error("publish root {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    /// Directory traversal failed for an entry
    #[error("failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// File is not located under the publish root
    #[error("{} is not under the publish root", path.display())]
    OutsideRoot { path: PathBuf },

    /// File name cannot be expressed as a UTF-8 key
    #[error("{} has a name that is not valid UTF-8", path.display())]
    NonUtf8Path { path: PathBuf },

    /// Put policy could not be serialized
    #[error("failed to encode put policy: {0}")]
    Policy(#[from] serde_json::Error),

    /// Transport-level failure talking to the upload host
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upload host answered with a non-200 status
    #[error("{body}")]
    Rejected { status: u16, body: String },

    /// Report line could not be written
    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),
}

impl PublishError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for publish operations
pub type Result<T> = std::result::Result<T, PublishError>;
