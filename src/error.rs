//! Error type for the feed update pipeline.
//!
//! Fatal conditions (a missing keyword file, a universe too small to fill a
//! batch, nothing generated, a held lock) surface as [`Error`] variants and end
//! the run with a non-zero exit status. Recoverable conditions such as a
//! corrupt history file or a malformed feed are logged where they happen and
//! never reach this type.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The keyword universe could not be read or parsed.
    #[error("failed to load keyword file {}: {reason}", .path.display())]
    KeywordFile { path: PathBuf, reason: String },

    /// Fewer distinct keywords exist than a single batch needs.
    #[error("keyword universe has {available} keywords but a batch needs {batch_size}")]
    UniverseTooSmall { available: usize, batch_size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every interpretation in the batch failed.
    #[error("no interpretations were generated; feed and history left untouched")]
    NothingGenerated,

    /// Another run holds the lock file.
    #[error(
        "another run holds the lock at {} (remove it if no other run is active)",
        .0.display()
    )]
    AlreadyRunning(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("feed error: {0}")]
    Feed(String),
}

impl Error {
    /// Attach the offending path to an I/O error.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
