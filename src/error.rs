use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Settings error at {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Cannot read folder {path}: {source}")]
    FolderAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No folder selected")]
    NoFolderSelected,

    #[error("No media files found")]
    NoMediaFound,

    #[error("Stream key is missing")]
    MissingCredential,

    #[error("Already streaming: {0}")]
    AlreadyStreaming(String),

    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        StreamError::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
