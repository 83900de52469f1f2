//! Error taxonomy for transfer operations.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the transfer engine.
///
/// Per-file and per-slice errors are converted into [`crate::types::TransferOutcome`]s
/// at the task boundary; anything that escapes an engine call is fatal to that
/// operation only, never to sibling work.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The service answered with a non-zero envelope code.
    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    /// Connection failure, broken body stream, or undecodable response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local filesystem failure, with the path that caused it.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Missing or invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Request rejected before any network call was made.
    #[error("{0}")]
    Refused(String),

    /// A spawned transfer worker aborted before reporting a result.
    #[error("transfer worker aborted: {0}")]
    Worker(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
