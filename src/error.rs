//! Unified error type.

use std::path::PathBuf;

/// The error type returned by loupe's fallible setup operations.
///
/// Failures while writing one response are plain [`std::io::Error`]s handed
/// back to the handler that issued the write. This type covers the rest:
/// binding a port, accepting connections, loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("invalid header name `{name}`")]
    InvalidHeader {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
}
