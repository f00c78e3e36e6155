use std::path::PathBuf;
use thiserror::Error;

/// Failures while resolving or downloading server software.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unsupported server software: {0}")]
    UnsupportedSoftware(String),

    #[error("No {software} server available for version {version}")]
    VersionNotFound { software: String, version: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed: {url} (HTTP {status})")]
    DownloadFailed { url: String, status: u16 },

    #[error("Checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Download cancelled")]
    Cancelled,
}

impl ProviderError {
    /// The caller aborted the operation; partial output should be discarded.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}
