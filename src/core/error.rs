use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::provider::ProviderError;

/// Central error type for the server manager.
/// Every module returns `Result<T, ManagerError>`.
#[derive(Debug, Error)]
pub enum ManagerError {
    // ── Process lifecycle ───────────────────────────────
    #[error("Failed to launch process: {0}")]
    Launch(String),

    #[error("Can't find server.jar at {0:?}")]
    MissingArtifact(PathBuf),

    #[error("Server {0} is already running")]
    AlreadyRunning(String),

    #[error("Server {0} is not running")]
    NotRunning(String),

    #[error("Process did not exit within {0:?}")]
    Timeout(Duration),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Providers ───────────────────────────────────────
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Registry ────────────────────────────────────────
    #[error("No server with name {0}")]
    ServerNotFound(String),

    #[error("Server {0} already exists")]
    ServerAlreadyExists(String),

    #[error("Invalid server name: {0:?}")]
    InvalidServerName(String),

    // ── Properties ──────────────────────────────────────
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Invalid value for {key}: expected {expected}")]
    InvalidPropertyValue { key: String, expected: &'static str },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type ManagerResult<T> = Result<T, ManagerError>;

impl From<std::io::Error> for ManagerError {
    fn from(source: std::io::Error) -> Self {
        ManagerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// Presentation layers receive errors as their display string.
impl serde::Serialize for ManagerError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
