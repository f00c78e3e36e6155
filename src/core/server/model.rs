use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::provider::ProviderError;

/// Manifest file written in every server directory.
pub const MANIFEST_FILE: &str = "lodestone-manifest.json";
/// Launch artifact expected inside the server directory.
pub const ARTIFACT_FILE: &str = "server.jar";

const MANIFEST_SCHEMA: u32 = 1;
const DEFAULT_MAX_RAM_GB: u32 = 2;

/// Supported server software — strongly typed, no magic strings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SoftwareKind {
    Vanilla,
    Paper,
}

impl std::fmt::Display for SoftwareKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SoftwareKind::Vanilla => write!(f, "vanilla"),
            SoftwareKind::Paper => write!(f, "paper"),
        }
    }
}

impl FromStr for SoftwareKind {
    type Err = ProviderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "vanilla" => Ok(SoftwareKind::Vanilla),
            "paper" => Ok(SoftwareKind::Paper),
            _ => Err(ProviderError::UnsupportedSoftware(raw.to_string())),
        }
    }
}

/// JVM launch settings for one server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchConfig {
    /// `-Xms` in GiB; omitted from the command line when unset.
    #[serde(default)]
    pub min_ram_gb: Option<u32>,
    /// `-Xmx` in GiB.
    #[serde(default = "default_max_ram_gb")]
    pub max_ram_gb: u32,
    /// Appended after `nogui`.
    #[serde(default)]
    pub additional_args: Vec<String>,
    /// Java runtime; falls back to the manager setting, then `java` on PATH.
    #[serde(default)]
    pub java_path: Option<PathBuf>,
}

fn default_max_ram_gb() -> u32 {
    DEFAULT_MAX_RAM_GB
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            min_ram_gb: None,
            max_ram_gb: DEFAULT_MAX_RAM_GB,
            additional_args: Vec::new(),
            java_path: None,
        }
    }
}

impl LaunchConfig {
    pub fn with_max_ram_gb(mut self, max_ram_gb: u32) -> Self {
        self.max_ram_gb = max_ram_gb;
        self
    }

    pub fn validate(&self) -> ManagerResult<()> {
        if self.max_ram_gb == 0 {
            return Err(ManagerError::Other(
                "Maximum memory must be at least 1 GB".into(),
            ));
        }
        if let Some(min) = self.min_ram_gb {
            if min > self.max_ram_gb {
                return Err(ManagerError::Other(format!(
                    "Minimum memory ({min} GB) exceeds maximum memory ({} GB)",
                    self.max_ram_gb
                )));
            }
        }
        Ok(())
    }
}

/// Server identity persisted to disk as `lodestone-manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerManifest {
    pub schema: u32,
    pub name: String,
    pub software: SoftwareKind,
    pub game_version: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub launch: LaunchConfig,
}

impl ServerManifest {
    pub fn new(name: String, software: SoftwareKind, game_version: String) -> Self {
        Self {
            schema: MANIFEST_SCHEMA,
            name,
            software,
            game_version,
            created_at: Some(Utc::now()),
            launch: LaunchConfig::default(),
        }
    }

    /// Read the manifest stored in `server_dir`.
    pub fn load(server_dir: &Path) -> ManagerResult<Self> {
        let path = server_dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|source| ManagerError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the manifest into `server_dir`.
    pub fn save(&self, server_dir: &Path) -> ManagerResult<()> {
        let path = server_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| ManagerError::Io { path, source })
    }
}
