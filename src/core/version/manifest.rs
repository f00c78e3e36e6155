// ─── Version Manifest ───
// Handles fetching and parsing the Mojang version manifest v2 and the
// per-version JSON that carries the dedicated server download.

use serde::Deserialize;
use tracing::{debug, info};

use crate::core::provider::ProviderError;

const VERSION_MANIFEST_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(rename = "releaseTime")]
    pub release_time: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    /// Fetch the version manifest from Mojang using a shared HTTP client.
    pub async fn fetch(client: &reqwest::Client) -> Result<Self, ProviderError> {
        info!("Fetching Minecraft version manifest...");

        let manifest: VersionManifest = client
            .get(VERSION_MANIFEST_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    /// Find a release entry by ID (e.g. "1.20.4").
    pub fn find_release(&self, id: &str) -> Option<&VersionEntry> {
        self.versions
            .iter()
            .find(|v| v.id == id && v.version_type == "release")
    }

    /// Release IDs, newest first (manifest order).
    pub fn release_ids(&self) -> Vec<String> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .map(|v| v.id.clone())
            .collect()
    }
}

/// The subset of a version JSON a server install needs.
#[derive(Debug, Deserialize)]
pub struct VersionJson {
    pub downloads: Option<VersionDownloads>,
}

#[derive(Debug, Deserialize)]
pub struct VersionDownloads {
    pub server: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

impl VersionJson {
    pub async fn fetch(client: &reqwest::Client, entry: &VersionEntry) -> Result<Self, ProviderError> {
        debug!("Fetching version JSON for {}", entry.id);
        Ok(client
            .get(&entry.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }

    /// The dedicated server jar, absent for very old versions.
    pub fn server_download(&self) -> Option<&DownloadArtifact> {
        self.downloads.as_ref()?.server.as_ref()
    }
}
