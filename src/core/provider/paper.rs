use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{version_key, ProviderError, SoftwareProvider};
use crate::core::downloader::{ArtifactDownload, Checksum};
use crate::core::server::SoftwareKind;

const PAPER_API_BASE: &str = "https://fill.papermc.io/v3/projects/paper";
const SERVER_DOWNLOAD_KEY: &str = "server:default";
const STABLE_CHANNEL: &str = "STABLE";

#[derive(Debug, Deserialize)]
struct PaperProject {
    /// Family (`1.21`) → versions in that family.
    versions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct PaperBuild {
    id: u64,
    channel: String,
    #[serde(default)]
    downloads: HashMap<String, PaperDownload>,
}

#[derive(Debug, Deserialize)]
struct PaperDownload {
    url: String,
    #[serde(default)]
    checksums: PaperChecksums,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaperChecksums {
    sha256: Option<String>,
}

/// PaperMC server jars from the fill API.
pub struct PaperProvider {
    client: reqwest::Client,
    versions: OnceCell<Vec<String>>,
}

impl PaperProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            versions: OnceCell::new(),
        }
    }

    async fn fetch_versions(&self) -> Result<Vec<String>, ProviderError> {
        let project: PaperProject = self
            .client
            .get(PAPER_API_BASE)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(flatten_versions(project))
    }
}

fn not_found(version: &str) -> ProviderError {
    ProviderError::VersionNotFound {
        software: SoftwareKind::Paper.to_string(),
        version: version.to_string(),
    }
}

/// All versions across families, newest first.
fn flatten_versions(project: PaperProject) -> Vec<String> {
    let mut versions: Vec<String> = project.versions.into_values().flatten().collect();
    versions.sort_by(|a, b| version_key(b).cmp(&version_key(a)));
    versions.dedup();
    versions
}

/// The first stable build in API order (newest first) with a server download.
fn latest_stable(builds: &[PaperBuild]) -> Option<(u64, ArtifactDownload)> {
    builds
        .iter()
        .filter(|build| build.channel == STABLE_CHANNEL)
        .find_map(|build| {
            let download = build.downloads.get(SERVER_DOWNLOAD_KEY)?;
            Some((
                build.id,
                ArtifactDownload {
                    url: download.url.clone(),
                    checksum: download.checksums.sha256.clone().map(Checksum::Sha256),
                    size: download.size,
                },
            ))
        })
}

#[async_trait]
impl SoftwareProvider for PaperProvider {
    fn kind(&self) -> SoftwareKind {
        SoftwareKind::Paper
    }

    fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn list_versions(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .versions
            .get_or_try_init(|| self.fetch_versions())
            .await?
            .clone())
    }

    async fn resolve_artifact(&self, version: &str) -> Result<ArtifactDownload, ProviderError> {
        let url = format!("{}/versions/{}/builds", PAPER_API_BASE, version);
        let resp = self.client.get(&url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(not_found(version));
        }
        let builds: Vec<PaperBuild> = resp.error_for_status()?.json().await?;

        let (build, artifact) = latest_stable(&builds).ok_or_else(|| not_found(version))?;
        debug!("Paper {} build {}: {}", version, build, artifact.url);
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_flattened_newest_first() {
        let json = r#"{
            "project": {"id": "paper", "name": "Paper"},
            "versions": {
                "1.8": ["1.8.8"],
                "1.20": ["1.20.6", "1.20.4"],
                "1.21": ["1.21.4", "1.21.3", "1.21"]
            }
        }"#;
        let project: PaperProject = serde_json::from_str(json).unwrap();
        assert_eq!(
            flatten_versions(project),
            vec!["1.21.4", "1.21.3", "1.21", "1.20.6", "1.20.4", "1.8.8"]
        );
    }

    #[test]
    fn picks_first_stable_build() {
        let json = r#"[
            {"id": 232, "channel": "ALPHA", "downloads": {
                "server:default": {"name": "a.jar", "url": "https://example.com/232.jar",
                    "checksums": {"sha256": "aaa"}, "size": 10}}},
            {"id": 231, "channel": "STABLE", "downloads": {
                "server:default": {"name": "b.jar", "url": "https://example.com/231.jar",
                    "checksums": {"sha256": "bbb"}, "size": 20}}},
            {"id": 230, "channel": "STABLE", "downloads": {
                "server:default": {"name": "c.jar", "url": "https://example.com/230.jar",
                    "checksums": {"sha256": "ccc"}, "size": 30}}}
        ]"#;
        let builds: Vec<PaperBuild> = serde_json::from_str(json).unwrap();
        let (id, artifact) = latest_stable(&builds).unwrap();
        assert_eq!(id, 231);
        assert_eq!(artifact.url, "https://example.com/231.jar");
        assert_eq!(artifact.checksum, Some(Checksum::Sha256("bbb".into())));
        assert_eq!(artifact.size, Some(20));
    }

    #[test]
    fn no_stable_build_means_nothing_to_download() {
        let json = r#"[{"id": 1, "channel": "BETA", "downloads": {}}]"#;
        let builds: Vec<PaperBuild> = serde_json::from_str(json).unwrap();
        assert!(latest_stable(&builds).is_none());
    }
}
