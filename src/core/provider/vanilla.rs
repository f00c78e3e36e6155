use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{ProviderError, SoftwareProvider};
use crate::core::downloader::{ArtifactDownload, Checksum};
use crate::core::server::SoftwareKind;
use crate::core::version::{DownloadArtifact, VersionJson, VersionManifest};

/// Official Mojang server jars.
pub struct VanillaProvider {
    client: reqwest::Client,
    manifest: OnceCell<VersionManifest>,
}

impl VanillaProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            manifest: OnceCell::new(),
        }
    }

    async fn manifest(&self) -> Result<&VersionManifest, ProviderError> {
        self.manifest
            .get_or_try_init(|| VersionManifest::fetch(&self.client))
            .await
    }
}

fn not_found(version: &str) -> ProviderError {
    ProviderError::VersionNotFound {
        software: SoftwareKind::Vanilla.to_string(),
        version: version.to_string(),
    }
}

fn to_artifact(download: &DownloadArtifact) -> ArtifactDownload {
    ArtifactDownload {
        url: download.url.clone(),
        checksum: Some(Checksum::Sha1(download.sha1.clone())),
        size: Some(download.size),
    }
}

#[async_trait]
impl SoftwareProvider for VanillaProvider {
    fn kind(&self) -> SoftwareKind {
        SoftwareKind::Vanilla
    }

    fn client(&self) -> &reqwest::Client {
        &self.client
    }

    async fn list_versions(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.manifest().await?.release_ids())
    }

    async fn resolve_artifact(&self, version: &str) -> Result<ArtifactDownload, ProviderError> {
        let entry = self
            .manifest()
            .await?
            .find_release(version)
            .ok_or_else(|| not_found(version))?
            .clone();

        let json = VersionJson::fetch(&self.client, &entry).await?;
        let download = json.server_download().ok_or_else(|| not_found(version))?;
        debug!("Vanilla {} server jar: {} ({} bytes)", version, download.url, download.size);
        Ok(to_artifact(download))
    }
}
