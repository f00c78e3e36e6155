// ─── Software Providers ───
// Resolve a (software, version) pair to a downloadable server jar.
//
//   vanilla  Mojang version manifest → version JSON → downloads.server
//   paper    PaperMC fill API v3 → latest STABLE build

pub mod error;
pub mod paper;
pub mod vanilla;

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::downloader::{ArtifactDownload, Downloader, ProgressFn};
use crate::core::server::SoftwareKind;

pub use error::ProviderError;
pub use paper::PaperProvider;
pub use vanilla::VanillaProvider;

#[async_trait]
pub trait SoftwareProvider: Send + Sync {
    fn kind(&self) -> SoftwareKind;

    fn client(&self) -> &reqwest::Client;

    /// Every installable version, newest first.
    async fn list_versions(&self) -> Result<Vec<String>, ProviderError>;

    /// Where the server jar for `version` can be downloaded from.
    async fn resolve_artifact(&self, version: &str) -> Result<ArtifactDownload, ProviderError>;

    async fn version_exists(&self, version: &str) -> Result<bool, ProviderError> {
        Ok(self.list_versions().await?.iter().any(|v| v == version))
    }

    /// Download the server jar for `version` to `dest`.
    async fn download_artifact(
        &self,
        version: &str,
        dest: &Path,
        on_progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let artifact = self.resolve_artifact(version).await?;
        info!("Downloading {} {} from {}", self.kind(), version, artifact.url);
        Downloader::new(self.client().clone())
            .download(&artifact, dest, on_progress, cancel)
            .await?;
        Ok(())
    }
}

/// Enum dispatcher over the built-in providers.
pub enum Provider {
    Vanilla(VanillaProvider),
    Paper(PaperProvider),
}

impl Provider {
    pub fn new(kind: SoftwareKind, client: reqwest::Client) -> Self {
        match kind {
            SoftwareKind::Vanilla => Self::Vanilla(VanillaProvider::new(client)),
            SoftwareKind::Paper => Self::Paper(PaperProvider::new(client)),
        }
    }

    fn inner(&self) -> &dyn SoftwareProvider {
        match self {
            Provider::Vanilla(p) => p,
            Provider::Paper(p) => p,
        }
    }

    pub fn kind(&self) -> SoftwareKind {
        self.inner().kind()
    }

    pub async fn list_versions(&self) -> Result<Vec<String>, ProviderError> {
        self.inner().list_versions().await
    }

    pub async fn version_exists(&self, version: &str) -> Result<bool, ProviderError> {
        self.inner().version_exists(version).await
    }

    pub async fn download_artifact(
        &self,
        version: &str,
        dest: &Path,
        on_progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        self.inner()
            .download_artifact(version, dest, on_progress, cancel)
            .await
    }
}

/// Download the `kind` server jar for `version` to `dest`.
pub async fn download_artifact(
    client: &reqwest::Client,
    kind: SoftwareKind,
    version: &str,
    dest: &Path,
    on_progress: &ProgressFn,
    cancel: &CancellationToken,
) -> Result<(), ProviderError> {
    Provider::new(kind, client.clone())
        .download_artifact(version, dest, on_progress, cancel)
        .await
}

/// Group versions by `major.minor` family, keeping input order both for the
/// families and inside each family.
pub fn group_versions(versions: &[String]) -> Vec<(String, Vec<String>)> {
    let mut groups: Vec<(String, Vec<String>)> = Vec::new();
    for version in versions {
        let family = version_family(version);
        match groups.iter_mut().find(|(f, _)| *f == family) {
            Some((_, members)) => members.push(version.clone()),
            None => groups.push((family, vec![version.clone()])),
        }
    }
    groups
}

fn version_family(version: &str) -> String {
    let mut parts = version.splitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => {
            let minor: String = minor.chars().take_while(char::is_ascii_digit).collect();
            if minor.is_empty() {
                version.to_string()
            } else {
                format!("{major}.{minor}")
            }
        }
        _ => version.to_string(),
    }
}

/// Numeric sort key: `"1.21.4"` → `[1, 21, 4]`. Non-numeric suffixes are
/// ignored, so `1.21-rc1` sorts with `1.21`.
pub(crate) fn version_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| {
            part.chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        })
        .collect()
}
