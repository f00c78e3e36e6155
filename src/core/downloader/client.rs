use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::Client;
use sha1::{Digest, Sha1};
use sha2::Sha256;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::provider::ProviderError;

/// Progress callback: `(bytes_done, bytes_total_if_known)`.
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Expected digest of a downloaded file, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checksum {
    Sha1(String),
    Sha256(String),
}

impl Checksum {
    fn expected(&self) -> &str {
        match self {
            Checksum::Sha1(hex) | Checksum::Sha256(hex) => hex,
        }
    }
}

/// A single file to download with optional checksum validation.
#[derive(Debug, Clone)]
pub struct ArtifactDownload {
    pub url: String,
    pub checksum: Option<Checksum>,
    pub size: Option<u64>,
}

enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    None,
}

impl Hasher {
    fn for_checksum(checksum: Option<&Checksum>) -> Self {
        match checksum {
            Some(Checksum::Sha1(_)) => Hasher::Sha1(Sha1::new()),
            Some(Checksum::Sha256(_)) => Hasher::Sha256(Sha256::new()),
            None => Hasher::None,
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::None => {}
        }
    }

    fn finish(self) -> Option<String> {
        match self {
            Hasher::Sha1(h) => Some(hex::encode(h.finalize())),
            Hasher::Sha256(h) => Some(hex::encode(h.finalize())),
            Hasher::None => None,
        }
    }
}

/// Streaming, checksum-validated, cancellable downloader.
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    // ── Single file download ────────────────────────────

    /// Download `artifact` to `dest`.
    ///
    /// The body is streamed into `<dest>.part` and only renamed into place
    /// once the checksum matches, so `dest` never holds a partial file.
    /// Returns the number of bytes written.
    pub async fn download(
        &self,
        artifact: &ArtifactDownload,
        dest: &Path,
        on_progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<u64, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }

        // Ensure parent dir exists
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        let response = self.client.get(&artifact.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::DownloadFailed {
                url: artifact.url.clone(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length().or(artifact.size);
        let part_path = part_path(dest);

        let result = self
            .stream_to_part(response, artifact, &part_path, total_bytes, on_progress, cancel)
            .await;

        let written = match result {
            Ok(written) => written,
            Err(e) => {
                remove_part(&part_path).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&part_path, dest)
            .await
            .map_err(|e| ProviderError::Io {
                path: dest.to_path_buf(),
                source: e,
            })?;

        info!("Downloaded {} ({} bytes) -> {:?}", artifact.url, written, dest);
        Ok(written)
    }

    async fn stream_to_part(
        &self,
        response: reqwest::Response,
        artifact: &ArtifactDownload,
        part_path: &Path,
        total_bytes: Option<u64>,
        on_progress: &ProgressFn,
        cancel: &CancellationToken,
    ) -> Result<u64, ProviderError> {
        let io_err = |e: std::io::Error| ProviderError::Io {
            path: part_path.to_path_buf(),
            source: e,
        };

        let mut hasher = Hasher::for_checksum(artifact.checksum.as_ref());
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        // Write inside a block so the handle is dropped before the rename
        {
            let mut file = tokio::fs::File::create(part_path).await.map_err(io_err)?;

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Download of {} cancelled after {} bytes", artifact.url, written);
                        return Err(ProviderError::Cancelled);
                    }
                    chunk = stream.next() => chunk,
                };

                let Some(chunk) = chunk else { break };
                let chunk = chunk?;

                hasher.update(&chunk);
                file.write_all(&chunk).await.map_err(io_err)?;
                written += chunk.len() as u64;
                on_progress(written, total_bytes);
            }

            file.flush().await.map_err(io_err)?;
        }

        if let (Some(expected), Some(actual)) = (artifact.checksum.as_ref(), hasher.finish()) {
            if !actual.eq_ignore_ascii_case(expected.expected()) {
                return Err(ProviderError::ChecksumMismatch {
                    path: part_path.to_path_buf(),
                    expected: expected.expected().to_string(),
                    actual,
                });
            }
        }

        Ok(written)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

async fn remove_part(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Cannot remove partial download {:?}: {}", path, e),
    }
}
