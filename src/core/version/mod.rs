pub mod manifest;

pub use manifest::{DownloadArtifact, VersionDownloads, VersionEntry, VersionJson, VersionManifest};
