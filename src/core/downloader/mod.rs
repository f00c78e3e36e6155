pub mod client;

pub use client::{ArtifactDownload, Checksum, Downloader, ProgressFn};
