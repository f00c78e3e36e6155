// ─── Server Provisioning ───
// Creates a new server directory: manifest, server jar, default properties.
// A failed download leaves nothing behind.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::downloader::ProgressFn;
use crate::core::error::{ManagerError, ManagerResult};
use crate::core::properties::PROPERTIES_FILE;
use crate::core::provider::Provider;
use crate::core::server::{LaunchConfig, ServerManifest, SoftwareKind, ARTIFACT_FILE};

/// Initial content of a freshly provisioned `server.properties`.
pub const PROPERTIES_HEADER: &str = "# Managed by Lodestone-server-manager\n";

/// Everything needed to create a server.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub name: String,
    pub software: SoftwareKind,
    pub game_version: String,
    pub launch: LaunchConfig,
}

/// A server name must be usable as a single directory name.
pub fn validate_server_name(name: &str) -> ManagerResult<()> {
    let invalid = name.trim().is_empty()
        || name != name.trim()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(ManagerError::InvalidServerName(name.to_string()));
    }
    Ok(())
}

/// Create `<servers_dir>/<name>` and install the requested server software.
///
/// Returns the new server directory. On any failure after the directory was
/// created (including cancellation) the directory is removed again.
pub async fn provision_server(
    servers_dir: &Path,
    client: &reqwest::Client,
    request: &ProvisionRequest,
    on_progress: &ProgressFn,
    cancel: &CancellationToken,
) -> ManagerResult<PathBuf> {
    validate_server_name(&request.name)?;
    request.launch.validate()?;

    let server_dir = servers_dir.join(&request.name);
    if server_dir.exists() {
        return Err(ManagerError::ServerAlreadyExists(request.name.clone()));
    }

    tokio::fs::create_dir_all(&server_dir)
        .await
        .map_err(|e| ManagerError::Io {
            path: server_dir.clone(),
            source: e,
        })?;

    match populate(&server_dir, client, request, on_progress, cancel).await {
        Ok(()) => {
            info!(
                "Created {} {} server '{}' in {:?}",
                request.software, request.game_version, request.name, server_dir
            );
            Ok(server_dir)
        }
        Err(e) => {
            warn!("Provisioning '{}' failed: {}", request.name, e);
            if let Err(cleanup) = tokio::fs::remove_dir_all(&server_dir).await {
                warn!("Cannot remove {:?}: {}", server_dir, cleanup);
            }
            Err(e)
        }
    }
}

async fn populate(
    server_dir: &Path,
    client: &reqwest::Client,
    request: &ProvisionRequest,
    on_progress: &ProgressFn,
    cancel: &CancellationToken,
) -> ManagerResult<()> {
    let mut manifest = ServerManifest::new(
        request.name.clone(),
        request.software,
        request.game_version.clone(),
    );
    manifest.launch = request.launch.clone();
    manifest.save(server_dir)?;

    Provider::new(request.software, client.clone())
        .download_artifact(
            &request.game_version,
            &server_dir.join(ARTIFACT_FILE),
            on_progress,
            cancel,
        )
        .await?;

    let properties = server_dir.join(PROPERTIES_FILE);
    tokio::fs::write(&properties, PROPERTIES_HEADER)
        .await
        .map_err(|e| ManagerError::Io {
            path: properties,
            source: e,
        })
}
