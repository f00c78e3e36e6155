use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::downloader::ProgressFn;
use crate::core::error::{ManagerError, ManagerResult};
use crate::core::properties::PropertyValue;
use crate::core::provider::group_versions;
use crate::core::registry::{provision_server, shut_down, shutdown_servers, ProvisionRequest};
use crate::core::server::{LaunchConfig, SoftwareKind};
use crate::core::state::AppState;
use crate::core::supervisor::{ManagedServer, ServerInfo};

pub type SharedState = Arc<Mutex<AppState>>;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateServerRequest {
    pub name: String,
    pub software: String,
    pub game_version: String,
    #[serde(default)]
    pub min_ram_gb: Option<u32>,
    #[serde(default)]
    pub max_ram_gb: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyEntry {
    pub key: String,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionGroup {
    pub family: String,
    pub versions: Vec<String>,
}

async fn server(state: &SharedState, name: &str) -> ManagerResult<Arc<ManagedServer>> {
    state.lock().await.registry.get(name)
}

pub async fn list_servers(state: &SharedState) -> ManagerResult<Vec<ServerInfo>> {
    let state = state.lock().await;
    Ok(state.registry.iter().map(|server| server.info()).collect())
}

/// Create and register a new server. The state lock is not held during the
/// download.
pub async fn create_server(
    state: &SharedState,
    request: CreateServerRequest,
    on_progress: &ProgressFn,
    cancel: &CancellationToken,
) -> ManagerResult<ServerInfo> {
    let software: SoftwareKind = request.software.parse()?;

    let (servers_dir, client, default_max_ram_gb) = {
        let state = state.lock().await;
        if state.registry.contains(&request.name) {
            return Err(ManagerError::ServerAlreadyExists(request.name));
        }
        (
            state.servers_dir(),
            state.http_client.clone(),
            state.settings.default_max_ram_gb,
        )
    };

    let launch = LaunchConfig {
        min_ram_gb: request.min_ram_gb,
        max_ram_gb: request.max_ram_gb.unwrap_or(default_max_ram_gb),
        ..LaunchConfig::default()
    };
    let provision = ProvisionRequest {
        name: request.name,
        software,
        game_version: request.game_version,
        launch,
    };

    let server_dir =
        provision_server(&servers_dir, &client, &provision, on_progress, cancel).await?;

    let mut state = state.lock().await;
    let server = state.registry.load_dir(&server_dir)?;
    Ok(server.info())
}

/// Stop, delete and unregister a server. The state lock is only held to look
/// the server up and to remove it, never while it shuts down.
pub async fn delete_server(state: &SharedState, name: &str) -> ManagerResult<()> {
    let (server, grace_period) = {
        let state = state.lock().await;
        (state.registry.get(name)?, state.registry.grace_period())
    };
    shut_down(server, grace_period).await?;
    state.lock().await.registry.remove_stopped(name).await
}

pub async fn start_server(state: &SharedState, name: &str) -> ManagerResult<ServerInfo> {
    let server = server(state, name).await?;
    server.start()?;
    Ok(server.info())
}

pub async fn stop_server(state: &SharedState, name: &str) -> ManagerResult<ServerInfo> {
    let server = server(state, name).await?;
    server.stop()?;
    Ok(server.info())
}

pub async fn restart_server(state: &SharedState, name: &str) -> ManagerResult<ServerInfo> {
    let server = server(state, name).await?;
    server.restart()?;
    Ok(server.info())
}

/// Kill the process without the stop command or grace period.
pub async fn force_close_server(state: &SharedState, name: &str) -> ManagerResult<()> {
    let server = server(state, name).await?;
    server.kill()
}

pub async fn send_command(state: &SharedState, name: &str, command: &str) -> ManagerResult<()> {
    server(state, name).await?.send_command(command)
}

pub async fn get_server_logs(
    state: &SharedState,
    name: &str,
    limit: usize,
) -> ManagerResult<Vec<String>> {
    Ok(server(state, name).await?.recent_logs(limit))
}

pub async fn list_properties(state: &SharedState, name: &str) -> ManagerResult<Vec<PropertyEntry>> {
    let properties = server(state, name).await?.properties()?;
    Ok(properties
        .iter()
        .map(|(key, value)| PropertyEntry {
            key: key.to_string(),
            value: value.clone(),
        })
        .collect())
}

pub async fn set_property(
    state: &SharedState,
    name: &str,
    key: &str,
    value: &str,
) -> ManagerResult<()> {
    server(state, name).await?.set_property(key, value)?;
    info!("Set {}={} on {}", key, value, name);
    Ok(())
}

pub async fn accept_eula(state: &SharedState, name: &str) -> ManagerResult<()> {
    server(state, name).await?.accept_eula()
}

pub async fn list_versions(state: &SharedState, software: &str) -> ManagerResult<Vec<VersionGroup>> {
    let kind: SoftwareKind = software.parse()?;
    let provider = state.lock().await.provider(kind);
    let versions = provider.list_versions().await?;
    Ok(group_versions(&versions)
        .into_iter()
        .map(|(family, versions)| VersionGroup { family, versions })
        .collect())
}

pub async fn update_launch_config(
    state: &SharedState,
    name: &str,
    config: LaunchConfig,
) -> ManagerResult<ServerInfo> {
    let server = server(state, name).await?;
    server.update_launch_config(config)?;
    Ok(server.info())
}

pub async fn shutdown_all(state: &SharedState) -> ManagerResult<()> {
    let (servers, grace_period) = {
        let state = state.lock().await;
        (state.registry.live_servers(), state.registry.grace_period())
    };
    shutdown_servers(servers, grace_period).await
}
