use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::http::build_http_client;
use crate::core::provider::Provider;
use crate::core::registry::ServerRegistry;
use crate::core::server::SoftwareKind;

const APP_DIR_NAME: &str = "Lodestone";
const SETTINGS_FILE: &str = "lodestone_settings.json";
const SERVERS_DIR_NAME: &str = "servers";

/// Overrides the data directory when set.
pub const DATA_DIR_ENV: &str = "LODESTONE_DATA_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSettings {
    /// Where server directories live; `<data_dir>/servers` when unset.
    #[serde(default)]
    pub servers_dir: Option<PathBuf>,
    /// Java runtime for servers that do not configure their own.
    #[serde(default)]
    pub java_path: Option<PathBuf>,
    #[serde(default = "default_stop_grace_period_secs")]
    pub stop_grace_period_secs: u64,
    /// `-Xmx` given to newly created servers.
    #[serde(default = "default_max_ram_gb")]
    pub default_max_ram_gb: u32,
}

fn default_stop_grace_period_secs() -> u64 {
    30
}

fn default_max_ram_gb() -> u32 {
    2
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            servers_dir: None,
            java_path: None,
            stop_grace_period_secs: default_stop_grace_period_secs(),
            default_max_ram_gb: default_max_ram_gb(),
        }
    }
}

impl ManagerSettings {
    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period_secs)
    }
}

pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: ManagerSettings,
    pub http_client: Client,
    pub registry: ServerRegistry,
    /// One provider per software kind so version lists stay cached.
    providers: HashMap<SoftwareKind, Arc<Provider>>,
}

impl AppState {
    /// State rooted at the default data directory.
    pub fn new() -> ManagerResult<Self> {
        Self::with_data_dir(default_data_dir())
    }

    pub fn with_data_dir(data_dir: PathBuf) -> ManagerResult<Self> {
        std::fs::create_dir_all(&data_dir).map_err(|e| ManagerError::Io {
            path: data_dir.clone(),
            source: e,
        })?;

        let settings = load_settings_from_disk(&data_dir).unwrap_or_default();
        let registry = registry_for(&data_dir, &settings);
        let http_client = build_http_client()?;
        let providers = [SoftwareKind::Vanilla, SoftwareKind::Paper]
            .into_iter()
            .map(|kind| (kind, Arc::new(Provider::new(kind, http_client.clone()))))
            .collect();

        info!("Data directory: {:?}", data_dir);
        Ok(Self {
            data_dir,
            settings,
            http_client,
            registry,
            providers,
        })
    }

    pub fn provider(&self, kind: SoftwareKind) -> Arc<Provider> {
        match self.providers.get(&kind) {
            Some(provider) => provider.clone(),
            None => Arc::new(Provider::new(kind, self.http_client.clone())),
        }
    }

    pub fn servers_dir(&self) -> PathBuf {
        servers_dir_for(&self.data_dir, &self.settings)
    }

    /// Register every server found on disk.
    pub async fn load_servers(&mut self) -> ManagerResult<usize> {
        let servers_dir = self.servers_dir();
        tokio::fs::create_dir_all(&servers_dir)
            .await
            .map_err(|e| ManagerError::Io {
                path: servers_dir.clone(),
                source: e,
            })?;
        let loaded = self.registry.load_all().await?;
        info!("Loaded {} server(s) from {:?}", loaded, servers_dir);
        Ok(loaded)
    }

    pub fn save_settings(&self) -> ManagerResult<()> {
        let settings_path = self.data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(&settings_path, json).map_err(|e| ManagerError::Io {
            path: settings_path,
            source: e,
        })
    }
}

fn registry_for(data_dir: &Path, settings: &ManagerSettings) -> ServerRegistry {
    ServerRegistry::new(servers_dir_for(data_dir, settings))
        .with_grace_period(settings.stop_grace_period())
        .with_fallback_java(settings.java_path.clone())
}

fn servers_dir_for(data_dir: &Path, settings: &ManagerSettings) -> PathBuf {
    settings
        .servers_dir
        .clone()
        .unwrap_or_else(|| data_dir.join(SERVERS_DIR_NAME))
}

fn load_settings_from_disk(data_dir: &Path) -> Option<ManagerSettings> {
    let path = data_dir.join(SETTINGS_FILE);
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Ignoring unreadable settings {:?}: {}", path, e);
            None
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// `$LODESTONE_DATA_DIR`, or `Lodestone` under the platform data directory.
pub fn default_data_dir() -> PathBuf {
    match std::env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_base_dir().join(APP_DIR_NAME),
    }
}
