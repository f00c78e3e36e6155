use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::server::{ServerState, MANIFEST_FILE};
use crate::core::supervisor::{ManagedServer, DEFAULT_GRACE_PERIOD};

/// Extra time on top of the grace period for the kill path to settle.
const SETTLE_MARGIN: Duration = Duration::from_secs(5);

/// Every known server, keyed by name.
pub struct ServerRegistry {
    /// Root directory where all server directories live.
    servers_dir: PathBuf,
    servers: BTreeMap<String, Arc<ManagedServer>>,
    grace_period: Duration,
    fallback_java: Option<PathBuf>,
}

impl ServerRegistry {
    pub fn new(servers_dir: PathBuf) -> Self {
        Self {
            servers_dir,
            servers: BTreeMap::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
            fallback_java: None,
        }
    }

    /// Stop grace period handed to every server loaded afterwards.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Java runtime used by servers that do not configure their own.
    pub fn with_fallback_java(mut self, java: Option<PathBuf>) -> Self {
        self.fallback_java = java;
        self
    }

    pub fn servers_dir(&self) -> &Path {
        &self.servers_dir
    }

    pub fn server_dir(&self, name: &str) -> PathBuf {
        self.servers_dir.join(name)
    }

    // ── Collection ──────────────────────────────────────

    /// Register `server`. A name can only be registered once.
    pub fn insert(&mut self, server: ManagedServer) -> ManagerResult<Arc<ManagedServer>> {
        let name = server.name().to_string();
        if self.servers.contains_key(&name) {
            return Err(ManagerError::ServerAlreadyExists(name));
        }
        let server = Arc::new(server);
        self.servers.insert(name, server.clone());
        Ok(server)
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<ManagedServer>> {
        self.servers.remove(name)
    }

    pub fn get(&self, name: &str) -> ManagerResult<Arc<ManagedServer>> {
        self.servers
            .get(name)
            .cloned()
            .ok_or_else(|| ManagerError::ServerNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ManagedServer>> {
        self.servers.values()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    // ── Disk ────────────────────────────────────────────

    /// Build a server from its directory using the registry's settings,
    /// without registering it.
    pub fn open(&self, server_dir: &Path) -> ManagerResult<ManagedServer> {
        Ok(ManagedServer::from_dir(server_dir)?
            .with_grace_period(self.grace_period)
            .with_fallback_java(self.fallback_java.clone()))
    }

    /// Register the server stored in `server_dir`.
    pub fn load_dir(&mut self, server_dir: &Path) -> ManagerResult<Arc<ManagedServer>> {
        let server = self.open(server_dir)?;
        self.insert(server)
    }

    /// Register every server directory under the servers directory.
    ///
    /// Directories without a readable manifest are skipped with a warning.
    /// Returns the number of servers registered by this call.
    pub async fn load_all(&mut self) -> ManagerResult<usize> {
        if !self.servers_dir.exists() {
            return Ok(0);
        }

        let mut entries =
            tokio::fs::read_dir(&self.servers_dir)
                .await
                .map_err(|e| ManagerError::Io {
                    path: self.servers_dir.clone(),
                    source: e,
                })?;

        let mut loaded = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| ManagerError::Io {
            path: self.servers_dir.clone(),
            source: e,
        })? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if !path.join(MANIFEST_FILE).exists() {
                warn!("Skipping {:?}: no {}", path, MANIFEST_FILE);
                continue;
            }
            match self.load_dir(&path) {
                Ok(server) => {
                    info!("Loaded server {} from {:?}", server.name(), path);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }

        Ok(loaded)
    }

    // ── Lifecycle ───────────────────────────────────────

    /// Stop the server if needed, delete its directory and unregister it.
    ///
    /// Holds the registry for the whole shutdown; callers sharing the
    /// registry should use [`shut_down`] and [`Self::remove_stopped`].
    pub async fn delete_server(&mut self, name: &str) -> ManagerResult<()> {
        let server = self.get(name)?;
        shut_down(server, self.grace_period).await?;
        self.remove_stopped(name).await
    }

    /// Delete the directory of a server that is not live and unregister it.
    pub async fn remove_stopped(&mut self, name: &str) -> ManagerResult<()> {
        let server = self.get(name)?;
        if server.state().is_live() {
            return Err(ManagerError::AlreadyRunning(name.to_string()));
        }

        let path = server.path().to_path_buf();
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(|source| ManagerError::Io { path, source })?;

        self.servers.remove(name);
        info!("Deleted server {}", name);
        Ok(())
    }

    /// Every server that currently has a process attached.
    pub fn live_servers(&self) -> Vec<Arc<ManagedServer>> {
        self.iter()
            .filter(|server| server.state().is_live())
            .cloned()
            .collect()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Stop every live server and wait until each one has exited.
    pub async fn shutdown_all(&self) -> ManagerResult<()> {
        shutdown_servers(self.live_servers(), self.grace_period).await
    }
}

/// Stop `server` for good and wait for it to exit, killing it when it
/// outlives the grace period. A pending restart is dropped first.
pub async fn shut_down(server: Arc<ManagedServer>, grace_period: Duration) -> ManagerResult<()> {
    if server.cancel_restart() {
        info!("Cancelled pending restart of {}", server.name());
    }
    if !server.state().is_live() {
        return Ok(());
    }

    server.stop()?;
    let state = settle(server.clone(), grace_period + SETTLE_MARGIN).await?;
    if state.is_live() {
        warn!("Server {} did not stop in time, killing", server.name());
        server.kill()?;
        settle(server, SETTLE_MARGIN).await?;
    }
    Ok(())
}

/// Stop every server in `servers` and wait until each one has exited.
pub async fn shutdown_servers(
    servers: Vec<Arc<ManagedServer>>,
    grace_period: Duration,
) -> ManagerResult<()> {
    if servers.is_empty() {
        return Ok(());
    }
    info!("Shutting down {} server(s)", servers.len());

    for server in &servers {
        server.cancel_restart();
        if let Err(e) = server.stop() {
            warn!("Cannot stop {}: {}", server.name(), e);
        }
    }

    for server in servers {
        let state = settle(server.clone(), grace_period + SETTLE_MARGIN).await?;
        if state.is_live() {
            warn!("Server {} is still {} after shutdown", server.name(), state);
        }
    }
    Ok(())
}

/// Wait off the async runtime until `server` reaches a terminal state.
async fn settle(server: Arc<ManagedServer>, timeout: Duration) -> ManagerResult<ServerState> {
    tokio::task::spawn_blocking(move || server.wait_for_state(timeout, |s| !s.is_live()))
        .await
        .map_err(|e| ManagerError::Other(format!("wait task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::server::{ServerManifest, SoftwareKind};

    fn write_server(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        ServerManifest::new(name.into(), SoftwareKind::Paper, "1.21.4".into())
            .save(&dir)
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn load_all_skips_directories_without_manifest() {
        let root = tempfile::tempdir().unwrap();
        write_server(root.path(), "survival");
        write_server(root.path(), "creative");
        std::fs::create_dir_all(root.path().join("junk")).unwrap();
        std::fs::create_dir_all(root.path().join("broken")).unwrap();
        std::fs::write(root.path().join("broken").join(MANIFEST_FILE), "{not json").unwrap();
        std::fs::write(root.path().join("stray.txt"), "x").unwrap();

        let mut registry = ServerRegistry::new(root.path().to_path_buf());
        assert_eq!(registry.load_all().await.unwrap(), 2);
        assert_eq!(registry.names(), vec!["creative", "survival"]);
        assert_eq!(registry.get("survival").unwrap().software(), SoftwareKind::Paper);
    }

    #[tokio::test]
    async fn load_all_on_missing_directory_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let mut registry = ServerRegistry::new(root.path().join("nope"));
        assert_eq!(registry.load_all().await.unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn insert_rejects_duplicate_names() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_server(root.path(), "survival");
        let mut registry = ServerRegistry::new(root.path().to_path_buf())
            .with_grace_period(Duration::from_secs(3));

        let server = registry.load_dir(&dir).unwrap();
        assert_eq!(server.grace_period(), Duration::from_secs(3));
        assert!(matches!(
            registry.load_dir(&dir),
            Err(ManagerError::ServerAlreadyExists(_))
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("survival").is_some());
        assert!(matches!(
            registry.get("survival"),
            Err(ManagerError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_removes_directory_and_entry() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_server(root.path(), "old");
        let mut registry = ServerRegistry::new(root.path().to_path_buf());
        registry.load_dir(&dir).unwrap();

        registry.delete_server("old").await.unwrap();
        assert!(!dir.exists());
        assert!(!registry.contains("old"));
        assert!(matches!(
            registry.delete_server("old").await,
            Err(ManagerError::ServerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_with_nothing_running_is_immediate() {
        let root = tempfile::tempdir().unwrap();
        let dir = write_server(root.path(), "idle");
        let mut registry = ServerRegistry::new(root.path().to_path_buf());
        registry.load_dir(&dir).unwrap();
        registry.shutdown_all().await.unwrap();
        assert_eq!(registry.get("idle").unwrap().state(), ServerState::Stopped);
    }
}
