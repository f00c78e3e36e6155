// ─── Managed Server ───
// Supervises one server process: launch, console ingestion, lifecycle state,
// console commands and graceful stop with kill escalation.
//
// Threads per live process:
//   ingest-<name>  reads console lines until the process closes its output,
//                  then resolves the final state. Sole driver of exit resolution.
//   stop-<name>    spawned by `stop()`; waits out the grace period, kills on
//                  timeout, then restarts if asked to.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::launch::build_launch_command;
use crate::core::properties::{self, OpEntry, ServerProperties};
use crate::core::server::{LaunchConfig, ServerManifest, ServerState, SoftwareKind, ARTIFACT_FILE};

use super::classifier::{LineEvent, LogClassifier};
use super::handle::{OutputLines, ProcessHandle};
use super::log_buffer::LogBuffer;
use super::observers::{Callback, ServerObservers};

/// Time a server gets to exit after the stop command before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

const STOP_COMMAND: &str = "stop";
const INGESTION_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of a server for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub software: SoftwareKind,
    pub game_version: String,
    pub path: PathBuf,
    pub state: ServerState,
    pub pid: Option<u32>,
    pub online_players: Vec<String>,
    pub launch: LaunchConfig,
}

/// Mutable runtime of one server, guarded by a single lock.
struct Runtime {
    state: ServerState,
    /// Present iff `state.is_live()`.
    process: Option<Arc<ProcessHandle>>,
    online_players: Vec<String>,
    logs: LogBuffer,
    stop_requested: bool,
    restart_requested: bool,
    /// Set to make the ingestion loop stop consuming output early.
    cancel: Arc<AtomicBool>,
    /// Incremented per launch so a stale thread never touches a newer run.
    run_id: u64,
    /// Fires when the current run's ingestion loop has resolved the exit.
    ingestion_done: Option<Receiver<()>>,
    /// Transitions not yet delivered to state observers, in order.
    pending_states: VecDeque<ServerState>,
}

/// One supervised server process (the aggregate root of a server).
pub struct ManagedServer {
    name: String,
    software: SoftwareKind,
    game_version: String,
    path: PathBuf,
    created_at: Option<DateTime<Utc>>,
    launch: Mutex<LaunchConfig>,
    fallback_java: Option<PathBuf>,
    grace_period: Duration,
    classifier: LogClassifier,
    runtime: Mutex<Runtime>,
    state_changed: Condvar,
    /// Held while delivering state notifications.
    notify_gate: Mutex<()>,
    observers: ServerObservers,
}

impl ManagedServer {
    pub fn new(manifest: ServerManifest, path: PathBuf) -> Self {
        Self {
            classifier: LogClassifier::for_software(manifest.software),
            name: manifest.name,
            software: manifest.software,
            game_version: manifest.game_version,
            path,
            created_at: manifest.created_at,
            launch: Mutex::new(manifest.launch),
            fallback_java: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            runtime: Mutex::new(Runtime {
                state: ServerState::Stopped,
                process: None,
                online_players: Vec::new(),
                logs: LogBuffer::new(),
                stop_requested: false,
                restart_requested: false,
                cancel: Arc::new(AtomicBool::new(false)),
                run_id: 0,
                ingestion_done: None,
                pending_states: VecDeque::new(),
            }),
            state_changed: Condvar::new(),
            notify_gate: Mutex::new(()),
            observers: ServerObservers::default(),
        }
    }

    /// Load the server whose manifest lives in `server_dir`.
    pub fn from_dir(server_dir: &Path) -> ManagerResult<Self> {
        let manifest = ServerManifest::load(server_dir)?;
        Ok(Self::new(manifest, server_dir.to_path_buf()))
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_fallback_java(mut self, java: Option<PathBuf>) -> Self {
        self.fallback_java = java;
        self
    }

    pub fn with_classifier(mut self, classifier: LogClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    // ── Accessors ───────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn software(&self) -> SoftwareKind {
        self.software
    }

    pub fn game_version(&self) -> &str {
        &self.game_version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn state(&self) -> ServerState {
        self.lock_runtime().state
    }

    pub fn online_players(&self) -> Vec<String> {
        self.lock_runtime().online_players.clone()
    }

    /// OS process id while a process is attached.
    pub fn pid(&self) -> Option<u32> {
        self.lock_runtime().process.as_ref().map(|p| p.pid())
    }

    pub fn launch_config(&self) -> LaunchConfig {
        self.launch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn manifest(&self) -> ServerManifest {
        let mut manifest =
            ServerManifest::new(self.name.clone(), self.software, self.game_version.clone());
        manifest.created_at = self.created_at;
        manifest.launch = self.launch_config();
        manifest
    }

    pub fn info(&self) -> ServerInfo {
        let (state, pid, online_players) = {
            let rt = self.lock_runtime();
            (
                rt.state,
                rt.process.as_ref().map(|p| p.pid()),
                rt.online_players.clone(),
            )
        };
        ServerInfo {
            name: self.name.clone(),
            software: self.software,
            game_version: self.game_version.clone(),
            path: self.path.clone(),
            state,
            pid,
            online_players,
            launch: self.launch_config(),
        }
    }

    /// The most recent `limit` console lines, oldest first; all buffered
    /// lines when `limit` is zero.
    pub fn recent_logs(&self, limit: usize) -> Vec<String> {
        self.lock_runtime().logs.recent(limit)
    }

    // ── Configuration & files ───────────────────────────

    /// Validate, apply and persist new launch settings. Takes effect on the
    /// next start.
    pub fn update_launch_config(&self, config: LaunchConfig) -> ManagerResult<()> {
        config.validate()?;
        *self.launch.lock().unwrap_or_else(PoisonError::into_inner) = config;
        self.manifest().save(&self.path)
    }

    pub fn properties(&self) -> ManagerResult<ServerProperties> {
        ServerProperties::load(&self.path)
    }

    /// Change one existing `server.properties` key and write the file back.
    pub fn set_property(&self, key: &str, value: &str) -> ManagerResult<()> {
        let mut props = self.properties()?;
        props.set_from_str(key, value)?;
        props.save(&self.path)
    }

    pub fn ops(&self) -> Vec<OpEntry> {
        properties::read_ops(&self.path)
    }

    pub fn accept_eula(&self) -> ManagerResult<()> {
        properties::accept_eula(&self.path)
    }

    // ── Observers ───────────────────────────────────────

    pub fn subscribe_state_changed(&self, callback: Callback<ServerState>) -> bool {
        self.observers.state_changed.subscribe(callback)
    }

    pub fn unsubscribe_state_changed(&self, callback: &Callback<ServerState>) -> bool {
        self.observers.state_changed.unsubscribe(callback)
    }

    pub fn subscribe_log_line(&self, callback: Callback<str>) -> bool {
        self.observers.log_line.subscribe(callback)
    }

    pub fn unsubscribe_log_line(&self, callback: &Callback<str>) -> bool {
        self.observers.log_line.unsubscribe(callback)
    }

    pub fn subscribe_player_joined(&self, callback: Callback<str>) -> bool {
        self.observers.player_joined.subscribe(callback)
    }

    pub fn unsubscribe_player_joined(&self, callback: &Callback<str>) -> bool {
        self.observers.player_joined.unsubscribe(callback)
    }

    pub fn subscribe_player_left(&self, callback: Callback<str>) -> bool {
        self.observers.player_left.subscribe(callback)
    }

    pub fn unsubscribe_player_left(&self, callback: &Callback<str>) -> bool {
        self.observers.player_left.unsubscribe(callback)
    }

    // ── Lifecycle ───────────────────────────────────────

    /// Launch the server process.
    ///
    /// Fails with `AlreadyRunning` while a process is attached and with
    /// `MissingArtifact` when `server.jar` is absent; the state is left
    /// untouched on any failure.
    pub fn start(self: &Arc<Self>) -> ManagerResult<()> {
        let pid = {
            let mut rt = self.lock_runtime();
            if rt.state.is_live() {
                return Err(ManagerError::AlreadyRunning(self.name.clone()));
            }

            let jar_path = self.path.join(ARTIFACT_FILE);
            if !jar_path.is_file() {
                return Err(ManagerError::MissingArtifact(jar_path));
            }

            let command = build_launch_command(
                &self.path,
                &self.launch_config(),
                self.fallback_java.as_deref(),
            );
            info!("Starting server {}", self.name);
            debug!("Command (copy/paste): {}", command.display());

            let process = Arc::new(ProcessHandle::spawn(&command, &self.path)?);
            let run_id = rt.run_id + 1;
            let cancel = Arc::new(AtomicBool::new(false));
            let (done_tx, done_rx) = mpsc::channel();

            // The reader blocks on the runtime lock until this run is
            // recorded below, so it never observes the previous run.
            if let Err(e) = self.spawn_ingestion(run_id, &process, cancel.clone(), done_tx) {
                error!("Cannot start console reader for {}: {}", self.name, e);
                abandon(&process);
                return Err(ManagerError::Launch(e.to_string()));
            }

            rt.run_id = run_id;
            rt.process = Some(process.clone());
            rt.online_players.clear();
            rt.stop_requested = false;
            rt.restart_requested = false;
            rt.cancel = cancel;
            rt.ingestion_done = Some(done_rx);
            self.set_state(&mut rt, ServerState::Starting);
            process.pid()
        };
        self.publish_states();

        info!("Server {} launched (PID {})", self.name, pid);
        Ok(())
    }

    fn spawn_ingestion(
        self: &Arc<Self>,
        run_id: u64,
        process: &Arc<ProcessHandle>,
        cancel: Arc<AtomicBool>,
        done: Sender<()>,
    ) -> std::io::Result<()> {
        let output = process
            .take_output()
            .ok_or_else(|| std::io::Error::other("process output already taken"))?;
        let server = Arc::clone(self);
        let process = Arc::clone(process);
        thread::Builder::new()
            .name(format!("ingest-{}", self.name))
            .spawn(move || server.ingest(run_id, process, output, cancel, done))
            .map(|_| ())
    }

    /// Ask the server to stop. Returns without waiting for the exit.
    ///
    /// No-op when nothing is running or a stop is already in progress.
    pub fn stop(self: &Arc<Self>) -> ManagerResult<()> {
        self.request_stop(false)
    }

    /// Stop then start again. Starts directly when nothing is running.
    pub fn restart(self: &Arc<Self>) -> ManagerResult<()> {
        self.request_stop(true)
    }

    fn request_stop(self: &Arc<Self>, restart: bool) -> ManagerResult<()> {
        let (run_id, process, cancel, done_rx) = {
            let mut rt = self.lock_runtime();
            let current = rt.state;
            match current {
                ServerState::Starting | ServerState::Running => {}
                ServerState::Stopping => {
                    if restart {
                        rt.restart_requested = true;
                    }
                    return Ok(());
                }
                ServerState::Stopped | ServerState::Crashed => {
                    drop(rt);
                    return if restart { self.start() } else { Ok(()) };
                }
            }

            rt.stop_requested = true;
            rt.restart_requested = restart;
            self.set_state(&mut rt, ServerState::Stopping);
            let Some(process) = rt.process.clone() else {
                error!("Server {} is {} without a process", self.name, rt.state);
                return Ok(());
            };
            (rt.run_id, process, rt.cancel.clone(), rt.ingestion_done.take())
        };
        self.publish_states();

        info!("Stopping server {}", self.name);
        if let Err(e) = process.write_line(STOP_COMMAND) {
            warn!(
                "Cannot send stop command to {} ({}), terminating",
                self.name, e
            );
            if let Err(e) = process.signal_stop() {
                error!("Cannot terminate {}: {}", self.name, e);
            }
        }

        let server = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("stop-{}", self.name))
            .spawn(move || server.await_stop(run_id, process, cancel, done_rx));
        if let Err(e) = spawned {
            return Err(ManagerError::Other(format!(
                "cannot wait for {} to stop: {}",
                self.name, e
            )));
        }
        Ok(())
    }

    /// Drop a restart queued by `restart()` while the server was stopping.
    /// Returns whether one was pending.
    pub fn cancel_restart(&self) -> bool {
        std::mem::take(&mut self.lock_runtime().restart_requested)
    }

    /// Kill the process immediately, without the stop command or grace period.
    pub fn kill(&self) -> ManagerResult<()> {
        let process = {
            let mut rt = self.lock_runtime();
            if !rt.state.is_live() {
                return Ok(());
            }
            rt.stop_requested = true;
            rt.restart_requested = false;
            rt.cancel.store(true, Ordering::SeqCst);
            rt.process.clone()
        };

        if let Some(process) = process {
            warn!("Killing server {} (PID {})", self.name, process.pid());
            process.force_kill().map_err(|source| ManagerError::Io {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Write one line to the server console.
    pub fn send_command(&self, command: &str) -> ManagerResult<()> {
        let process = {
            let rt = self.lock_runtime();
            if !rt.state.accepts_commands() {
                return Err(ManagerError::NotRunning(self.name.clone()));
            }
            rt.process
                .clone()
                .ok_or_else(|| ManagerError::NotRunning(self.name.clone()))?
        };

        process
            .write_line(command)
            .map_err(|source| ManagerError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// Block until `predicate` holds for the current state or `timeout`
    /// elapses. Returns the state observed last.
    pub fn wait_for_state<F>(&self, timeout: Duration, predicate: F) -> ServerState
    where
        F: Fn(ServerState) -> bool,
    {
        let rt = self.lock_runtime();
        let (rt, _) = self
            .state_changed
            .wait_timeout_while(rt, timeout, |rt| !predicate(rt.state))
            .unwrap_or_else(PoisonError::into_inner);
        rt.state
    }

    // ── Internals ───────────────────────────────────────

    fn lock_runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a transition. Same-state transitions are ignored.
    fn set_state(&self, rt: &mut Runtime, state: ServerState) -> bool {
        if rt.state == state {
            return false;
        }
        debug!("Server {}: {} -> {}", self.name, rt.state, state);
        rt.state = state;
        rt.pending_states.push_back(state);
        self.state_changed.notify_all();
        true
    }

    /// Deliver queued transitions to state observers in order.
    ///
    /// Whoever holds the gate drains the queue; other callers (including an
    /// observer that triggers a transition) leave their entry for it.
    fn publish_states(&self) {
        loop {
            let _gate = match self.notify_gate.try_lock() {
                Ok(gate) => gate,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            loop {
                let next = self.lock_runtime().pending_states.pop_front();
                match next {
                    Some(state) => self.observers.state_changed.notify(&state),
                    None => break,
                }
            }
            drop(_gate);
            if self.lock_runtime().pending_states.is_empty() {
                return;
            }
        }
    }

    fn ingest(
        self: Arc<Self>,
        run_id: u64,
        process: Arc<ProcessHandle>,
        output: OutputLines,
        cancel: Arc<AtomicBool>,
        done: Sender<()>,
    ) {
        for item in output {
            if cancel.load(Ordering::SeqCst) {
                debug!("Console reader for {} cancelled", self.name);
                break;
            }
            match item {
                Ok(line) => self.handle_line(&line),
                Err(e) => {
                    error!("Error reading logs of {}: {}", self.name, e);
                    break;
                }
            }
        }

        self.resolve_exit(run_id, &process);
        let _ = done.send(());
    }

    /// Buffer, classify and publish one console line.
    fn handle_line(&self, line: &str) {
        let mut joined = None;
        let mut left = None;
        {
            let mut rt = self.lock_runtime();
            rt.logs.push(line);

            for event in self.classifier.classify(line, &rt.online_players) {
                match event {
                    LineEvent::Ready => {
                        if rt.state == ServerState::Starting {
                            info!("Server {} is ready", self.name);
                            self.set_state(&mut rt, ServerState::Running);
                        }
                    }
                    LineEvent::CrashIndicator => {
                        warn!("Crash indicator in {} logs: {}", self.name, line);
                    }
                    LineEvent::PlayerJoined(player) => {
                        rt.online_players.push(player.clone());
                        joined = Some(player);
                    }
                    LineEvent::PlayerLeft(player) => {
                        match rt.online_players.iter().position(|p| *p == player) {
                            Some(index) => {
                                rt.online_players.remove(index);
                                left = Some(player);
                            }
                            None => debug!("{} left {} but was not online", player, self.name),
                        }
                    }
                }
            }
        }

        self.publish_states();

        if let Some(player) = joined {
            info!("Player joined {}: {}", self.name, player);
            self.observers.player_joined.notify(&player);
        }
        if let Some(player) = left {
            info!("Player left {}: {}", self.name, player);
            self.observers.player_left.notify(&player);
        }

        self.observers.log_line.notify(line);
    }

    /// Collect the exit status and settle the final state of run `run_id`.
    fn resolve_exit(&self, run_id: u64, process: &ProcessHandle) {
        let exit_code = match process.wait(self.grace_period) {
            Ok(code) => code,
            Err(_) => {
                warn!(
                    "Server {} closed its output but did not exit, killing",
                    self.name
                );
                let _ = process.force_kill();
                process.wait_unbounded().unwrap_or(None)
            }
        };
        process.close_stdin();

        let final_state = {
            let mut rt = self.lock_runtime();
            if rt.run_id != run_id {
                return;
            }
            let final_state = ServerState::after_exit(rt.stop_requested, exit_code);
            rt.process = None;
            rt.cancel.store(true, Ordering::SeqCst);
            self.set_state(&mut rt, final_state);
            final_state
        };

        match final_state {
            ServerState::Stopped => info!("Server {} stopped (exit code {:?})", self.name, exit_code),
            _ => error!("Server {} crashed with exit code {:?}", self.name, exit_code),
        }
        self.publish_states();
    }

    fn await_stop(
        self: Arc<Self>,
        run_id: u64,
        process: Arc<ProcessHandle>,
        cancel: Arc<AtomicBool>,
        ingestion_done: Option<Receiver<()>>,
    ) {
        match process.wait(self.grace_period) {
            Ok(code) => debug!("Server {} exited with {:?}", self.name, code),
            Err(ManagerError::Timeout(_)) => {
                warn!("Server {} stop timeout, killing...", self.name);
                if let Err(e) = process.force_kill() {
                    error!("Cannot kill {}: {}", self.name, e);
                }
                if let Err(e) = process.wait_unbounded() {
                    error!("Cannot reap {}: {}", self.name, e);
                }
            }
            Err(e) => error!("Waiting for {} failed: {}", self.name, e),
        }

        cancel.store(true, Ordering::SeqCst);

        let ingestion_finished = match ingestion_done {
            Some(rx) => !matches!(
                rx.recv_timeout(INGESTION_JOIN_TIMEOUT),
                Err(RecvTimeoutError::Timeout)
            ),
            None => true,
        };

        let restart = {
            let mut rt = self.lock_runtime();
            let restart = rt.run_id == run_id && rt.restart_requested;
            rt.restart_requested = false;
            restart
        };

        if !restart {
            return;
        }
        if !ingestion_finished {
            warn!(
                "Not restarting {}: console reader is still draining output",
                self.name
            );
            return;
        }
        info!("Restarting server {}", self.name);
        if let Err(e) = self.start() {
            error!("Restart of {} failed: {}", self.name, e);
        }
    }
}

/// Kill and reap a process that never became part of a run.
fn abandon(process: &ProcessHandle) {
    if let Err(e) = process.force_kill() {
        error!("Cannot kill process {}: {}", process.pid(), e);
    }
    let _ = process.wait(Duration::from_secs(5));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn server_in(dir: &Path) -> Arc<ManagedServer> {
        let manifest = ServerManifest::new("test".into(), SoftwareKind::Vanilla, "1.21.4".into());
        Arc::new(ManagedServer::new(manifest, dir.to_path_buf()))
    }

    fn force_state(server: &ManagedServer, state: ServerState) {
        let mut rt = server.lock_runtime();
        rt.state = state;
    }

    fn record_states(server: &ManagedServer) -> Arc<Mutex<Vec<ServerState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        server.subscribe_state_changed(Arc::new(move |state: &ServerState| {
            sink.lock().unwrap().push(*state);
        }));
        seen
    }

    #[test]
    fn ready_line_moves_starting_to_running_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        force_state(&server, ServerState::Starting);
        let seen = record_states(&server);

        server.handle_line("[12:00:00] [Server thread/INFO]: Preparing level \"world\"");
        assert_eq!(server.state(), ServerState::Starting);

        server.handle_line("[12:00:03] [Server thread/INFO]: Done (3.1s)! For help, type \"help\"");
        server.handle_line("[12:00:04] [Server thread/INFO]: Done (3.1s)! For help, type \"help\"");
        assert_eq!(server.state(), ServerState::Running);
        assert_eq!(*seen.lock().unwrap(), vec![ServerState::Running]);
    }

    #[test]
    fn state_stays_starting_without_ready_line() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        force_state(&server, ServerState::Starting);

        for line in [
            "[12:00:00] [Server thread/INFO]: Starting minecraft server version 1.21.4",
            "[12:00:01] [Server thread/ERROR]: Encountered an unexpected exception",
            "[12:00:02] [Server thread/INFO]: Preparing spawn area: 83%",
        ] {
            server.handle_line(line);
        }
        assert_eq!(server.state(), ServerState::Starting);
    }

    #[test]
    fn ready_line_outside_starting_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());

        server.handle_line("[12:00:03] [Server thread/INFO]: Done (3.1s)!");
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn join_and_leave_update_online_players() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let joined = Arc::new(Mutex::new(Vec::new()));
        let left = Arc::new(Mutex::new(Vec::new()));
        {
            let joined = joined.clone();
            server.subscribe_player_joined(Arc::new(move |name: &str| {
                joined.lock().unwrap().push(name.to_string());
            }));
            let left = left.clone();
            server.subscribe_player_left(Arc::new(move |name: &str| {
                left.lock().unwrap().push(name.to_string());
            }));
        }

        server.handle_line(
            "[12:00:00] [Server thread/INFO]: Steve[/127.0.0.1] logged in with entity id 5",
        );
        server.handle_line("<Steve> hello logged in with entity id");
        assert_eq!(server.online_players(), vec!["Steve"]);

        server.handle_line("[12:01:00] [Server thread/INFO]: Alex lost connection: Disconnected");
        server.handle_line("[12:02:00] [Server thread/INFO]: Steve lost connection: Disconnected");
        assert!(server.online_players().is_empty());

        assert_eq!(*joined.lock().unwrap(), vec!["Steve"]);
        assert_eq!(*left.lock().unwrap(), vec!["Steve"]);
    }

    #[test]
    fn log_lines_are_buffered_and_published_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        server.subscribe_log_line(Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        }));

        for i in 0..5 {
            server.handle_line(&format!("line {i}"));
        }
        assert_eq!(server.recent_logs(2), vec!["line 3", "line 4"]);
        assert_eq!(server.recent_logs(0).len(), 5);
        assert_eq!(seen.lock().unwrap().len(), 5);
        assert_eq!(seen.lock().unwrap()[0], "line 0");
    }

    #[test]
    fn start_without_artifact_fails_and_stays_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let seen = record_states(&server);

        assert!(matches!(
            server.start(),
            Err(ManagerError::MissingArtifact(_))
        ));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.pid().is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn start_while_live_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        std::fs::write(dir.path().join(ARTIFACT_FILE), b"jar").unwrap();

        force_state(&server, ServerState::Running);
        assert!(matches!(
            server.start(),
            Err(ManagerError::AlreadyRunning(_))
        ));
        assert_eq!(server.state(), ServerState::Running);
    }

    #[test]
    fn stop_when_not_running_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let seen = record_states(&server);

        server.stop().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);

        force_state(&server, ServerState::Crashed);
        server.stop().unwrap();
        assert_eq!(server.state(), ServerState::Crashed);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn restart_when_not_running_behaves_like_start() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());

        // Same guard as start(): no artifact, no transition.
        assert!(matches!(
            server.restart(),
            Err(ManagerError::MissingArtifact(_))
        ));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[test]
    fn send_command_requires_running_or_stopping() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());

        assert!(matches!(
            server.send_command("say hi"),
            Err(ManagerError::NotRunning(_))
        ));
        force_state(&server, ServerState::Starting);
        assert!(matches!(
            server.send_command("say hi"),
            Err(ManagerError::NotRunning(_))
        ));
    }

    #[test]
    fn duplicate_state_subscription_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let callback: Callback<ServerState> = Arc::new(move |_state: &ServerState| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(server.subscribe_state_changed(callback.clone()));
        assert!(!server.subscribe_state_changed(callback.clone()));
        force_state(&server, ServerState::Starting);
        server.handle_line("INFO]: Done (1.0s)!");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(server.unsubscribe_state_changed(&callback));
        assert!(!server.unsubscribe_state_changed(&callback));
    }

    #[test]
    fn transitions_triggered_from_observers_keep_order() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        force_state(&server, ServerState::Starting);
        let seen = record_states(&server);

        // An observer that reacts to RUNNING by forcing another transition.
        let weak = Arc::downgrade(&server);
        server.subscribe_state_changed(Arc::new(move |state: &ServerState| {
            if *state == ServerState::Running {
                if let Some(server) = weak.upgrade() {
                    let mut rt = server.lock_runtime();
                    server.set_state(&mut rt, ServerState::Stopping);
                    drop(rt);
                    server.publish_states();
                }
            }
        }));

        server.handle_line("INFO]: Done (1.0s)!");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ServerState::Running, ServerState::Stopping]
        );
    }

    #[test]
    fn custom_indicators_drive_line_handling() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = ServerManifest::new("test".into(), SoftwareKind::Paper, "1.21.4".into());
        let server = Arc::new(
            ManagedServer::new(manifest, dir.path().to_path_buf()).with_classifier(
                LogClassifier::default()
                    .with_ready_indicator("Listening on")
                    .with_crash_indicator("watchdog"),
            ),
        );
        force_state(&server, ServerState::Starting);

        server.handle_line("[12:00:00] [Server thread/WARN]: Watchdog fired");
        assert_eq!(server.state(), ServerState::Starting);
        server.handle_line("[12:00:01] [Server thread/INFO]: Listening on 0.0.0.0:25565");
        assert_eq!(server.state(), ServerState::Running);
        assert_eq!(server.recent_logs(0).len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn failed_console_reader_leaves_state_untouched() {
        use crate::core::launch::LaunchCommand;

        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let seen = record_states(&server);
        let command = LaunchCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), "exec sleep 30".into()],
        };
        let process = Arc::new(ProcessHandle::spawn(&command, dir.path()).unwrap());
        let cancel = Arc::new(AtomicBool::new(false));
        let (done_tx, _done_rx) = mpsc::channel();

        process.take_output().unwrap();
        assert!(server
            .spawn_ingestion(1, &process, cancel, done_tx)
            .is_err());

        abandon(&process);
        assert!(process.try_exit_code().unwrap().is_some());
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.pid().is_none());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn restart_requested_while_stopping_can_be_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        force_state(&server, ServerState::Stopping);

        server.restart().unwrap();
        assert!(server.cancel_restart());
        assert!(!server.cancel_restart());
        assert_eq!(server.state(), ServerState::Stopping);
    }

    #[test]
    fn update_launch_config_validates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());

        let bad = LaunchConfig {
            min_ram_gb: Some(8),
            ..LaunchConfig::default()
        };
        assert!(server.update_launch_config(bad).is_err());

        let good = LaunchConfig::default().with_max_ram_gb(6);
        server.update_launch_config(good.clone()).unwrap();
        assert_eq!(server.launch_config(), good);
        assert_eq!(ServerManifest::load(dir.path()).unwrap().launch, good);
    }
}
