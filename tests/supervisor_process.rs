//! Lifecycle scenarios against real child processes. A small shell script
//! stands in for the Java runtime and ignores the JVM arguments it is given.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lodestone_lib::core::error::ManagerError;
use lodestone_lib::core::server::{ServerManifest, ServerState, SoftwareKind, ARTIFACT_FILE};
use lodestone_lib::core::supervisor::ManagedServer;

const GRACE: Duration = Duration::from_secs(2);
const SETTLE: Duration = Duration::from_secs(15);

const READY_LINE: &str = "[12:00:00] [Server thread/INFO]: Done (0.1s)! For help, type \"help\"";

/// Prints the ready line, echoes commands, exits with `stop_code` on `stop`.
fn echo_server(stop_code: i32) -> String {
    format!(
        r#"echo "Starting minecraft server version 1.21.4"
echo '{READY_LINE}'
while read -r line; do
  case "$line" in
    stop) echo "Stopping the server"; exit {stop_code} ;;
    *) echo "echo: $line" ;;
  esac
done
exit 0
"#
    )
}

fn fake_server(dir: &Path, script: &str) -> Arc<ManagedServer> {
    let java = dir.join("fake-java");
    std::fs::write(&java, format!("#!/bin/sh\n{script}")).unwrap();
    std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::write(dir.join(ARTIFACT_FILE), b"").unwrap();

    let mut manifest = ServerManifest::new("fake".into(), SoftwareKind::Vanilla, "1.21.4".into());
    manifest.launch.java_path = Some(java);
    Arc::new(ManagedServer::new(manifest, dir.to_path_buf()).with_grace_period(GRACE))
}

/// Start, retrying while another test thread still holds the fresh script
/// open for writing ("Text file busy").
fn start(server: &Arc<ManagedServer>) {
    for _ in 0..20 {
        match server.start() {
            Ok(()) => return,
            Err(ManagerError::Launch(message)) if message.contains("busy") => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => panic!("start failed: {e}"),
        }
    }
    panic!("start kept failing with a busy executable");
}

fn record_states(server: &ManagedServer) -> Arc<Mutex<Vec<ServerState>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    server.subscribe_state_changed(Arc::new(move |state: &ServerState| {
        sink.lock().unwrap().push(*state);
    }));
    seen
}

fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

fn settle(server: &ManagedServer) -> ServerState {
    server.wait_for_state(SETTLE, |state| !state.is_live())
}

#[test]
fn clean_stop_resolves_to_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(dir.path(), &echo_server(0));
    let states = record_states(&server);

    start(&server);
    assert!(server.pid().is_some());
    assert_eq!(
        server.wait_for_state(SETTLE, |s| s == ServerState::Running),
        ServerState::Running
    );

    server.send_command("say hello").unwrap();
    assert!(eventually(SETTLE, || server
        .recent_logs(0)
        .iter()
        .any(|line| line == "echo: say hello")));

    server.stop().unwrap();
    assert_eq!(settle(&server), ServerState::Stopped);
    assert!(server.pid().is_none());
    assert!(eventually(SETTLE, || states.lock().unwrap().len() == 4));
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ServerState::Starting,
            ServerState::Running,
            ServerState::Stopping,
            ServerState::Stopped
        ]
    );
}

#[test]
fn exit_without_stop_request_is_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(dir.path(), &format!("echo '{READY_LINE}'\nexit 0\n"));

    start(&server);
    assert_eq!(settle(&server), ServerState::Crashed);
    assert!(server
        .recent_logs(0)
        .iter()
        .any(|line| line.contains("Done (0.1s)")));
}

#[test]
fn nonzero_exit_after_stop_is_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(dir.path(), &echo_server(3));

    start(&server);
    server.wait_for_state(SETTLE, |s| s == ServerState::Running);
    server.stop().unwrap();
    assert_eq!(settle(&server), ServerState::Crashed);
}

#[test]
fn stop_with_closed_stdin_terminates_within_grace() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(
        dir.path(),
        &format!("exec 0<&-\necho '{READY_LINE}'\nexec sleep 60\n"),
    );

    start(&server);
    assert_eq!(
        server.wait_for_state(SETTLE, |s| s == ServerState::Running),
        ServerState::Running
    );

    let began = Instant::now();
    server.stop().unwrap();
    let state = server.wait_for_state(GRACE + Duration::from_secs(1), |s| !s.is_live());
    assert!(matches!(state, ServerState::Stopped | ServerState::Crashed));
    assert!(began.elapsed() < GRACE + Duration::from_secs(1));
}

#[test]
fn unresponsive_server_is_killed_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(
        dir.path(),
        &format!("trap '' TERM\necho '{READY_LINE}'\nwhile read -r line; do :; done\nexit 0\n"),
    );

    start(&server);
    server.wait_for_state(SETTLE, |s| s == ServerState::Running);

    let began = Instant::now();
    server.stop().unwrap();
    assert_eq!(server.state(), ServerState::Stopping);
    // A second stop while stopping changes nothing.
    server.stop().unwrap();

    assert_eq!(settle(&server), ServerState::Crashed);
    assert!(began.elapsed() >= GRACE);
}

#[test]
fn restart_runs_a_fresh_process() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(dir.path(), &echo_server(0));
    let states = record_states(&server);

    start(&server);
    server.wait_for_state(SETTLE, |s| s == ServerState::Running);
    let first_pid = server.pid();

    server.restart().unwrap();
    assert!(eventually(SETTLE, || states.lock().unwrap().len() == 6
        && server.state() == ServerState::Running));
    assert_eq!(
        *states.lock().unwrap(),
        vec![
            ServerState::Starting,
            ServerState::Running,
            ServerState::Stopping,
            ServerState::Stopped,
            ServerState::Starting,
            ServerState::Running
        ]
    );
    assert_ne!(server.pid(), first_pid);

    server.stop().unwrap();
    assert_eq!(settle(&server), ServerState::Stopped);
}

#[test]
fn second_start_is_rejected_while_live() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(dir.path(), &echo_server(0));

    start(&server);
    assert!(matches!(
        server.start(),
        Err(ManagerError::AlreadyRunning(_))
    ));

    server.stop().unwrap();
    settle(&server);
}

#[test]
fn kill_ends_a_running_server() {
    let dir = tempfile::tempdir().unwrap();
    let server = fake_server(dir.path(), &echo_server(0));

    start(&server);
    server.wait_for_state(SETTLE, |s| s == ServerState::Running);
    server.kill().unwrap();
    assert_eq!(settle(&server), ServerState::Crashed);
    assert!(matches!(
        server.send_command("say late"),
        Err(ManagerError::NotRunning(_))
    ));
}

#[test]
fn players_are_tracked_from_real_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = format!(
        r#"echo '{READY_LINE}'
echo '[12:00:01] [Server thread/INFO]: Steve[/127.0.0.1:51234] logged in with entity id 7 at (0.5, 64.0, 0.5)'
echo '[12:00:02] [Server thread/INFO]: Alex[/127.0.0.1:51235] logged in with entity id 8 at (0.5, 64.0, 0.5)'
echo '[12:00:03] [Server thread/INFO]: Alex lost connection: Disconnected'
while read -r line; do
  [ "$line" = stop ] && exit 0
done
"#
    );
    let server = fake_server(dir.path(), &script);
    let joined = Arc::new(Mutex::new(Vec::new()));
    let sink = joined.clone();
    server.subscribe_player_joined(Arc::new(move |name: &str| {
        sink.lock().unwrap().push(name.to_string());
    }));

    start(&server);
    assert!(eventually(SETTLE, || server.recent_logs(0).len() >= 4));
    assert_eq!(server.online_players(), vec!["Steve"]);
    assert_eq!(*joined.lock().unwrap(), vec!["Steve", "Alex"]);

    server.stop().unwrap();
    assert_eq!(settle(&server), ServerState::Stopped);
    assert!(server.online_players().contains(&"Steve".to_string()));
}

#[test]
fn missing_runtime_is_a_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(ARTIFACT_FILE), b"").unwrap();
    let mut manifest = ServerManifest::new("fake".into(), SoftwareKind::Paper, "1.21.4".into());
    manifest.launch.java_path = Some(dir.path().join("no-such-java"));
    let server = Arc::new(ManagedServer::new(manifest, dir.path().to_path_buf()));

    assert!(matches!(server.start(), Err(ManagerError::Launch(_))));
    assert_eq!(server.state(), ServerState::Stopped);
}
