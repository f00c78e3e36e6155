// ─── Process Handle ───
// Owns the OS child process: stdin writer, merged output reader,
// wait/terminate/kill primitives. Escalation policy lives in the supervisor.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::launch::LaunchCommand;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A live child process with piped standard streams.
pub struct ProcessHandle {
    pid: u32,
    child: Mutex<Child>,
    stdin: Mutex<Option<ChildStdin>>,
    output: Mutex<Option<OutputLines>>,
}

impl ProcessHandle {
    /// Start `command` in `working_dir` with stdin piped and stdout/stderr
    /// sharing one pipe, so output lines keep the order the child wrote them.
    pub fn spawn(command: &LaunchCommand, working_dir: &Path) -> ManagerResult<Self> {
        let launch_error =
            |e: io::Error| ManagerError::Launch(format!("{}: {}", command.display(), e));

        let (reader, writer) = io::pipe().map_err(launch_error)?;
        let mut cmd = command.to_command(working_dir);
        cmd.stdout(writer.try_clone().map_err(launch_error)?);
        cmd.stderr(writer);
        let spawned = cmd.spawn();
        // The command holds our copies of the write end; the reader only sees
        // EOF once they are gone.
        drop(cmd);
        let mut child = spawned.map_err(launch_error)?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let (tx, rx) = mpsc::channel();
        spawn_pump(pid, reader, tx);

        debug!("Spawned process {} in {:?}", pid, working_dir);

        Ok(Self {
            pid,
            child: Mutex::new(child),
            stdin: Mutex::new(stdin),
            output: Mutex::new(Some(OutputLines { rx })),
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The output line sequence. Yields `Some` exactly once.
    pub fn take_output(&self) -> Option<OutputLines> {
        self.output
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Write `text` plus a newline to the process's stdin and flush.
    pub fn write_line(&self, text: &str) -> io::Result<()> {
        let mut guard = self.stdin.lock().unwrap_or_else(PoisonError::into_inner);
        let stdin = guard
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed"))?;

        let result = stdin
            .write_all(text.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .and_then(|_| stdin.flush());

        if result.is_err() {
            // A failed pipe never recovers; later writes fail fast.
            *guard = None;
        }
        result
    }

    /// Close our end of stdin.
    pub fn close_stdin(&self) {
        self.stdin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Best-effort polite termination (SIGTERM on unix).
    pub fn signal_stop(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            match signal::kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
                Ok(()) => Ok(()),
                // Already gone.
                Err(nix::errno::Errno::ESRCH) => Ok(()),
                Err(e) => Err(io::Error::other(e)),
            }
        }

        #[cfg(not(unix))]
        {
            self.force_kill()
        }
    }

    /// Kill the process outright (SIGKILL on unix).
    pub fn force_kill(&self) -> io::Result<()> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        match child.kill() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Exit status if the process has already exited.
    pub fn try_exit_code(&self) -> io::Result<Option<Option<i32>>> {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(child.try_wait()?.map(|status| status.code()))
    }

    /// Wait up to `timeout` for exit. The inner `Option` is the exit code,
    /// `None` when the process was ended by a signal.
    pub fn wait(&self, timeout: Duration) -> ManagerResult<Option<i32>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(code) = self.try_exit_code()? {
                return Ok(code);
            }
            if Instant::now() >= deadline {
                return Err(ManagerError::Timeout(timeout));
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Wait for exit without a deadline.
    ///
    /// Polls instead of blocking in `Child::wait` so other threads can still
    /// reach the child to kill it.
    pub fn wait_unbounded(&self) -> io::Result<Option<i32>> {
        loop {
            if let Some(code) = self.try_exit_code()? {
                return Ok(code);
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

/// Lines produced by the process (stdout and stderr interleaved as written,
/// terminators stripped).
///
/// Finite: ends once every holder of the write end has closed it. Not
/// restartable.
pub struct OutputLines {
    rx: Receiver<io::Result<String>>,
}

impl Iterator for OutputLines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.recv().ok()
    }
}

fn spawn_pump<R>(pid: u32, source: R, tx: Sender<io::Result<String>>)
where
    R: Read + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name(format!("pump-{pid}"))
        .spawn(move || pump_lines(source, tx));
    if let Err(e) = spawned {
        warn!("Cannot read output of process {}: {}", pid, e);
    }
}

fn pump_lines<R: Read>(source: R, tx: Sender<io::Result<String>>) {
    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Ok(line)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> LaunchCommand {
        LaunchCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
        }
    }

    #[test]
    fn reads_lines_from_both_streams() {
        let handle = ProcessHandle::spawn(
            &sh("echo out-line; echo err-line 1>&2; printf 'no-newline'"),
            Path::new("/"),
        )
        .unwrap();

        let lines: Vec<String> = handle
            .take_output()
            .unwrap()
            .map(|line| line.unwrap())
            .collect();
        assert_eq!(lines, vec!["out-line", "err-line", "no-newline"]);
        assert!(handle.take_output().is_none());
        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), Some(0));
    }

    #[test]
    fn interleaved_streams_keep_write_order() {
        let handle = ProcessHandle::spawn(
            &sh("i=0; while [ $i -lt 2000 ]; do echo o$i; echo e$i 1>&2; i=$((i+1)); done"),
            Path::new("/"),
        )
        .unwrap();

        let lines: Vec<String> = handle
            .take_output()
            .unwrap()
            .map(|line| line.unwrap())
            .collect();
        let expected: Vec<String> = (0..2000)
            .flat_map(|i| [format!("o{i}"), format!("e{i}")])
            .collect();
        assert_eq!(lines, expected);
        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), Some(0));
    }

    #[test]
    fn write_line_reaches_stdin() {
        let handle = ProcessHandle::spawn(&sh("read line; echo \"got $line\""), Path::new("/"))
            .unwrap();
        handle.write_line("hello").unwrap();

        let first = handle.take_output().unwrap().next().unwrap().unwrap();
        assert_eq!(first, "got hello");
        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), Some(0));
    }

    #[test]
    fn wait_times_out_then_kill_ends_process() {
        let handle = ProcessHandle::spawn(&sh("exec sleep 30"), Path::new("/")).unwrap();

        assert!(matches!(
            handle.wait(Duration::from_millis(100)),
            Err(ManagerError::Timeout(_))
        ));
        handle.force_kill().unwrap();
        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), None);
        // Killing an exited process is not an error.
        handle.force_kill().unwrap();
    }

    #[test]
    fn signal_stop_terminates() {
        let handle = ProcessHandle::spawn(&sh("exec sleep 30"), Path::new("/")).unwrap();
        handle.signal_stop().unwrap();
        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), None);
    }

    #[test]
    fn spawn_failure_is_a_launch_error() {
        let command = LaunchCommand {
            program: PathBuf::from("/definitely/not/a/java"),
            args: Vec::new(),
        };
        assert!(matches!(
            ProcessHandle::spawn(&command, Path::new("/")),
            Err(ManagerError::Launch(_))
        ));
    }

    #[test]
    fn write_after_close_fails() {
        let handle = ProcessHandle::spawn(&sh("exec sleep 30"), Path::new("/")).unwrap();
        handle.close_stdin();
        assert!(handle.write_line("stop").is_err());
        handle.force_kill().unwrap();
        handle.wait_unbounded().unwrap();
    }
}
