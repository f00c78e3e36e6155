// ─── Launch Command ───
// Builds the JVM command line that starts a server jar.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::server::{LaunchConfig, ARTIFACT_FILE};

const DEFAULT_JAVA: &str = "java";

/// Program plus arguments, independent of any spawned process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// A `std::process::Command` with piped stdin, rooted at `working_dir`.
    /// The caller wires stdout and stderr.
    pub fn to_command(&self, working_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.current_dir(working_dir);
        cmd.stdin(Stdio::piped());
        cmd
    }

    /// Shell-escaped rendering for logs (copy/paste friendly).
    pub fn display(&self) -> String {
        let program = shell_escape(&self.program.to_string_lossy());
        let args = self
            .args
            .iter()
            .map(|arg| shell_escape(arg))
            .collect::<Vec<_>>()
            .join(" ");

        if args.is_empty() {
            program
        } else {
            format!("{} {}", program, args)
        }
    }
}

/// `<java> [-Xms<min>G] -Xmx<max>G -jar <server_dir>/server.jar nogui [extra...]`
///
/// `fallback_java` is used when the server has no runtime of its own.
pub fn build_launch_command(
    server_dir: &Path,
    config: &LaunchConfig,
    fallback_java: Option<&Path>,
) -> LaunchCommand {
    let program = config
        .java_path
        .clone()
        .or_else(|| fallback_java.map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_JAVA));

    let mut args = Vec::with_capacity(5 + config.additional_args.len());
    if let Some(min) = config.min_ram_gb {
        args.push(format!("-Xms{}G", min));
    }
    args.push(format!("-Xmx{}G", config.max_ram_gb));
    args.push("-jar".to_string());
    args.push(server_dir.join(ARTIFACT_FILE).to_string_lossy().into_owned());
    args.push("nogui".to_string());
    args.extend(
        config
            .additional_args
            .iter()
            .filter(|arg| !arg.trim().is_empty())
            .cloned(),
    );

    LaunchCommand { program, args }
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}
