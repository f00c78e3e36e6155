// ─── Console ───
// Line-oriented front end over `commands`. One command per stdin line;
// `follow` streams a server's console to stdout until `unfollow`.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::commands::{self, CreateServerRequest, SharedState};
use crate::core::error::ManagerResult;
use crate::core::supervisor::Callback;

const DEFAULT_LOG_LINES: usize = 50;

const HELP: &str = "\
Commands:
  list                              list servers
  create <name> <software> <version> [max_ram_gb]
  start|stop|restart|kill <name>
  send <name> <command...>          write to the server console
  logs <name> [lines]               recent console output
  follow|unfollow <name>            stream console output
  props <name>                      show server.properties
  set <name> <key> <value>          change a property
  eula <name>                       accept the EULA
  versions <software>               installable versions
  delete <name>
  exit";

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    List,
    Create {
        name: String,
        software: String,
        version: String,
        max_ram_gb: Option<u32>,
    },
    Start(String),
    Stop(String),
    Restart(String),
    Kill(String),
    Send { name: String, command: String },
    Logs { name: String, limit: usize },
    Follow(String),
    Unfollow(String),
    Properties(String),
    Set { name: String, key: String, value: String },
    Eula(String),
    Versions(String),
    Delete(String),
    Exit,
}

fn usage(command: &str) -> String {
    format!("usage error for '{command}', type 'help'")
}

/// Parse one input line. Blank lines parse to `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    let Some((verb, rest)) = split_word(line) else {
        return Ok(None);
    };
    let args: Vec<&str> = rest.split_whitespace().collect();

    let one = |build: fn(String) -> ConsoleCommand| match args.as_slice() {
        [name] => Ok(build(name.to_string())),
        _ => Err(usage(verb)),
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "help" | "?" => ConsoleCommand::Help,
        "list" | "ls" => ConsoleCommand::List,
        "exit" | "quit" => ConsoleCommand::Exit,
        "start" => one(ConsoleCommand::Start)?,
        "stop" => one(ConsoleCommand::Stop)?,
        "restart" => one(ConsoleCommand::Restart)?,
        "kill" => one(ConsoleCommand::Kill)?,
        "follow" => one(ConsoleCommand::Follow)?,
        "unfollow" => one(ConsoleCommand::Unfollow)?,
        "props" | "properties" => one(ConsoleCommand::Properties)?,
        "eula" => one(ConsoleCommand::Eula)?,
        "versions" => one(ConsoleCommand::Versions)?,
        "delete" => one(ConsoleCommand::Delete)?,
        "create" => match args.as_slice() {
            [name, software, version] | [name, software, version, _] => {
                let max_ram_gb = match args.get(3) {
                    Some(raw) => Some(raw.parse().map_err(|_| usage(verb))?),
                    None => None,
                };
                ConsoleCommand::Create {
                    name: name.to_string(),
                    software: software.to_string(),
                    version: version.to_string(),
                    max_ram_gb,
                }
            }
            _ => return Err(usage(verb)),
        },
        "send" => {
            // The command text is passed through verbatim.
            let (name, command) = split_word(rest).ok_or_else(|| usage(verb))?;
            if command.is_empty() {
                return Err(usage(verb));
            }
            ConsoleCommand::Send {
                name: name.to_string(),
                command: command.to_string(),
            }
        }
        "logs" => match args.as_slice() {
            [name] => ConsoleCommand::Logs {
                name: name.to_string(),
                limit: DEFAULT_LOG_LINES,
            },
            [name, limit] => ConsoleCommand::Logs {
                name: name.to_string(),
                limit: limit.parse().map_err(|_| usage(verb))?,
            },
            _ => return Err(usage(verb)),
        },
        "set" => match args.as_slice() {
            [name, key, value] => ConsoleCommand::Set {
                name: name.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            },
            _ => return Err(usage(verb)),
        },
        other => return Err(format!("unknown command '{other}', type 'help'")),
    };
    Ok(Some(command))
}

/// First whitespace-separated word and the trimmed remainder.
fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((text, "")),
    }
}

/// Read commands from stdin until `exit`, EOF or Ctrl-C, then stop every
/// running server.
pub async fn run(state: SharedState) -> ManagerResult<()> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut followers: HashMap<String, Callback<str>> = HashMap::new();

    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };
        if command == ConsoleCommand::Exit {
            break;
        }
        if let Err(e) = execute(&state, command, &mut followers).await {
            println!("error: {e}");
        }
    }

    println!("Stopping servers...");
    commands::shutdown_all(&state).await
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn execute(
    state: &SharedState,
    command: ConsoleCommand,
    followers: &mut HashMap<String, Callback<str>>,
) -> ManagerResult<()> {
    match command {
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Exit => {}
        ConsoleCommand::List => {
            let servers = commands::list_servers(state).await?;
            if servers.is_empty() {
                println!("no servers");
            }
            for server in servers {
                let players = if server.online_players.is_empty() {
                    String::new()
                } else {
                    format!("  players: {}", server.online_players.join(", "))
                };
                println!(
                    "{:<20} {:<8} {:<10} {}{}",
                    server.name,
                    server.software.to_string(),
                    server.game_version,
                    server.state.to_string(),
                    players
                );
            }
        }
        ConsoleCommand::Create {
            name,
            software,
            version,
            max_ram_gb,
        } => {
            let request = CreateServerRequest {
                name,
                software,
                game_version: version,
                min_ram_gb: None,
                max_ram_gb,
            };
            let on_progress = |done: u64, total: Option<u64>| match total {
                Some(total) if total > 0 => print!("\rdownloading {}%", done * 100 / total),
                _ => print!("\rdownloading {} KiB", done / 1024),
            };
            let cancel = CancellationToken::new();
            let created = commands::create_server(state, request, &on_progress, &cancel).await;
            println!();
            let info = created?;
            println!("created {} ({:?})", info.name, info.path);
            println!("accept the EULA with 'eula {}' before starting", info.name);
        }
        ConsoleCommand::Start(name) => {
            let info = commands::start_server(state, &name).await?;
            println!("{} is {}", info.name, info.state);
        }
        ConsoleCommand::Stop(name) => {
            let info = commands::stop_server(state, &name).await?;
            println!("{} is {}", info.name, info.state);
        }
        ConsoleCommand::Restart(name) => {
            let info = commands::restart_server(state, &name).await?;
            println!("{} is {}", info.name, info.state);
        }
        ConsoleCommand::Kill(name) => commands::force_close_server(state, &name).await?,
        ConsoleCommand::Send { name, command } => {
            commands::send_command(state, &name, &command).await?
        }
        ConsoleCommand::Logs { name, limit } => {
            for line in commands::get_server_logs(state, &name, limit).await? {
                println!("{line}");
            }
        }
        ConsoleCommand::Follow(name) => {
            let server = state.lock().await.registry.get(&name)?;
            let prefix = name.clone();
            let callback: Callback<str> = Arc::new(move |line: &str| {
                println!("[{prefix}] {line}");
            });
            if let Some(previous) = followers.insert(name, callback.clone()) {
                server.unsubscribe_log_line(&previous);
            }
            server.subscribe_log_line(callback);
        }
        ConsoleCommand::Unfollow(name) => match followers.remove(&name) {
            Some(callback) => {
                let server = state.lock().await.registry.get(&name)?;
                server.unsubscribe_log_line(&callback);
            }
            None => warn!("Not following {}", name),
        },
        ConsoleCommand::Properties(name) => {
            for entry in commands::list_properties(state, &name).await? {
                println!("{}={}", entry.key, entry.value);
            }
        }
        ConsoleCommand::Set { name, key, value } => {
            commands::set_property(state, &name, &key, &value).await?
        }
        ConsoleCommand::Eula(name) => {
            commands::accept_eula(state, &name).await?;
            println!("EULA accepted for {name}");
        }
        ConsoleCommand::Versions(software) => {
            for group in commands::list_versions(state, &software).await? {
                println!("{}: {}", group.family, group.versions.join(" "));
            }
        }
        ConsoleCommand::Delete(name) => {
            followers.remove(&name);
            commands::delete_server(state, &name).await?;
            println!("deleted {name}");
        }
    }
    Ok(())
}
