pub mod commands;
pub mod console;
pub mod core;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use crate::core::error::ManagerResult;
use crate::core::state::AppState;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// filter. Logs go to stderr so console output stays readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lodestone_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load every server from the data directory and run the interactive console.
pub async fn run() -> ManagerResult<()> {
    tracing::info!("Lodestone server manager starting...");

    let mut state = AppState::new()?;
    state.load_servers().await?;

    console::run(Arc::new(Mutex::new(state))).await
}
