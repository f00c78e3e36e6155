pub mod file;
pub mod ops;

pub use file::{PropertyValue, ServerProperties, PROPERTIES_FILE};
pub use ops::{read_ops, OpEntry, OPS_FILE};

use std::path::Path;

use crate::core::error::{ManagerError, ManagerResult};

pub const EULA_FILE: &str = "eula.txt";

/// Mark the Minecraft EULA as accepted for the server in `server_dir`.
pub fn accept_eula(server_dir: &Path) -> ManagerResult<()> {
    let path = server_dir.join(EULA_FILE);
    std::fs::write(&path, "eula=true\n").map_err(|source| ManagerError::Io { path, source })
}

/// Whether `eula.txt` in `server_dir` contains `eula=true`.
pub fn eula_accepted(server_dir: &Path) -> bool {
    std::fs::read_to_string(server_dir.join(EULA_FILE))
        .map(|raw| {
            raw.lines()
                .any(|line| line.trim().eq_ignore_ascii_case("eula=true"))
        })
        .unwrap_or(false)
}
