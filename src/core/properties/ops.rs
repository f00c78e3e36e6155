//! Operator list (`ops.json`) written by the server.

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const OPS_FILE: &str = "ops.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpEntry {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub bypasses_player_limit: bool,
}

/// Operators of the server in `server_dir`. A missing or unreadable file
/// means no operators.
pub fn read_ops(server_dir: &Path) -> Vec<OpEntry> {
    let path = server_dir.join(OPS_FILE);
    let Ok(raw) = std::fs::read_to_string(&path) else {
        return Vec::new();
    };
    match serde_json::from_str(&raw) {
        Ok(ops) => ops,
        Err(e) => {
            tracing::warn!("Corrupt {:?}: {}", path, e);
            Vec::new()
        }
    }
}
