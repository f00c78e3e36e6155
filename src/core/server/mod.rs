pub mod model;
pub mod state;

pub use model::{LaunchConfig, ServerManifest, SoftwareKind, ARTIFACT_FILE, MANIFEST_FILE};
pub use state::ServerState;
