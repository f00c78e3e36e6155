// ─── Lodestone Core ───
// Minecraft server manager: provisioning, supervision and file helpers.
//
// Architecture:
//   core/
//     server/     — Manifest, launch config, lifecycle state
//     supervisor/ — Process handle, console classifier, log buffer,
//                   observers, managed-server state machine
//     launch/     — JVM command line
//     properties/ — server.properties, ops.json, eula.txt
//     provider/   — Vanilla and Paper jar resolution
//     downloader/ — Streaming, checksum-validated downloads
//     version/    — Mojang version manifest
//     registry/   — name → server registry + provisioning
//     state/      — Global application state

pub mod downloader;
pub mod error;
pub mod http;
pub mod launch;
pub mod properties;
pub mod provider;
pub mod registry;
pub mod server;
pub mod state;
pub mod supervisor;
pub mod version;
