pub mod provision;
pub mod servers;

pub use provision::{provision_server, validate_server_name, ProvisionRequest, PROPERTIES_HEADER};
pub use servers::{shut_down, shutdown_servers, ServerRegistry};
