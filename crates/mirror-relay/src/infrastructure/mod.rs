//! Infrastructure layer for mirror-relay.
//!
//! The infrastructure layer handles all I/O: accepting viewer WebSocket
//! connections, listing targets over HTTP, and speaking the Chrome DevTools
//! Protocol to the chosen target.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener for viewer WebSocket connections
//! - Performing the WebSocket upgrade handshake and `/ws` routing
//! - Fetching the target list from the debugging endpoint
//! - Correlating CDP commands with their responses
//! - Loading the optional TOML config file
//!
//! # What does NOT belong here?
//!
//! - Target selection heuristics (that is `mirror-core`)
//! - Connection lifecycle and capture fallback (that is the application layer)
//! - Configuration precedence (that is done in `main.rs`)

pub mod cdp;
pub mod config_file;
pub mod discovery;
pub mod ws_server;

pub use cdp::{CdpConnection, CdpEndpoint};
pub use config_file::{ConfigError, FileConfig};
pub use discovery::{discovery_address, fetch_targets};
pub use ws_server::{run_server, serve};
