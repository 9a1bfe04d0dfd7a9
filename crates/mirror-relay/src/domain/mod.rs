//! Domain layer for mirror-relay.
//!
//! Pure configuration types with no dependencies on I/O or networking.  The
//! target, event, and region types shared with other tools live in
//! `mirror-core`.

pub mod config;

pub use config::{RelayConfig, DEFAULT_DEBUGGER_URL};
