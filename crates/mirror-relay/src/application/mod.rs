//! Application layer for mirror-relay.
//!
//! The application layer knows *what* the relay does, but delegates *how*
//! to the infrastructure layer through the traits in [`remote`].
//!
//! # Responsibilities
//!
//! - Owning the single remote session and its capture fallback
//! - Running the per-viewer capture loop and event relay
//! - Supervising each viewer connection's lifecycle
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or speaking HTTP (that is infrastructure)
//! - The Chrome DevTools Protocol wire format (also infrastructure)
//! - Parsing CLI flags or config files (that is done in `main.rs`)

pub mod capture_loop;
pub mod event_relay;
pub mod remote;
pub mod shutdown;
pub mod supervisor;

pub use capture_loop::{CaptureExit, CaptureLoop, CaptureReport, CaptureState};
pub use event_relay::{run_event_relay, ActionDispatcher, DispatchStats, RelayReport};
pub use remote::{
    DebugEndpoint, DiscoveryError, FrameSource, RemoteControl, RemoteError, RemoteSession,
    ScriptRunner, SessionError,
};
pub use shutdown::ShutdownSignal;
pub use supervisor::{ConnectionReport, ConnectionSupervisor};
