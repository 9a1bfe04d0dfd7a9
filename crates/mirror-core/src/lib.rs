//! # mirror-core
//!
//! Shared library for the mirror relay containing the target selection
//! policy, the viewer event format, and the named capture regions.
//!
//! The crate has zero dependencies on sockets, async runtimes, or the remote
//! debugging transport.  Everything here is plain data and pure functions, so
//! the selection heuristics can be tested without a live debugging endpoint.
//!
//! # Architecture overview
//!
//! The relay mirrors a desktop application's window (an Electron or Chromium
//! surface reachable over the Chrome DevTools Protocol) to a remote viewer:
//!
//! - **`domain::target`** – The [`Target`] record returned by the debugging
//!   endpoint's `/json` listing.
//!
//! - **`domain::resolver`** – The ordered strategy chain that picks exactly
//!   one [`Target`] out of the listing.
//!
//! - **`domain::event`** – Messages sent by the viewer back to the relay and
//!   the scripts they translate into.
//!
//! - **`domain::region`** – Named UI panels the relay can crop captures to.

pub mod domain;

// Re-export the most-used types at the crate root so callers can write
// `mirror_core::Target` instead of `mirror_core::domain::target::Target`.
pub use domain::event::{scroll_script, EventDecodeError, ViewerEvent};
pub use domain::region::CaptureRegion;
pub use domain::resolver::{ResolveError, ResolverPolicy, Strategy, TargetResolver};
pub use domain::target::Target;
