//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is populated by `main.rs` from defaults, an optional TOML file,
//! environment variables, and CLI flags, in that order of precedence.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) lets tests build a relay with whatever
//! timings they need.

use std::net::SocketAddr;
use std::time::Duration;

use mirror_core::{CaptureRegion, ResolverPolicy};

/// Default discovery address: the conventional `--remote-debugging-port`.
pub const DEFAULT_DEBUGGER_URL: &str = "ws://127.0.0.1:9222";

/// All runtime configuration for the relay.
///
/// Build this struct once at startup and wrap it in an `Arc` so it can be
/// shared cheaply across all viewer tasks.
///
/// # Example
///
/// ```rust
/// use mirror_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 3000);
/// assert_eq!(cfg.frames_per_second(), 5);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// The address and port the viewer WebSocket endpoint binds to.
    pub ws_bind_addr: SocketAddr,

    /// Remote debugging address of the source application.
    ///
    /// Written with the debugging-protocol scheme (`ws://`); discovery rewrites
    /// it to `http://` for the `/json` listing.
    pub debugger_url: String,

    /// The UI panel each capture is cropped to.
    pub region: CaptureRegion,

    /// Heuristics used to pick the application window.
    pub resolver: ResolverPolicy,

    /// Time between capture attempts (200 ms = 5 frames per second).
    pub capture_interval: Duration,

    /// Deadline for writing one frame to a viewer.  A slower viewer is
    /// disconnected rather than allowed to back up the capture loop.
    pub write_timeout: Duration,

    /// How long a region capture waits for the region to become visible
    /// before falling back to a full-frame capture.
    pub region_wait: Duration,

    /// Upper bound on concurrently running scroll actions per viewer.
    pub max_inflight_actions: usize,

    /// How long a closing viewer waits for its in-flight actions to finish.
    pub drain_timeout: Duration,
}

impl RelayConfig {
    /// Effective capture rate, rounded down.
    pub fn frames_per_second(&self) -> u64 {
        let millis = self.capture_interval.as_millis().max(1) as u64;
        1000 / millis
    }
}

impl Default for RelayConfig {
    /// | Field                | Default                 |
    /// |----------------------|-------------------------|
    /// | ws_bind_addr         | `0.0.0.0:3000`          |
    /// | debugger_url         | `ws://127.0.0.1:9222`   |
    /// | region               | `auxiliary-bar`         |
    /// | capture_interval     | 200 ms                  |
    /// | write_timeout        | 500 ms                  |
    /// | region_wait          | 500 ms                  |
    /// | max_inflight_actions | 8                       |
    /// | drain_timeout        | 1 second                |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            debugger_url: DEFAULT_DEBUGGER_URL.to_string(),
            region: CaptureRegion::default(),
            resolver: ResolverPolicy::default(),
            capture_interval: Duration::from_millis(200),
            write_timeout: Duration::from_millis(500),
            region_wait: Duration::from_millis(500),
            max_inflight_actions: 8,
            drain_timeout: Duration::from_secs(1),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
