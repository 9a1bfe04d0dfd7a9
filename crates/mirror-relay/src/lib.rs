//! mirror-relay library crate.
//!
//! Mirrors one panel of a Chromium-based desktop application to any number of
//! WebSocket viewers, and relays their scroll position back to the
//! application.
//!
//! # Architecture
//!
//! ```text
//! Viewer (binary PNG frames ← / {"y": n} →, WebSocket /ws)
//!         ↕
//! [mirror-relay]
//!   ├── domain/           RelayConfig
//!   ├── application/      RemoteSession, CaptureLoop, event relay,
//!   │                     ConnectionSupervisor
//!   └── infrastructure/
//!         ├── ws_server/  Viewer accept loop (tokio-tungstenite)
//!         ├── discovery/  GET /json target listing (reqwest)
//!         ├── cdp/        Chrome DevTools Protocol client
//!         └── config_file/ Optional TOML overlay
//!         ↕
//! Source application (--remote-debugging-port, CDP over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `mirror-core`, and reaches the
//!   outside world only through the traits in [`application::remote`].
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite`, and `reqwest`.

/// Domain layer: runtime configuration.
pub mod domain;

/// Application layer: session ownership, per-viewer tasks, supervision.
pub mod application;

/// Infrastructure layer: viewer server, discovery, CDP client, config file.
pub mod infrastructure;
