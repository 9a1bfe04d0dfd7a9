//! Connection supervisor: the lifecycle of one viewer.
//!
//! ```text
//! accept ─► ViewerConnection
//!             ├─ spawn CaptureLoop (frames → viewer)
//!             ├─ run EventRelay inline (viewer → scripts)
//!             ├─ trigger shutdown (once)
//!             └─ join CaptureLoop
//! ```
//!
//! Either direction can end the connection.  A viewer that disconnects ends
//! the relay, which triggers shutdown and wakes the capture loop.  A viewer
//! that stops reading stalls a frame write past its deadline, which stops the
//! capture loop, which triggers shutdown and wakes the relay.  The supervisor
//! returns only after both tasks are gone.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::capture_loop::{CaptureLoop, CaptureReport};
use crate::application::event_relay::{run_event_relay, ActionDispatcher, RelayReport};
use crate::application::remote::{FrameSource, ScriptRunner};
use crate::application::shutdown::ShutdownSignal;
use crate::domain::RelayConfig;

/// Everything that happened on one viewer connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionReport {
    pub viewer_id: Uuid,
    pub relay: RelayReport,
    /// `None` if the capture task panicked.
    pub capture: Option<CaptureReport>,
}

/// Shared by all viewers; creates one [`CaptureLoop`] and one event relay per
/// connection.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    frames: Arc<dyn FrameSource>,
    scripts: Arc<dyn ScriptRunner>,
    config: Arc<RelayConfig>,
}

impl ConnectionSupervisor {
    /// Creates a supervisor pulling frames from `frames` and sending viewer
    /// actions to `scripts`.
    pub fn new(
        frames: Arc<dyn FrameSource>,
        scripts: Arc<dyn ScriptRunner>,
        config: Arc<RelayConfig>,
    ) -> Self {
        Self {
            frames,
            scripts,
            config,
        }
    }

    /// Runs a viewer over an upgraded, full-duplex WebSocket.
    pub async fn run<W>(&self, ws: W, peer: SocketAddr) -> ConnectionReport
    where
        W: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
            + Send
            + 'static,
    {
        let (sink, stream) = ws.split();
        self.run_split(sink, stream, peer).await
    }

    /// Runs a viewer over separate outbound and inbound halves.
    pub async fn run_split<Si, St, E>(&self, sink: Si, stream: St, peer: SocketAddr) -> ConnectionReport
    where
        Si: Sink<WsMessage> + Unpin + Send + 'static,
        Si::Error: Display + Send,
        St: Stream<Item = Result<WsMessage, E>> + Unpin,
        E: Display,
    {
        let viewer_id = Uuid::new_v4();
        let viewer = viewer_id.to_string();
        info!("viewer {viewer} connected from {peer}");

        let shutdown = ShutdownSignal::new();

        let capture = CaptureLoop::new(
            viewer.clone(),
            Arc::clone(&self.frames),
            sink,
            self.config.capture_interval,
            self.config.write_timeout,
        );
        let capture_task = tokio::spawn(capture.run(shutdown.clone()));

        let dispatcher =
            ActionDispatcher::new(Arc::clone(&self.scripts), self.config.max_inflight_actions);
        let relay = run_event_relay(
            &viewer,
            stream,
            dispatcher,
            shutdown.clone(),
            self.config.drain_timeout,
        )
        .await;

        shutdown.trigger();
        let capture = match capture_task.await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("viewer {viewer}: capture task failed: {e}");
                None
            }
        };

        match capture {
            Some(c) => info!(
                "viewer {viewer} disconnected ({:?}): {} frames, {} skipped ticks, {} actions, {} malformed",
                c.exit, c.frames_sent, c.skipped_ticks, relay.dispatch.dispatched, relay.malformed
            ),
            None => info!("viewer {viewer} disconnected"),
        }

        ConnectionReport {
            viewer_id,
            relay,
            capture,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
