//! Viewer WebSocket server: accept loop and `/ws` handshake.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from viewers.
//! 3. Upgrading each connection to a WebSocket session, but only on the
//!    `/ws` path.  Every other path is answered with `404 Not Found`.
//! 4. Handing each upgraded session to the [`ConnectionSupervisor`] in its
//!    own Tokio task.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! Viewers are independent: a slow or failing viewer affects neither the
//! accept loop nor any other viewer.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info};

use crate::application::ConnectionSupervisor;
use crate::domain::RelayConfig;

/// The only path that is upgraded to a viewer session.
pub const VIEWER_PATH: &str = "/ws";

/// How often the accept loop re-checks the `running` flag while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.ws_bind_addr` and serves viewers until `running` is set to
/// `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: &RelayConfig,
    supervisor: ConnectionSupervisor,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.ws_bind_addr)
        .await
        .with_context(|| {
            format!(
                "failed to bind viewer listener on {}",
                config.ws_bind_addr
            )
        })?;

    info!(
        "viewer endpoint listening on ws://{}{VIEWER_PATH}",
        config.ws_bind_addr
    );

    serve(listener, supervisor, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind an ephemeral port and read
/// it back before serving.
pub async fn serve(
    listener: TcpListener,
    supervisor: ConnectionSupervisor,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!("TCP connection from {peer}");
                let supervisor = supervisor.clone();
                tokio::spawn(async move {
                    handle_viewer(stream, peer, supervisor).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error (e.g., too many open file descriptors).
                error!("accept error: {e}");
            }
            Err(_) => {
                // Idle; loop back to check the flag.
            }
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Upgrades one TCP connection and runs it to completion.
async fn handle_viewer(stream: TcpStream, peer: SocketAddr, supervisor: ConnectionSupervisor) {
    let ws = match accept_hdr_async(stream, route_viewer_path).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("handshake with {peer} rejected: {e}");
            return;
        }
    };

    supervisor.run(ws, peer).await;
}

/// Handshake callback: accepts `/ws`, answers anything else with 404.
fn route_viewer_path(request: &Request, response: Response) -> Result<Response, ErrorResponse> {
    if request.uri().path() == VIEWER_PATH {
        return Ok(response);
    }
    debug!("no route for {}", request.uri().path());
    Err(not_found())
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Not Found".to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────
