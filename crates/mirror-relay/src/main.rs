//! Mirror relay: entry point.
//!
//! This binary attaches to a Chromium-based desktop application over its
//! remote debugging port, captures one UI panel five times a second, and
//! streams the frames to WebSocket viewers (e.g. a phone on the same LAN).
//! Viewers send back their scroll position, which is replayed in the
//! application.
//!
//! # Usage
//!
//! ```text
//! mirror-relay [OPTIONS]
//!
//! Options:
//!   --ws-bind <ADDR>            Viewer listener address [default: 0.0.0.0]
//!   --ws-port <PORT>            Viewer listener port [default: 3000]
//!   --debugger-url <URL>        Remote debugging address [default: ws://127.0.0.1:9222]
//!   --region <NAME|SELECTOR>    Panel to capture [default: auxiliary-bar]
//!   --fps <N>                   Capture rate [default: 5]
//!   --write-timeout-ms <MS>     Per-frame write deadline [default: 500]
//!   --config <PATH>             Optional TOML config file
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the TOML file, then environment variables, then
//! CLI flags.  Each layer overrides only the keys it sets.
//!
//! | Variable                  | Flag                 |
//! |---------------------------|----------------------|
//! | `MIRROR_WS_BIND`          | `--ws-bind`          |
//! | `MIRROR_WS_PORT`          | `--ws-port`          |
//! | `MIRROR_DEBUGGER_URL`     | `--debugger-url`     |
//! | `MIRROR_REGION`           | `--region`           |
//! | `MIRROR_FPS`              | `--fps`              |
//! | `MIRROR_WRITE_TIMEOUT_MS` | `--write-timeout-ms` |
//! | `MIRROR_CONFIG`           | `--config`           |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mirror_core::CaptureRegion;
use mirror_relay::application::{ConnectionSupervisor, RemoteSession};
use mirror_relay::domain::RelayConfig;
use mirror_relay::infrastructure::{run_server, CdpEndpoint, FileConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Mirrors a Chromium application panel to WebSocket viewers.
///
/// Every option is optional so that unset flags fall through to the config
/// file and then to the built-in defaults.
#[derive(Debug, Parser)]
#[command(
    name = "mirror-relay",
    about = "Mirror a Chromium application panel to WebSocket viewers",
    version
)]
struct Cli {
    /// IP address to bind the viewer endpoint to.
    ///
    /// Use `0.0.0.0` to accept viewers from the LAN, or `127.0.0.1` for
    /// local viewers only.
    #[arg(long, env = "MIRROR_WS_BIND")]
    ws_bind: Option<String>,

    /// TCP port for the viewer endpoint.
    #[arg(long, env = "MIRROR_WS_PORT")]
    ws_port: Option<u16>,

    /// Remote debugging address of the source application.
    #[arg(long, env = "MIRROR_DEBUGGER_URL")]
    debugger_url: Option<String>,

    /// Panel to capture: `editor`, `auxiliary-bar`, `sidebar`, or a CSS
    /// selector.
    #[arg(long, env = "MIRROR_REGION")]
    region: Option<CaptureRegion>,

    /// Frames captured per second.
    #[arg(long, env = "MIRROR_FPS")]
    fps: Option<u64>,

    /// Milliseconds a single frame write may take before the viewer is
    /// disconnected.
    #[arg(long, env = "MIRROR_WRITE_TIMEOUT_MS")]
    write_timeout_ms: Option<u64>,

    /// Path to a TOML config file.
    #[arg(long, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,
}

/// Merges CLI/env values over `file` over the built-in defaults.
///
/// # Errors
///
/// Returns an error if the bind address does not parse, or if the frame rate
/// or write timeout is zero.
fn build_config(cli: &Cli, file: FileConfig) -> anyhow::Result<RelayConfig> {
    let defaults = RelayConfig::default();

    let ws_bind = cli
        .ws_bind
        .clone()
        .or(file.ws_bind)
        .unwrap_or_else(|| defaults.ws_bind_addr.ip().to_string());
    let ws_port = cli
        .ws_port
        .or(file.ws_port)
        .unwrap_or(defaults.ws_bind_addr.port());
    let ws_bind_addr: SocketAddr = format!("{ws_bind}:{ws_port}")
        .parse()
        .with_context(|| format!("invalid viewer bind address: '{ws_bind}:{ws_port}'"))?;

    let fps = cli.fps.or(file.fps).unwrap_or(defaults.frames_per_second());
    if fps == 0 || fps > 1000 {
        bail!("frame rate must be between 1 and 1000, got {fps}");
    }

    let write_timeout = match cli.write_timeout_ms.or(file.write_timeout_ms) {
        Some(0) => bail!("write timeout must be greater than zero"),
        Some(ms) => Duration::from_millis(ms),
        None => defaults.write_timeout,
    };

    Ok(RelayConfig {
        ws_bind_addr,
        debugger_url: cli
            .debugger_url
            .clone()
            .or(file.debugger_url)
            .unwrap_or(defaults.debugger_url),
        region: cli.region.clone().or(file.region).unwrap_or(defaults.region),
        resolver: file.resolver.unwrap_or(defaults.resolver),
        capture_interval: Duration::from_millis(1000 / fps),
        write_timeout,
        region_wait: file
            .region_wait_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.region_wait),
        max_inflight_actions: file
            .max_inflight_actions
            .unwrap_or(defaults.max_inflight_actions),
        drain_timeout: file
            .drain_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.drain_timeout),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` sets the level
///    (default `info`).
/// 2. CLI arguments and the optional config file are merged into a
///    [`RelayConfig`].
/// 3. The remote session is initialized once.  If that fails the relay
///    still serves viewers; they simply receive no frames.
/// 4. A Ctrl+C handler clears a shared `AtomicBool`.
/// 5. [`run_server`] accepts viewers until the flag is cleared, after which
///    the remote session is closed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => FileConfig::default(),
    };
    let config = build_config(&cli, file)?;

    info!(
        "mirror relay starting: viewers={}, debugger={}, region={}, fps={}",
        config.ws_bind_addr,
        config.debugger_url,
        config.region,
        config.frames_per_second()
    );

    // ── Remote session ─────────────────────────────────────────────────────────
    let session = Arc::new(RemoteSession::from_config(&config));
    let endpoint = CdpEndpoint::new(config.debugger_url.clone());
    match session.initialize(&endpoint).await {
        Ok(target) => info!("mirroring '{}' ({})", target.title, target.url),
        Err(e) => warn!("no remote session, viewers will receive no frames: {e}"),
    }

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Viewer server ──────────────────────────────────────────────────────────
    let supervisor = ConnectionSupervisor::new(
        session.clone(),
        session.clone(),
        Arc::new(config.clone()),
    );
    let served = run_server(&config, supervisor, running).await;

    session.shutdown().await;
    served?;

    info!("mirror relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
