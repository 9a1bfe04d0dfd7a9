//! The remote debugging seam and the process-wide [`RemoteSession`].
//!
//! The concrete debugging transport (Chrome DevTools Protocol over WebSocket)
//! lives in the infrastructure layer.  The application layer only sees two
//! traits:
//!
//! - [`DebugEndpoint`] – lists targets and attaches to one of them.
//! - [`RemoteControl`] – the live connection: evaluate a script, capture a
//!   region, capture the full surface, close.
//!
//! [`RemoteSession`] owns at most one [`RemoteControl`] handle at a time and
//! exposes the three operations the relay needs: `initialize`, `capture`, and
//! `run_script`.
//!
//! # Synchronization
//!
//! ```text
//! capture() / run_script()          initialize()
//!   read lock ─ clone Arc ─ unlock     init lock (serializes re-inits)
//!   call handle (lock not held)        resolve + attach + probe
//!                                      write lock ─ swap ─ unlock
//!                                      close previous handle
//! ```
//!
//! Lookups never wait on a slow capture, and a reinitialization never races a
//! lookup.  Calls already in flight on the previous handle keep their `Arc`
//! and may fail once that handle is closed.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use mirror_core::{scroll_script, CaptureRegion, ResolveError, Target, TargetResolver};

use crate::domain::RelayConfig;

/// Script run right after attaching, to prove the connection is usable.
pub const LIVENESS_PROBE: &str = "console.log('Mirror relay connected')";

// ── Error types ───────────────────────────────────────────────────────────────

/// Failures of the live debugging connection.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The control connection could not be opened.
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// The remote side sent something the client could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote side answered a command with an error object.
    #[error("command failed ({code}): {message}")]
    Command { code: i64, message: String },

    /// The evaluated script threw.
    #[error("script raised an exception: {0}")]
    ScriptException(String),

    /// The capture region did not become visible in time.
    #[error("region '{0}' not visible")]
    RegionNotVisible(String),

    /// A capture succeeded but returned no bytes.
    #[error("capture returned an empty frame")]
    EmptyFrame,

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

/// Failures while listing and choosing targets.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The discovery endpoint could not be reached.
    #[error(
        "could not connect to {address}; is the application running with \
         --remote-debugging-port? ({source})"
    )]
    Unreachable {
        address: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The endpoint answered, but not with a JSON target list.
    #[error("malformed target list from {address}: {source}")]
    Malformed {
        address: String,
        #[source]
        source: serde_json::Error,
    },

    /// The list was fetched but no target qualified.
    #[error(transparent)]
    NoTarget(#[from] ResolveError),
}

/// Errors returned by [`RemoteSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session has been initialized yet.
    #[error("remote session not ready")]
    NotReady,

    /// Target discovery failed during initialization.
    #[error("target discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Attaching or the liveness probe failed during initialization.
    #[error("connection lost: {0}")]
    ConnectionLost(#[source] RemoteError),

    /// An operation on a live session failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

// ── Seams ─────────────────────────────────────────────────────────────────────

/// A live control connection to one target.
///
/// Implementations must tolerate concurrent calls: every viewer's capture
/// loop and every dispatched scroll action share one handle.
#[async_trait]
pub trait RemoteControl: Send + Sync {
    /// Evaluates `script` in the target's page context.
    async fn evaluate(&self, script: &str) -> Result<(), RemoteError>;

    /// Captures the element matching `selector`, waiting up to `wait` for it
    /// to become visible.
    async fn capture_region(&self, selector: &str, wait: Duration) -> Result<Vec<u8>, RemoteError>;

    /// Captures the full visible surface.
    async fn capture_full(&self) -> Result<Vec<u8>, RemoteError>;

    /// Releases the connection.  Must be idempotent.
    async fn close(&self);
}

/// The discovery side of the debugging endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DebugEndpoint: Send + Sync {
    /// Fetches a fresh target list.
    async fn list_targets(&self) -> Result<Vec<Target>, DiscoveryError>;

    /// Opens a control connection scoped to `target`.
    async fn attach(&self, target: &Target) -> Result<Arc<dyn RemoteControl>, RemoteError>;
}

/// Anything that can produce a frame on demand.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Produces the next frame.
    async fn capture(&self) -> Result<Vec<u8>, SessionError>;
}

/// Anything that can run a script in the source application.
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs `script`, reporting only success or failure.
    async fn run_script(&self, script: &str) -> Result<(), SessionError>;
}

// ── RemoteSession ─────────────────────────────────────────────────────────────

/// The single live remote-control handle shared by all relay tasks.
pub struct RemoteSession {
    handle: RwLock<Option<Arc<dyn RemoteControl>>>,
    init_lock: Mutex<()>,
    resolver: TargetResolver,
    region: CaptureRegion,
    region_wait: Duration,
}

impl RemoteSession {
    /// Creates a session owner with no live handle.
    pub fn new(resolver: TargetResolver, region: CaptureRegion, region_wait: Duration) -> Self {
        Self {
            handle: RwLock::new(None),
            init_lock: Mutex::new(()),
            resolver,
            region,
            region_wait,
        }
    }

    /// Creates a session owner from the relay configuration.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            TargetResolver::new(config.resolver.clone()),
            config.region.clone(),
            config.region_wait,
        )
    }

    /// The region captures are cropped to.
    pub fn region(&self) -> &CaptureRegion {
        &self.region
    }

    /// Resolves a target, attaches to it, probes it, and commits the result
    /// as the live handle.
    ///
    /// Returns the target that was attached.  Any previous handle is closed
    /// after the new one is committed.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Discovery`] if listing or resolution fails.
    /// - [`SessionError::ConnectionLost`] if attaching or the probe fails.
    ///   A partially opened connection is closed before returning.
    pub async fn initialize(&self, endpoint: &dyn DebugEndpoint) -> Result<Target, SessionError> {
        let _guard = self.init_lock.lock().await;

        let targets = endpoint.list_targets().await?;
        for t in targets.iter().filter(|t| t.is_connectable()) {
            debug!("found target [{}] '{}' ({})", t.kind, t.title, t.url);
        }

        let (target, strategy) = self
            .resolver
            .resolve_with_strategy(&targets)
            .map_err(DiscoveryError::from)?;
        let target = target.clone();
        info!(
            "selected target '{}' (id={}) by {}",
            target.title,
            target.id,
            strategy.label()
        );

        let handle = endpoint
            .attach(&target)
            .await
            .map_err(SessionError::ConnectionLost)?;

        if let Err(e) = handle.evaluate(LIVENESS_PROBE).await {
            handle.close().await;
            return Err(SessionError::ConnectionLost(e));
        }

        let previous = self.handle.write().await.replace(handle);
        if let Some(old) = previous {
            debug!("closing previous remote session");
            old.close().await;
        }

        info!("attached to target {}", target.id);
        Ok(target)
    }

    /// Returns `true` if a live handle is installed.
    pub async fn is_ready(&self) -> bool {
        self.handle.read().await.is_some()
    }

    async fn current(&self) -> Result<Arc<dyn RemoteControl>, SessionError> {
        self.handle
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or(SessionError::NotReady)
    }

    /// Captures the configured region, falling back to a full-frame capture
    /// if the region is missing, invisible, or yields no bytes.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] without a session; otherwise the full-frame
    /// error, only if the fallback also fails.
    pub async fn capture(&self) -> Result<Vec<u8>, SessionError> {
        let handle = self.current().await?;

        match handle
            .capture_region(self.region.selector(), self.region_wait)
            .await
        {
            Ok(frame) if !frame.is_empty() => return Ok(frame),
            Ok(_) => debug!("region '{}' capture was empty; using full frame", self.region),
            Err(e) => debug!("region '{}' capture failed ({e}); using full frame", self.region),
        }

        let frame = handle.capture_full().await?;
        if frame.is_empty() {
            return Err(RemoteError::EmptyFrame.into());
        }
        Ok(frame)
    }

    /// Executes `script` in the target.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] without a session, otherwise the execution
    /// error.
    pub async fn run_script(&self, script: &str) -> Result<(), SessionError> {
        let handle = self.current().await?;
        handle.evaluate(script).await?;
        Ok(())
    }

    /// Scrolls the target document to vertical offset `y`.
    ///
    /// # Errors
    ///
    /// Same as [`run_script`](Self::run_script).
    pub async fn sync_scroll(&self, y: i64) -> Result<(), SessionError> {
        self.run_script(&scroll_script(y)).await
    }

    /// Closes and removes the live handle, if any.
    pub async fn shutdown(&self) {
        let _guard = self.init_lock.lock().await;
        if let Some(handle) = self.handle.write().await.take() {
            handle.close().await;
            info!("remote session closed");
        } else {
            debug!("shutdown requested with no remote session active");
        }
    }
}

#[async_trait]
impl FrameSource for RemoteSession {
    async fn capture(&self) -> Result<Vec<u8>, SessionError> {
        RemoteSession::capture(self).await
    }
}

#[async_trait]
impl ScriptRunner for RemoteSession {
    async fn run_script(&self, script: &str) -> Result<(), SessionError> {
        RemoteSession::run_script(self, script).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
