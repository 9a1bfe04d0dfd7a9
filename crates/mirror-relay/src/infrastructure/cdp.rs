//! Chrome DevTools Protocol client over a per-target WebSocket.
//!
//! # Wire format
//!
//! Every command is a JSON text frame carrying a client-chosen `id`.  The
//! remote side answers with a frame carrying the same `id` and either a
//! `result` or an `error` object.  Frames without an `id` are events and are
//! ignored, since the relay never enables any domain.
//!
//! ```text
//! → {"id":7,"method":"Runtime.evaluate","params":{"expression":"1+1"}}
//! ← {"id":7,"result":{"result":{"type":"number","value":2}}}
//! ← {"method":"Runtime.consoleAPICalled","params":{...}}        (ignored)
//! ```
//!
//! # Tasks
//!
//! A [`CdpConnection`] owns two Tokio tasks:
//!
//! - the **writer** drains an unbounded channel into the WebSocket sink, so
//!   callers never contend on the sink;
//! - the **reader** routes each response to the caller waiting on its `id`
//!   through a oneshot channel.
//!
//! When the reader stops (remote close or read error) the connection is
//! marked closed and every pending caller receives [`RemoteError::Closed`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace, warn};

use mirror_core::Target;

use crate::application::{DebugEndpoint, DiscoveryError, RemoteControl, RemoteError};
use crate::infrastructure::discovery::fetch_targets;

/// Upper bound on a single command round trip.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll period while waiting for a capture region to become visible.
const REGION_POLL: Duration = Duration::from_millis(50);

type Reply = Result<Value, RemoteError>;
type Waiters = HashMap<u64, oneshot::Sender<Reply>>;
type Pending = Arc<Mutex<Waiters>>;

/// Locks the waiter map.  It is never held across an await, so a poisoned
/// lock still holds a consistent map.
fn lock(pending: &Pending) -> MutexGuard<'_, Waiters> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes one call's waiter when the call ends, whether it returned or its
/// future was dropped.
struct WaiterGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

// ── Wire helpers ──────────────────────────────────────────────────────────────

/// Page-space rectangle passed to `Page.captureScreenshot` as its `clip`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Clip {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Decodes one inbound frame.
///
/// Returns `None` for events and for frames that are not JSON objects.
pub fn parse_response(text: &str) -> Option<(u64, Reply)> {
    let mut frame: Value = serde_json::from_str(text).ok()?;
    let id = frame.get("id")?.as_u64()?;

    if let Some(error) = frame.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Some((id, Err(RemoteError::Command { code, message })));
    }

    let result = frame
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null);
    Some((id, Ok(result)))
}

/// Extracts the PNG bytes from a `Page.captureScreenshot` result.
pub fn decode_screenshot(result: &Value) -> Result<Vec<u8>, RemoteError> {
    let data = result
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::Protocol("screenshot result has no data".to_string()))?;
    BASE64
        .decode(data)
        .map_err(|e| RemoteError::Protocol(format!("screenshot data is not base64: {e}")))
}

/// Interprets the value returned by [`region_probe_script`].
///
/// `null`, a malformed object, or a zero-area box all mean "not visible yet".
pub fn parse_clip(value: Value) -> Option<Clip> {
    let clip: Clip = serde_json::from_value(value).ok()?;
    (clip.width > 0.0 && clip.height > 0.0).then_some(clip)
}

/// Script that reports the bounding box of the first element matching
/// `selector` in page coordinates, or `null` if it is absent or collapsed.
pub fn region_probe_script(selector: &str) -> String {
    // A JSON string literal is also a valid JS string literal.
    let quoted = Value::from(selector).to_string();
    format!(
        "(() => {{ \
           const el = document.querySelector({quoted}); \
           if (!el) return null; \
           const r = el.getBoundingClientRect(); \
           if (r.width <= 0 || r.height <= 0) return null; \
           return {{ x: r.left + window.scrollX, y: r.top + window.scrollY, \
                     width: r.width, height: r.height }}; \
         }})()"
    )
}

/// Best-effort description of a `Runtime.evaluate` exception.
fn exception_text(details: &Value) -> String {
    details
        .pointer("/exception/description")
        .or_else(|| details.get("text"))
        .and_then(Value::as_str)
        .unwrap_or("uncaught exception")
        .to_string()
}

// ── CdpConnection ─────────────────────────────────────────────────────────────

/// A live CDP connection to one target.
pub struct CdpConnection {
    url: String,
    next_id: AtomicU64,
    outbound: mpsc::UnboundedSender<WsMessage>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    call_timeout: Duration,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpConnection {
    /// Opens the target's debugging WebSocket and starts the I/O tasks.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Connect`] if the WebSocket handshake fails.
    pub async fn connect(url: &str, call_timeout: Duration) -> Result<Self, RemoteError> {
        let (ws, _response) = connect_async(url).await.map_err(|e| RemoteError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        debug!("CDP connection open: {url}");

        let (mut sink, mut stream) = ws.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<WsMessage>();
        let pending: Pending = Arc::default();
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = sink.send(msg).await {
                    debug!("CDP write failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn({
            let pending = Arc::clone(&pending);
            let closed = Arc::clone(&closed);
            let url = url.to_string();
            async move {
                while let Some(msg) = stream.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => match parse_response(&text) {
                            Some((id, reply)) => {
                                let waiter = lock(&pending).remove(&id);
                                if let Some(waiter) = waiter {
                                    let _ = waiter.send(reply);
                                } else {
                                    trace!("CDP response for unknown id {id}");
                                }
                            }
                            None => trace!("CDP event ignored"),
                        },
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!("CDP read error on {url}: {e}");
                            break;
                        }
                    }
                }
                closed.store(true, Ordering::Release);
                // Dropping the senders fails every outstanding call.
                lock(&pending).clear();
                debug!("CDP connection closed: {url}");
            }
        });

        Ok(Self {
            url: url.to_string(),
            next_id: AtomicU64::new(1),
            outbound,
            pending,
            closed,
            call_timeout,
            reader,
            writer,
        })
    }

    /// The WebSocket address this connection was opened on.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns `true` once the remote side or [`RemoteControl::close`] ended
    /// the connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of commands still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Sends one command and waits for its response.
    ///
    /// # Errors
    ///
    /// - [`RemoteError::Closed`] if the connection is or becomes closed.
    /// - [`RemoteError::Command`] if the remote side answers with an error.
    /// - [`RemoteError::Protocol`] if no answer arrives within the call
    ///   timeout.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        if self.is_closed() {
            return Err(RemoteError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _waiter = WaiterGuard {
            pending: &self.pending,
            id,
        };
        // The reader marks the connection closed before clearing `pending`.
        if self.is_closed() {
            return Err(RemoteError::Closed);
        }

        let frame = json!({ "id": id, "method": method, "params": params }).to_string();
        if self.outbound.send(WsMessage::Text(frame)).is_err() {
            return Err(RemoteError::Closed);
        }

        match timeout(self.call_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(RemoteError::Closed),
            Err(_) => Err(RemoteError::Protocol(format!(
                "{method} got no response within {:?}",
                self.call_timeout
            ))),
        }
    }

    /// Evaluates `script` and returns its value (`null` if it has none).
    async fn evaluate_value(&self, script: &str) -> Result<Value, RemoteError> {
        let mut result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": script, "returnByValue": true }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            return Err(RemoteError::ScriptException(exception_text(details)));
        }
        Ok(result
            .pointer_mut("/result/value")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn screenshot(&self, params: Value) -> Result<Vec<u8>, RemoteError> {
        let result = self.call("Page.captureScreenshot", params).await?;
        decode_screenshot(&result)
    }
}

#[async_trait]
impl RemoteControl for CdpConnection {
    async fn evaluate(&self, script: &str) -> Result<(), RemoteError> {
        self.evaluate_value(script).await.map(|_| ())
    }

    async fn capture_region(&self, selector: &str, wait: Duration) -> Result<Vec<u8>, RemoteError> {
        let probe = region_probe_script(selector);
        let deadline = Instant::now() + wait;

        let clip = loop {
            if let Some(clip) = parse_clip(self.evaluate_value(&probe).await?) {
                break clip;
            }
            if Instant::now() >= deadline {
                return Err(RemoteError::RegionNotVisible(selector.to_string()));
            }
            sleep(REGION_POLL).await;
        };

        self.screenshot(json!({
            "format": "png",
            "clip": {
                "x": clip.x,
                "y": clip.y,
                "width": clip.width,
                "height": clip.height,
                "scale": 1,
            },
            "captureBeyondViewport": true,
        }))
        .await
    }

    async fn capture_full(&self) -> Result<Vec<u8>, RemoteError> {
        self.screenshot(json!({ "format": "png" })).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outbound.send(WsMessage::Close(None));
        self.reader.abort();
        lock(&self.pending).clear();
        debug!("CDP connection to {} released", self.url);
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

// ── CdpEndpoint ───────────────────────────────────────────────────────────────

/// The debugging endpoint of a Chromium process: `/json` discovery plus
/// per-target CDP connections.
pub struct CdpEndpoint {
    debugger_url: String,
    client: reqwest::Client,
    call_timeout: Duration,
}

impl CdpEndpoint {
    /// Creates an endpoint for the given debugging address
    /// (e.g. `ws://127.0.0.1:9222`).
    pub fn new(debugger_url: impl Into<String>) -> Self {
        Self {
            debugger_url: debugger_url.into(),
            client: reqwest::Client::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-command timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

#[async_trait]
impl DebugEndpoint for CdpEndpoint {
    async fn list_targets(&self) -> Result<Vec<Target>, DiscoveryError> {
        fetch_targets(&self.client, &self.debugger_url).await
    }

    async fn attach(&self, target: &Target) -> Result<Arc<dyn RemoteControl>, RemoteError> {
        if !target.is_connectable() {
            return Err(RemoteError::Connect {
                url: target.id.clone(),
                reason: "target has no webSocketDebuggerUrl".to_string(),
            });
        }
        let conn = CdpConnection::connect(&target.web_socket_debugger_url, self.call_timeout).await?;
        Ok(Arc::new(conn))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
