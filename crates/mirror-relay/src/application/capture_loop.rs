//! Per-viewer capture loop: pulls frames from a [`FrameSource`] at a fixed
//! cadence and pushes each one to the viewer as a binary WebSocket message.
//!
//! # State machine
//!
//! ```text
//!  Idle ──run()──► Running ──write failed / deadline / shutdown──► Stopped
//!                    │  ▲
//!                    └──┘ capture failed: skip this tick
//! ```
//!
//! Capture failures (no session yet, region and full-frame both failed) are
//! never fatal; the loop simply waits for the next tick.  Only the outbound
//! transport can stop it.  On entering `Stopped` the loop triggers the
//! connection's [`ShutdownSignal`] so the event relay stops too, and closes
//! its half of the transport.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace, warn};

use crate::application::remote::FrameSource;
use crate::application::shutdown::ShutdownSignal;

/// Lifecycle of one capture loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Running,
    Stopped,
}

/// Why a capture loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// The connection's shutdown signal was triggered.
    Shutdown,
    /// Writing a frame failed.
    WriteFailed,
    /// Writing a frame took longer than the write deadline.
    WriteTimedOut,
}

/// Summary returned when a capture loop stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureReport {
    pub frames_sent: u64,
    pub skipped_ticks: u64,
    pub exit: CaptureExit,
}

/// The capture loop for one viewer.
pub struct CaptureLoop<S> {
    viewer: String,
    source: Arc<dyn FrameSource>,
    sink: S,
    interval: Duration,
    write_timeout: Duration,
    state: CaptureState,
}

impl<S> CaptureLoop<S>
where
    S: Sink<WsMessage> + Unpin + Send,
    S::Error: Display + Send,
{
    /// Creates an idle capture loop writing to `sink`.
    pub fn new(
        viewer: impl Into<String>,
        source: Arc<dyn FrameSource>,
        sink: S,
        interval: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            viewer: viewer.into(),
            source,
            sink,
            interval,
            write_timeout,
            state: CaptureState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Runs until the transport fails or `shutdown` is triggered.
    pub async fn run(mut self, shutdown: ShutdownSignal) -> CaptureReport {
        self.state = CaptureState::Running;
        let viewer = self.viewer.clone();

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut frames_sent = 0u64;
        let mut skipped_ticks = 0u64;

        let exit = loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break CaptureExit::Shutdown,
                _ = ticker.tick() => {}
            }

            let captured = tokio::select! {
                biased;
                _ = shutdown.triggered() => break CaptureExit::Shutdown,
                result = self.source.capture() => result,
            };

            let frame = match captured {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("viewer {viewer}: capture skipped: {e}");
                    skipped_ticks += 1;
                    continue;
                }
            };

            let write = timeout(self.write_timeout, self.sink.send(WsMessage::Binary(frame)));
            let written = tokio::select! {
                biased;
                _ = shutdown.triggered() => break CaptureExit::Shutdown,
                written = write => written,
            };

            match written {
                Ok(Ok(())) => frames_sent += 1,
                Ok(Err(e)) => {
                    debug!("viewer {viewer}: frame write failed: {e}");
                    break CaptureExit::WriteFailed;
                }
                Err(_) => {
                    warn!(
                        "viewer {viewer}: frame write exceeded {:?}; disconnecting",
                        self.write_timeout
                    );
                    break CaptureExit::WriteTimedOut;
                }
            }
        };

        self.stop(&shutdown).await;

        CaptureReport {
            frames_sent,
            skipped_ticks,
            exit,
        }
    }

    /// Enters `Stopped`: signals the other side and releases the transport.
    async fn stop(&mut self, shutdown: &ShutdownSignal) {
        if self.state == CaptureState::Stopped {
            return;
        }
        self.state = CaptureState::Stopped;
        shutdown.trigger();

        // The close handshake may be stuck behind the same stalled write.
        match timeout(self.write_timeout, self.sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!("viewer {}: close after stop: {e}", self.viewer),
            Err(_) => trace!("viewer {}: close after stop timed out", self.viewer),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::remote::SessionError;
    use async_trait::async_trait;
    use futures_util::sink;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    // ── Test doubles ──────────────────────────────────────────────────────────

    /// Returns a one-byte frame tagged with a counter, or fails on demand.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicU64,
        fail_first: u64,
    }

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn capture(&self) -> Result<Vec<u8>, SessionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(SessionError::NotReady);
            }
            Ok(vec![n as u8])
        }
    }

    type Sent = Arc<Mutex<Vec<WsMessage>>>;

    fn recording_sink(
        sent: Sent,
    ) -> impl Sink<WsMessage, Error = String> + Unpin + Send {
        Box::pin(sink::unfold(sent, |sent, msg: WsMessage| async move {
            sent.lock().unwrap().push(msg);
            Ok::<_, String>(sent)
        }))
    }

    fn stalled_sink() -> impl Sink<WsMessage, Error = String> + Unpin + Send {
        Box::pin(sink::unfold((), |(), _msg: WsMessage| async move {
            std::future::pending::<()>().await;
            Ok::<_, String>(())
        }))
    }

    fn failing_sink() -> impl Sink<WsMessage, Error = String> + Unpin + Send {
        Box::pin(sink::unfold((), |(), _msg: WsMessage| async move {
            Err::<(), _>("broken pipe".to_string())
        }))
    }

    const TICK: Duration = Duration::from_millis(200);
    const DEADLINE: Duration = Duration::from_millis(500);

    #[test]
    fn test_new_loop_is_idle() {
        let sent = Sent::default();
        let capture = CaptureLoop::new(
            "v",
            Arc::new(CountingSource::default()),
            recording_sink(sent),
            TICK,
            DEADLINE,
        );
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_sent_as_binary_at_tick_rate() {
        // Arrange
        let sent = Sent::default();
        let shutdown = ShutdownSignal::new();
        let capture = CaptureLoop::new(
            "v",
            Arc::new(CountingSource::default()),
            recording_sink(Arc::clone(&sent)),
            TICK,
            DEADLINE,
        );

        // Act: let one second of paused time elapse, then stop
        let task = tokio::spawn(capture.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(990)).await;
        shutdown.trigger();
        let report = task.await.unwrap();

        // Assert: ticks at 0, 200, 400, 600, 800 ms
        assert_eq!(report.exit, CaptureExit::Shutdown);
        assert_eq!(report.frames_sent, 5);
        let sent = sent.lock().unwrap();
        assert!(sent.iter().all(|m| matches!(m, WsMessage::Binary(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_errors_skip_the_tick() {
        let sent = Sent::default();
        let shutdown = ShutdownSignal::new();
        let source = Arc::new(CountingSource {
            fail_first: 2,
            ..CountingSource::default()
        });
        let capture = CaptureLoop::new("v", source, recording_sink(Arc::clone(&sent)), TICK, DEADLINE);

        let task = tokio::spawn(capture.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(990)).await;
        shutdown.trigger();
        let report = task.await.unwrap();

        assert_eq!(report.skipped_ticks, 2);
        assert_eq!(report.frames_sent, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_deadline_stops_loop_and_triggers_shutdown() {
        // Arrange
        let shutdown = ShutdownSignal::new();
        let capture = CaptureLoop::new(
            "v",
            Arc::new(CountingSource::default()),
            stalled_sink(),
            TICK,
            DEADLINE,
        );

        // Act
        let report = capture.run(shutdown.clone()).await;

        // Assert
        assert_eq!(report.exit, CaptureExit::WriteTimedOut);
        assert_eq!(report.frames_sent, 0);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_stops_loop() {
        let shutdown = ShutdownSignal::new();
        let capture = CaptureLoop::new(
            "v",
            Arc::new(CountingSource::default()),
            failing_sink(),
            TICK,
            DEADLINE,
        );

        let report = capture.run(shutdown.clone()).await;

        assert_eq!(report.exit, CaptureExit::WriteFailed);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_start_sends_nothing() {
        let sent = Sent::default();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let capture = CaptureLoop::new(
            "v",
            Arc::new(CountingSource::default()),
            recording_sink(Arc::clone(&sent)),
            TICK,
            DEADLINE,
        );

        let report = capture.run(shutdown).await;

        assert_eq!(report.exit, CaptureExit::Shutdown);
        assert_eq!(report.frames_sent, 0);
        assert!(sent.lock().unwrap().is_empty());
    }
}
