//! Per-viewer event relay: the reverse channel.
//!
//! Reads viewer messages, decodes each one into a [`ViewerEvent`], and hands
//! the resulting script to an [`ActionDispatcher`] so the read loop never
//! waits on the source application.
//!
//! # Dispatch model
//!
//! Each script runs as its own task inside a per-connection
//! [`JoinSet`](tokio::task::JoinSet).  The set is bounded: finished actions
//! are reaped on every dispatch, and if it is still full the new event is
//! dropped.  Dropping is acceptable because scroll events are absolute
//! positions; the next one supersedes it.  There is no ordering guarantee
//! between actions already in flight.
//!
//! When the viewer leaves, the dispatcher waits briefly for the remaining
//! actions and aborts whatever is left.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, trace};

use mirror_core::ViewerEvent;

use crate::application::remote::{ScriptRunner, SessionError};
use crate::application::shutdown::ShutdownSignal;

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Counters kept by an [`ActionDispatcher`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Actions spawned.
    pub dispatched: u64,
    /// Actions that finished successfully.
    pub completed: u64,
    /// Actions that returned an error or panicked.
    pub failed: u64,
    /// Events discarded because the in-flight limit was reached.
    pub dropped: u64,
    /// Actions still running at drain deadline, then aborted.
    pub aborted: u64,
}

/// Bounded, tracked fire-and-forget execution of scripts.
pub struct ActionDispatcher {
    runner: Arc<dyn ScriptRunner>,
    inflight: JoinSet<Result<(), SessionError>>,
    max_inflight: usize,
    stats: DispatchStats,
}

impl ActionDispatcher {
    /// Creates a dispatcher allowing at most `max_inflight` concurrent actions.
    pub fn new(runner: Arc<dyn ScriptRunner>, max_inflight: usize) -> Self {
        Self {
            runner,
            inflight: JoinSet::new(),
            max_inflight: max_inflight.max(1),
            stats: DispatchStats::default(),
        }
    }

    /// Starts `script` without waiting for it.  Returns `false` if the event
    /// was dropped because too many actions are still running.
    pub fn dispatch(&mut self, script: String) -> bool {
        self.reap();
        if self.inflight.len() >= self.max_inflight {
            self.stats.dropped += 1;
            debug!("dropping action: {} already in flight", self.inflight.len());
            return false;
        }

        let runner = Arc::clone(&self.runner);
        self.inflight
            .spawn(async move { runner.run_script(&script).await });
        self.stats.dispatched += 1;
        true
    }

    /// Number of actions not yet reaped.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Current counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Waits up to `grace` for in-flight actions, then aborts the rest.
    pub async fn drain(mut self, grace: Duration) -> DispatchStats {
        let deadline = Instant::now() + grace;
        loop {
            match timeout_at(deadline, self.inflight.join_next()).await {
                Ok(Some(result)) => self.record(result),
                Ok(None) => break,
                Err(_) => {
                    self.stats.aborted += self.inflight.len() as u64;
                    self.inflight.abort_all();
                    break;
                }
            }
        }
        self.stats
    }

    fn reap(&mut self) {
        while let Some(result) = self.inflight.try_join_next() {
            self.record(result);
        }
    }

    fn record(&mut self, result: Result<Result<(), SessionError>, tokio::task::JoinError>) {
        match result {
            Ok(Ok(())) => self.stats.completed += 1,
            Ok(Err(e)) => {
                trace!("action failed: {e}");
                self.stats.failed += 1;
            }
            Err(e) => {
                debug!("action task ended abnormally: {e}");
                self.stats.failed += 1;
            }
        }
    }
}

// ── Read loop ─────────────────────────────────────────────────────────────────

/// Summary returned when an event relay stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Data messages received (text or binary).
    pub messages: u64,
    /// Messages that did not decode as a viewer event.
    pub malformed: u64,
    /// Dispatcher counters after draining.
    pub dispatch: DispatchStats,
}

/// Runs the inbound read loop until the viewer disconnects, the stream
/// errors, or `shutdown` is triggered.  Triggers `shutdown` on exit.
pub async fn run_event_relay<St, E>(
    viewer: &str,
    mut inbound: St,
    mut dispatcher: ActionDispatcher,
    shutdown: ShutdownSignal,
    drain_grace: Duration,
) -> RelayReport
where
    St: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let mut report = RelayReport::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                debug!("viewer {viewer}: relay stopping on shutdown signal");
                break;
            }
            next = inbound.next() => next,
        };

        let payload = match next {
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Binary(bytes))) => bytes,
            Some(Ok(WsMessage::Close(_))) => {
                debug!("viewer {viewer}: close frame received");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("viewer {viewer}: read ended: {e}");
                break;
            }
            None => {
                debug!("viewer {viewer}: stream ended");
                break;
            }
        };

        report.messages += 1;
        match ViewerEvent::decode(&payload) {
            Ok(event) => {
                trace!("viewer {viewer}: {event:?}");
                dispatcher.dispatch(event.to_script());
            }
            Err(e) => {
                trace!("viewer {viewer}: ignoring message: {e}");
                report.malformed += 1;
            }
        }
    }

    shutdown.trigger();
    report.dispatch = dispatcher.drain(drain_grace).await;
    report
}

// ── Tests ─────────────────────────────────────────────────────────────────────
