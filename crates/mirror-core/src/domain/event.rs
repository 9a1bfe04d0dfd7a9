//! Viewer → source events.
//!
//! The viewer sends small JSON messages over the same WebSocket that carries
//! frames in the other direction.  Currently one shape exists:
//!
//! ```json
//! { "y": 450 }
//! ```
//!
//! meaning "scroll the source document so its vertical offset is 450 px".
//! Anything else is a decode error, which the relay drops silently.

use serde::Deserialize;
use thiserror::Error;

/// Errors produced by [`ViewerEvent::decode`].
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The payload is not JSON, or is JSON of an unrecognized shape.
    #[error("unrecognized viewer event: {0}")]
    Unrecognized(#[from] serde_json::Error),
}

/// A decoded message from the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    /// Sync the source document's vertical scroll position.
    Scroll {
        /// Destination offset in CSS pixels.
        y: i64,
    },
}

/// Wire shape of a scroll event.
#[derive(Deserialize)]
struct ScrollWire {
    y: i64,
}

impl ViewerEvent {
    /// Decodes one viewer message.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::Unrecognized`] for non-JSON payloads and for
    /// objects without an integer `y` field.
    pub fn decode(payload: &[u8]) -> Result<Self, EventDecodeError> {
        let wire: ScrollWire = serde_json::from_slice(payload)?;
        Ok(ViewerEvent::Scroll { y: wire.y })
    }

    /// The script that applies this event inside the source application.
    pub fn to_script(&self) -> String {
        match self {
            ViewerEvent::Scroll { y } => scroll_script(*y),
        }
    }
}

/// Builds the script that jumps the window to vertical offset `y`.
///
/// `behavior: 'auto'` makes the jump instant; smooth scrolling would lag
/// behind the viewer at 5 frames per second.
pub fn scroll_script(y: i64) -> String {
    format!("window.scrollTo({{top: {y}, behavior: 'auto'}});")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
