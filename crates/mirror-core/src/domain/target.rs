//! The [`Target`] record.
//!
//! A target is one debuggable surface (window, tab, worker, panel) exposed by
//! a Chromium-based application started with `--remote-debugging-port`.  The
//! endpoint lists them as a JSON array at `GET /json`:
//!
//! ```json
//! [
//!   {
//!     "id": "6A1F...",
//!     "title": "Agent Manager",
//!     "type": "page",
//!     "url": "vscode-file://vscode-app/...",
//!     "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/6A1F..."
//!   }
//! ]
//! ```
//!
//! Targets are immutable snapshots.  A fresh list is fetched on every
//! resolution attempt and nothing is cached between attempts.

use serde::{Deserialize, Serialize};

/// One entry of the discovery endpoint's target list.
///
/// Every field defaults to an empty string when absent.  Workers and some
/// background pages omit `webSocketDebuggerUrl` entirely (for example when
/// another debugger is already attached), which is how "not connectable" is
/// represented.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Opaque identifier assigned by the debugging endpoint.
    #[serde(default)]
    pub id: String,

    /// Human-readable window or tab title.
    #[serde(default)]
    pub title: String,

    /// Kind tag: `"page"`, `"app"`, `"worker"`, `"shared_worker"`, ...
    #[serde(rename = "type", default)]
    pub kind: String,

    /// The address the target is currently showing.
    #[serde(default)]
    pub url: String,

    /// WebSocket address used to open a control connection to this target.
    /// Empty if the target cannot be connected to.
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: String,
}

impl Target {
    /// Returns `true` if the target exposes a connection address.
    pub fn is_connectable(&self) -> bool {
        !self.web_socket_debugger_url.is_empty()
    }

    /// Returns `true` if the target's kind tag equals `kind` exactly.
    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_entry_maps_renamed_fields() {
        // Arrange
        let json = r#"{
            "id": "abc",
            "title": "Agent Manager",
            "type": "app",
            "url": "app://index.html",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/abc"
        }"#;

        // Act
        let target: Target = serde_json::from_str(json).unwrap();

        // Assert
        assert_eq!(target.id, "abc");
        assert_eq!(target.kind, "app");
        assert_eq!(
            target.web_socket_debugger_url,
            "ws://127.0.0.1:9222/devtools/page/abc"
        );
        assert!(target.is_connectable());
    }

    #[test]
    fn test_missing_debugger_url_is_not_connectable() {
        let json = r#"{"id": "w1", "title": "SharedWorker", "type": "shared_worker"}"#;
        let target: Target = serde_json::from_str(json).unwrap();
        assert!(!target.is_connectable());
        assert!(target.url.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        // Chromium adds fields such as `devtoolsFrontendUrl` and `faviconUrl`.
        let json = r#"{"id": "p", "type": "page", "faviconUrl": "x", "devtoolsFrontendUrl": "y"}"#;
        let target: Target = serde_json::from_str(json).unwrap();
        assert_eq!(target.id, "p");
        assert!(target.is_kind("page"));
    }

    #[test]
    fn test_is_kind_is_exact() {
        let target = Target {
            kind: "page".to_string(),
            ..Target::default()
        };
        assert!(target.is_kind("page"));
        assert!(!target.is_kind("Page"));
        assert!(!target.is_kind("app"));
    }
}
