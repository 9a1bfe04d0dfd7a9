//! Target discovery over the debugging endpoint's HTTP interface.
//!
//! The debugging address is configured with the protocol scheme the control
//! connection uses (`ws://127.0.0.1:9222`).  The target listing is served
//! over plain HTTP on the same host and port, so the scheme is rewritten for
//! this one request:
//!
//! ```text
//! ws://127.0.0.1:9222   →  GET http://127.0.0.1:9222/json
//! wss://10.0.0.5:9222   →  GET https://10.0.0.5:9222/json
//! ```

use tracing::debug;

use mirror_core::Target;

use crate::application::DiscoveryError;

/// Rewrites a debugging-protocol address into its HTTP equivalent.
///
/// Addresses that already use `http://` or `https://` are returned unchanged
/// apart from a trailing slash.
pub fn discovery_address(debugger_url: &str) -> String {
    let trimmed = debugger_url.trim().trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("ws://") {
        format!("http://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("wss://") {
        format!("https://{rest}")
    } else {
        trimmed.to_string()
    }
}

/// Fetches a fresh target list from `<http address>/json`.
///
/// # Errors
///
/// - [`DiscoveryError::Unreachable`] if the request fails or the endpoint
///   answers with a non-success status.  The attempted address is embedded.
/// - [`DiscoveryError::Malformed`] if the body is not a JSON target array.
pub async fn fetch_targets(
    client: &reqwest::Client,
    debugger_url: &str,
) -> Result<Vec<Target>, DiscoveryError> {
    let address = discovery_address(debugger_url);
    let url = format!("{address}/json");
    debug!("listing targets at {url}");

    let unreachable = |e: reqwest::Error| DiscoveryError::Unreachable {
        address: address.clone(),
        source: Box::new(e),
    };

    let body = client
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(unreachable)?
        .bytes()
        .await
        .map_err(unreachable)?;

    serde_json::from_slice(&body).map_err(|source| DiscoveryError::Malformed {
        address: address.clone(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_scheme_is_rewritten_to_http() {
        assert_eq!(
            discovery_address("ws://127.0.0.1:9222"),
            "http://127.0.0.1:9222"
        );
    }

    #[test]
    fn test_wss_scheme_is_rewritten_to_https() {
        assert_eq!(discovery_address("wss://host:9222"), "https://host:9222");
    }

    #[test]
    fn test_trailing_slash_is_removed() {
        assert_eq!(
            discovery_address("ws://127.0.0.1:9222/"),
            "http://127.0.0.1:9222"
        );
    }

    #[test]
    fn test_http_address_is_kept() {
        assert_eq!(discovery_address("http://localhost:9333"), "http://localhost:9333");
    }

    #[test]
    fn test_only_leading_scheme_is_rewritten() {
        // A path containing "ws://" must not be touched.
        assert_eq!(
            discovery_address("ws://proxy/ws://inner"),
            "http://proxy/ws://inner"
        );
    }
}
