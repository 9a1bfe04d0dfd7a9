//! Target selection: picks the application window among many candidates.
//!
//! A Chromium-based desktop application typically exposes a dozen targets at
//! once: the main window, embedded webviews, extension hosts, shared workers,
//! and sometimes ordinary browser tabs if a browser shares the debugging port.
//! The relay must attach to exactly one of them.
//!
//! # Strategy chain
//!
//! Selection is an ordered list of predicates over a [`Target`].  The first
//! strategy that matches any target wins; within a strategy, list order breaks
//! ties.
//!
//! ```text
//! 1. TitleMatch    title (lowercased) contains a known application marker
//! 2. ShellKind     connectable, and kind == "app"  (Electron app shells)
//! 3. PageFallback  connectable, kind == "page", title not on the denylist
//! ```
//!
//! If nothing matches, [`ResolveError::NoValidTarget`] is returned.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

use crate::domain::target::Target;

/// Errors produced by [`TargetResolver::resolve`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// No strategy matched any target in the list (including an empty list).
    #[error("no valid application window found among {candidates} targets")]
    NoValidTarget { candidates: usize },
}

/// One step of the selection chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Title contains one of [`ResolverPolicy::title_markers`], case-insensitive.
    TitleMatch,
    /// Connectable target whose kind equals [`ResolverPolicy::shell_kind`].
    ShellKind,
    /// Connectable generic page whose title avoids [`ResolverPolicy::denylist`].
    PageFallback,
}

impl Strategy {
    /// All strategies in precedence order.
    pub const CHAIN: [Strategy; 3] = [
        Strategy::TitleMatch,
        Strategy::ShellKind,
        Strategy::PageFallback,
    ];

    /// Returns `true` if `target` satisfies this strategy under `policy`.
    pub fn matches(self, policy: &ResolverPolicy, target: &Target) -> bool {
        match self {
            Strategy::TitleMatch => {
                let title = target.title.to_lowercase();
                policy
                    .title_markers
                    .iter()
                    .any(|marker| title.contains(&marker.to_lowercase()))
            }
            Strategy::ShellKind => target.is_connectable() && target.is_kind(&policy.shell_kind),
            Strategy::PageFallback => {
                target.is_connectable()
                    && target.is_kind(&policy.page_kind)
                    && !policy
                        .denylist
                        .iter()
                        .any(|junk| target.title.contains(junk.as_str()))
            }
        }
    }

    /// Short label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            Strategy::TitleMatch => "title",
            Strategy::ShellKind => "kind",
            Strategy::PageFallback => "fallback",
        }
    }
}

/// The string lists that drive the strategy chain.
///
/// The defaults target the Antigravity IDE; other Electron applications can be
/// mirrored by supplying their own markers through the relay's config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverPolicy {
    /// Title fragments identifying the application window (any case).
    #[serde(default = "default_title_markers")]
    pub title_markers: Vec<String>,

    /// Kind tag used by application shells, as opposed to browser tabs.
    #[serde(default = "default_shell_kind")]
    pub shell_kind: String,

    /// Kind tag of generic pages considered by the fallback strategy.
    #[serde(default = "default_page_kind")]
    pub page_kind: String,

    /// Title fragments (case-sensitive) that disqualify a fallback page.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

fn default_title_markers() -> Vec<String> {
    vec!["antigravity".to_string(), "agent manager".to_string()]
}

fn default_shell_kind() -> String {
    "app".to_string()
}

fn default_page_kind() -> String {
    "page".to_string()
}

fn default_denylist() -> Vec<String> {
    ["SharedWorker", "Extension", "New Tab", "Google Chrome"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            title_markers: default_title_markers(),
            shell_kind: default_shell_kind(),
            page_kind: default_page_kind(),
            denylist: default_denylist(),
        }
    }
}

/// Applies a [`ResolverPolicy`] to target lists.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    policy: ResolverPolicy,
}

impl TargetResolver {
    /// Creates a resolver for the given policy.
    pub fn new(policy: ResolverPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in use.
    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    /// Selects exactly one target from `targets`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoValidTarget`] if no strategy matches.
    pub fn resolve<'a>(&self, targets: &'a [Target]) -> Result<&'a Target, ResolveError> {
        self.resolve_with_strategy(targets).map(|(target, _)| target)
    }

    /// Like [`resolve`](Self::resolve), but also reports which strategy won.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NoValidTarget`] if no strategy matches.
    pub fn resolve_with_strategy<'a>(
        &self,
        targets: &'a [Target],
    ) -> Result<(&'a Target, Strategy), ResolveError> {
        for strategy in Strategy::CHAIN {
            if let Some(target) = targets
                .iter()
                .find(|t| strategy.matches(&self.policy, t))
            {
                return Ok((target, strategy));
            }
            trace!("strategy '{}' matched none of {} targets", strategy.label(), targets.len());
        }

        Err(ResolveError::NoValidTarget {
            candidates: targets.len(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: &str, title: &str, kind: &str, ws: &str) -> Target {
        Target {
            id: id.to_string(),
            title: title.to_string(),
            kind: kind.to_string(),
            url: String::new(),
            web_socket_debugger_url: ws.to_string(),
        }
    }

    fn resolve_id(targets: &[Target]) -> Result<String, ResolveError> {
        TargetResolver::default()
            .resolve(targets)
            .map(|t| t.id.clone())
    }

    // ── Strategy 1: title match ───────────────────────────────────────────────

    #[test]
    fn test_title_match_wins_over_earlier_page() {
        // Arrange: the scenario from the discovery listing of a running IDE
        let targets = vec![
            target("a", "Random Tab", "page", "ws://x/a"),
            target("b", "Agent Manager", "page", "ws://x/b"),
        ];

        // Act
        let id = resolve_id(&targets).unwrap();

        // Assert
        assert_eq!(id, "b");
    }

    #[test]
    fn test_title_match_is_case_insensitive() {
        let targets = vec![target("z", "my ANTIGRAVITY window", "other", "")];
        assert_eq!(resolve_id(&targets).unwrap(), "z");
    }

    #[test]
    fn test_title_match_takes_precedence_regardless_of_order() {
        // The title-matching entry must win whether it is first, last, or in
        // the middle, even when an "app" shell is also present.
        let marker = target("hit", "Antigravity", "page", "ws://x/hit");
        let shell = target("shell", "Shell", "app", "ws://x/shell");
        let page = target("page", "Docs", "page", "ws://x/page");

        let orders = [
            vec![marker.clone(), shell.clone(), page.clone()],
            vec![shell.clone(), marker.clone(), page.clone()],
            vec![shell.clone(), page.clone(), marker.clone()],
        ];

        for targets in orders {
            assert_eq!(resolve_id(&targets).unwrap(), "hit");
        }
    }

    #[test]
    fn test_first_title_match_wins_on_tie() {
        let targets = vec![
            target("first", "Agent Manager", "page", "ws://x/1"),
            target("second", "Antigravity", "page", "ws://x/2"),
        ];
        assert_eq!(resolve_id(&targets).unwrap(), "first");
    }

    // ── Strategy 2: shell kind ────────────────────────────────────────────────

    #[test]
    fn test_app_kind_selected_when_no_title_matches() {
        let targets = vec![
            target("p", "Docs", "page", "ws://x/p"),
            target("a1", "Main", "app", "ws://x/a1"),
            target("a2", "Second", "app", "ws://x/a2"),
        ];
        let (chosen, strategy) = TargetResolver::default()
            .resolve_with_strategy(&targets)
            .unwrap();
        assert_eq!(chosen.id, "a1");
        assert_eq!(strategy, Strategy::ShellKind);
    }

    #[test]
    fn test_app_kind_without_address_is_skipped() {
        let targets = vec![
            target("dead", "Main", "app", ""),
            target("live", "Second", "app", "ws://x/live"),
        ];
        assert_eq!(resolve_id(&targets).unwrap(), "live");
    }

    // ── Strategy 3: page fallback ─────────────────────────────────────────────

    #[test]
    fn test_denylisted_pages_are_never_returned() {
        let targets = vec![
            target("1", "New Tab", "page", "ws://x/1"),
            target("2", "Extension: Copilot", "page", "ws://x/2"),
            target("3", "SharedWorker host", "page", "ws://x/3"),
            target("4", "Google Chrome", "page", "ws://x/4"),
            target("5", "Workspace", "page", "ws://x/5"),
        ];
        let (chosen, strategy) = TargetResolver::default()
            .resolve_with_strategy(&targets)
            .unwrap();
        assert_eq!(chosen.id, "5");
        assert_eq!(strategy, Strategy::PageFallback);
    }

    #[test]
    fn test_page_without_address_is_skipped() {
        let targets = vec![
            target("noaddr", "Workspace", "page", ""),
            target("ok", "Workspace 2", "page", "ws://x/ok"),
        ];
        assert_eq!(resolve_id(&targets).unwrap(), "ok");
    }

    #[test]
    fn test_worker_kind_is_not_a_fallback() {
        let targets = vec![target("w", "Worker", "service_worker", "ws://x/w")];
        assert!(resolve_id(&targets).is_err());
    }

    // ── Failure ───────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_list_fails() {
        assert_eq!(
            resolve_id(&[]),
            Err(ResolveError::NoValidTarget { candidates: 0 })
        );
    }

    #[test]
    fn test_only_denylisted_or_unconnectable_entries_fails() {
        let targets = vec![
            target("1", "New Tab", "page", "ws://x/1"),
            target("2", "Workspace", "page", ""),
            target("3", "Shell", "app", ""),
        ];
        assert_eq!(
            resolve_id(&targets),
            Err(ResolveError::NoValidTarget { candidates: 3 })
        );
    }

    // ── Policy ────────────────────────────────────────────────────────────────

    #[test]
    fn test_custom_markers_replace_defaults() {
        // Arrange: a policy tuned for a different Electron application
        let policy = ResolverPolicy {
            title_markers: vec!["Cursor".to_string()],
            ..ResolverPolicy::default()
        };
        let resolver = TargetResolver::new(policy);
        let targets = vec![
            target("ag", "Antigravity", "worker", ""),
            target("cu", "project - cursor", "page", "ws://x/cu"),
        ];

        // Act
        let chosen = resolver.resolve(&targets).unwrap();

        // Assert: the default "antigravity" marker no longer applies
        assert_eq!(chosen.id, "cu");
    }

    #[test]
    fn test_policy_deserializes_with_partial_fields() {
        let policy: ResolverPolicy =
            serde_json::from_str(r#"{"title_markers": ["code"]}"#).unwrap();
        assert_eq!(policy.title_markers, vec!["code".to_string()]);
        assert_eq!(policy.shell_kind, "app");
        assert_eq!(policy.denylist.len(), 4);
    }

    #[test]
    fn test_strategy_chain_order() {
        assert_eq!(
            Strategy::CHAIN,
            [Strategy::TitleMatch, Strategy::ShellKind, Strategy::PageFallback]
        );
    }
}
