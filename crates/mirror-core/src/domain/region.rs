//! Named UI panels that captures can be cropped to.
//!
//! VS Code-derived applications lay their workbench out as `.part.*` panels.
//! Cropping to one panel keeps frames small and readable on a phone screen.
//!
//! | Name            | Selector              | Panel                         |
//! |-----------------|-----------------------|-------------------------------|
//! | `editor`        | `.part.editor`        | Main editor area              |
//! | `auxiliary-bar` | `.part.auxiliarybar`  | Right-side chat/agent panel   |
//! | `sidebar`       | `.part.sidebar`       | Left-side explorer panel      |
//!
//! Any other non-empty string is taken as a raw CSS selector.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing an empty region string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("capture region must be a panel name or a non-empty CSS selector")]
pub struct EmptyRegion;

/// The UI region captured on each tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaptureRegion {
    /// The main editor area.
    Editor,
    /// The right-hand auxiliary bar, where agent and chat panels live.
    #[default]
    AuxiliaryBar,
    /// The left-hand sidebar.
    Sidebar,
    /// A caller-supplied CSS selector.
    Custom(String),
}

impl CaptureRegion {
    /// The CSS selector identifying this region in the source document.
    pub fn selector(&self) -> &str {
        match self {
            CaptureRegion::Editor => ".part.editor",
            CaptureRegion::AuxiliaryBar => ".part.auxiliarybar",
            CaptureRegion::Sidebar => ".part.sidebar",
            CaptureRegion::Custom(selector) => selector,
        }
    }

    fn name(&self) -> &str {
        match self {
            CaptureRegion::Editor => "editor",
            CaptureRegion::AuxiliaryBar => "auxiliary-bar",
            CaptureRegion::Sidebar => "sidebar",
            CaptureRegion::Custom(selector) => selector,
        }
    }
}

impl FromStr for CaptureRegion {
    type Err = EmptyRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(EmptyRegion),
            "editor" => Ok(CaptureRegion::Editor),
            "auxiliary-bar" | "auxiliarybar" => Ok(CaptureRegion::AuxiliaryBar),
            "sidebar" => Ok(CaptureRegion::Sidebar),
            other => Ok(CaptureRegion::Custom(other.to_string())),
        }
    }
}

impl TryFrom<String> for CaptureRegion {
    type Error = EmptyRegion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CaptureRegion> for String {
    fn from(region: CaptureRegion) -> Self {
        region.name().to_string()
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
