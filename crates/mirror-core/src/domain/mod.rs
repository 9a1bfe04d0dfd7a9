//! Domain entities for the mirror relay.
//!
//! This module contains pure business logic with no infrastructure
//! dependencies.  Code in the relay's application and infrastructure layers
//! depends on these types, but nothing here depends on them.

/// Remote-debuggable surfaces as listed by the discovery endpoint.
pub mod target;

/// Ordered heuristics that choose the application window among targets.
pub mod resolver;

/// Viewer-originated events and the scripted actions they produce.
pub mod event;

/// Named UI panels used to crop captured frames.
pub mod region;
