//! Scene context building.
//!
//! Turns a stream of per-frame detections into a structured summary:
//! what is visible now, what was seen across the rolling window, and how
//! the currently visible objects relate to each other spatially.
//!
//! The engine is owned by a single worker; nothing here is shared across threads.

mod engine;
mod prompt;
mod relations;
mod window;

pub use engine::{ContextConfig, ContextEngine, ContextSummary, ContextUpdate};
pub use prompt::{compose_query, render_prompt};
pub use relations::{
    build_relationships, classify_pair, Predicate, RelationConfig, Relationship,
    DEFAULT_HOLDABLE_CLASSES, DEFAULT_SURFACE_CLASSES,
};
pub use window::{RollingWindow, WindowEntry};
