//! Object detection boundary.
//!
//! The detector itself is an external collaborator behind `DetectorBackend`.
//! This module owns the standardized detection records the rest of the
//! pipeline consumes.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::ScriptedBackend;
pub use registry::BackendRegistry;
pub use result::{BoundingBox, Detection, DetectionFrame};
