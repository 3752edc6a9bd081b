use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector collaborator.
///
/// Calls are synchronous and may be slow; the pipeline tolerates latency by
/// dropping frames upstream, never by timing the call out.
///
/// Implementations must treat the frame as read-only and must not retain
/// pixels beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Returned detections keep detector order.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Model load / warm-up hook. A failure here is fatal at startup.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
