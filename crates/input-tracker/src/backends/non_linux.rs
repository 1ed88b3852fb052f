//! Non-Linux pointer backend selection.

use crate::backends::StubBackend;
use crate::InputBackend;

pub fn detect_best_backend(_viewport: (f64, f64)) -> Box<dyn InputBackend> {
    tracing::warn!(
        "Pointer capture backends for this platform are not implemented yet; zoom effects will not be detected"
    );
    Box::new(StubBackend::empty())
}
