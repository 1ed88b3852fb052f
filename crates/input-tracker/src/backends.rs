//! Pointer source implementations.
//!
//! Each backend provides a different way to observe pointer presses.

use std::collections::VecDeque;

use vzone_common::error::VzoneResult;

use crate::{InputBackend, PointerDown};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(not(target_os = "linux"))]
mod non_linux;

#[cfg(target_os = "linux")]
pub use linux::{detect_best_backend, EvdevBackend};
#[cfg(not(target_os = "linux"))]
pub use non_linux::detect_best_backend;

/// Viewport assumed when the desktop size is unknown.
pub const DEFAULT_VIEWPORT: (f64, f64) = (1920.0, 1080.0);

/// Stub backend that replays scripted presses.
pub struct StubBackend {
    events: VecDeque<PointerDown>,
}

impl StubBackend {
    /// Create a stub backend with pre-loaded events.
    pub fn new(events: Vec<PointerDown>) -> Self {
        Self {
            events: events.into(),
        }
    }

    /// Create an empty stub that never produces events.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl InputBackend for StubBackend {
    fn poll(&mut self) -> VzoneResult<Option<PointerDown>> {
        Ok(self.events.pop_front())
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn is_available(&self) -> bool {
        true
    }
}
