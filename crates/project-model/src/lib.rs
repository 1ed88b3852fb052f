//! V.ZONE Project Model
//!
//! Defines the core data contracts shared by the studio crates:
//! - **Zoom effects:** timestamped click records captured during recording
//! - **Background:** the canvas behind the composited export
//! - **Artifacts:** raw captured media and the derived export
//! - **Lifecycle:** the single authoritative phase of the workflow
//!
//! Cursor coordinates are normalized to `[0.0, 1.0]` relative to the
//! surface the pointer events were sampled against.

pub mod artifact;
pub mod background;
pub mod lifecycle;
pub mod zoom;

pub use artifact::*;
pub use background::*;
pub use lifecycle::*;
pub use zoom::*;
