//! V.ZONE Render Engine
//!
//! Offline export pipeline that composites a raw recording onto a
//! background canvas and transcodes it to MP4.
//!
//! # Pipeline Architecture
//!
//! ```text
//! input.webm ──┐
//!              ├── Scale to 85% of canvas
//! background ──┘         │
//!   (lavfi color)        ├── Centre overlay
//!                        │
//! zooms.json ────────────┤   (carried as metadata)
//!                        ▼
//!                 Encode (H.264 + AAC)
//!                        │
//!                        ▼
//!                    output.mp4 ── BlobStore ── URL
//! ```

pub mod blob;
pub mod compose;
pub mod engine;
pub mod export;
pub mod ffmpeg;

pub use blob::*;
pub use compose::*;
pub use engine::*;
pub use export::*;
pub use ffmpeg::{FfmpegEngine, FfmpegEngineLoader};
