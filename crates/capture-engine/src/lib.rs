//! V.ZONE Capture Engine
//!
//! Acquires a display (+audio) stream from a platform capture provider,
//! records it into a WebM container and finalizes the buffered chunks into
//! a raw artifact.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               CaptureSession                │
//! │  ┌───────────────┐      ┌────────────────┐  │
//! │  │ MediaStream   │─────▶│ MediaRecorder  │  │
//! │  │ video + audio │      │ (WebM encoder) │  │
//! │  └───────┬───────┘      └───────┬────────┘  │
//! │          │ ended signal         │ chunks    │
//! │          ▼                      ▼           │
//! │   studio stop intent     RecordedArtifact   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Providers: [`FfmpegCaptureProvider`] grabs the real display through an
//! ffmpeg child process, [`MemoryCaptureProvider`] is synthetic.

pub mod backend;
pub mod session;

pub use backend::*;
pub use session::*;
