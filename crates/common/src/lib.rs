//! V.ZONE Common Utilities
//!
//! Shared infrastructure for all V.ZONE crates:
//! - Error types and result aliases
//! - Recording clock shared by the capture and event streams
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
