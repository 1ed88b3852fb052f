//! Lifecycle phase of the recording/export workflow.

use serde::{Deserialize, Serialize};

/// The single authoritative phase the workflow is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingLifecycleState {
    #[default]
    Idle,
    Recording,
    Paused,
    Processing,
    Finished,
}

impl RecordingLifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Processing => "processing",
            Self::Finished => "finished",
        }
    }

    /// A capture session is live (recording or paused).
    pub fn is_capturing(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

impl std::fmt::Display for RecordingLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse export progress, present only while processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    /// Human-readable stage label.
    pub stage: String,
    /// Percent complete, `0..=100`.
    pub progress: u8,
}

impl ProcessingStatus {
    pub fn new(stage: impl Into<String>, progress: u8) -> Self {
        Self {
            stage: stage.into(),
            progress: progress.min(100),
        }
    }
}
