//! Read-only view of the studio published after every transition.

use serde::Serialize;
use vzone_project_model::{
    ArtifactUrl, BackgroundConfig, ExportedArtifact, ProcessingStatus, RecordedArtifact,
    RecordingLifecycleState, ZoomTimeline,
};

/// Everything a presentation layer needs to render the studio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudioSnapshot {
    pub state: RecordingLifecycleState,

    /// Whole seconds spent recording.
    pub time: u64,

    pub zooms: ZoomTimeline,
    pub background: BackgroundConfig,

    /// Raw capture, present from stop until reset.
    pub recorded: Option<RecordedArtifact>,

    /// Result of the last successful export.
    pub exported: Option<ExportedArtifact>,

    /// Present only while processing.
    pub processing: Option<ProcessingStatus>,

    /// Most recent user-facing failure.
    pub last_error: Option<String>,

    /// Failures surfaced so far. Each failure counts once.
    pub error_count: u64,
}

impl StudioSnapshot {
    /// URL the preview should show: the export if there is one, else the
    /// raw capture.
    pub fn display_url(&self) -> Option<&ArtifactUrl> {
        self.exported
            .as_ref()
            .map(|e| &e.url)
            .or_else(|| self.recorded.as_ref().and_then(|r| r.url.as_ref()))
    }

    /// Timer formatted as `MM:SS`.
    pub fn time_label(&self) -> String {
        format!("{:02}:{:02}", self.time / 60, self.time % 60)
    }

    /// Serializable summary for logs and the CLI.
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            state: self.state,
            time: self.time_label(),
            zooms: self.zooms.len(),
            background: self.background.css(),
            url: self.display_url().map(|u| u.to_string()),
            processing: self.processing.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Compact, serializable form of a [`StudioSnapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub state: RecordingLifecycleState,
    pub time: String,
    pub zooms: usize,
    pub background: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<ProcessingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}
