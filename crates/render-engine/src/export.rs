//! Export jobs and the staged export pipeline.
//!
//! An export runs four stages against the shared engine and reports coarse
//! progress that never decreases:
//!
//! | stage            | progress  | label                       |
//! |------------------|-----------|-----------------------------|
//! | engine           | 0         | `Initializing engine...`    |
//! | staging          | 10        | `Writing file to memory...` |
//! | transcode        | 20 → 90   | `Rendering video...`        |
//! | finalize         | 90        | `Finalizing...`             |
//!
//! A final `100 / Complete` report is sent before the job resolves. Any
//! failing stage aborts the job; nothing partial is exposed.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use vzone_common::error::{VzoneError, VzoneResult};
use vzone_project_model::{
    BackgroundConfig, ExportedArtifact, MediaBlob, ProcessingStatus, RecordedArtifact,
    ZoomTimeline, EXPORT_MEDIA_TYPE,
};

use crate::blob::BlobStore;
use crate::compose::{transcode_args, CompositionSettings};
use crate::engine::{EngineService, TranscodeEngine};

/// Engine file the raw recording is staged as.
pub const INPUT_FILE: &str = "input.webm";

/// Engine file the transcode writes.
pub const OUTPUT_FILE: &str = "output.mp4";

/// Engine file carrying the zoom timeline alongside the input.
pub const ZOOMS_FILE: &str = "zooms.json";

const RENDER_START_PERCENT: f64 = 20.0;
const RENDER_SPAN_PERCENT: f64 = 70.0;

/// An export job. Inputs are frozen when the job is created.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub recording: RecordedArtifact,
    pub zooms: ZoomTimeline,
    pub background: BackgroundConfig,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Initializing,
    Staging,
    Rendering,
    Finalizing,
    Complete,
}

impl ExportStage {
    pub fn label(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing engine...",
            Self::Staging => "Writing file to memory...",
            Self::Rendering => "Rendering video...",
            Self::Finalizing => "Finalizing...",
            Self::Complete => "Complete",
        }
    }

    /// Short name used in `ExportStageFailed` errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initializing => "engine",
            Self::Staging => "staging",
            Self::Rendering => "transcode",
            Self::Finalizing => "finalize",
            Self::Complete => "complete",
        }
    }
}

/// Export progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    pub stage: ExportStage,
    /// Percent complete, `0..=100`.
    pub percent: u8,
}

impl ExportProgress {
    pub fn status(&self) -> ProcessingStatus {
        ProcessingStatus::new(self.stage.label(), self.percent)
    }
}

impl std::fmt::Display for ExportProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>3}% {}", self.percent, self.stage.label())
    }
}

/// Receives export progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: ExportProgress);
}

impl<F> ProgressSink for F
where
    F: Fn(ExportProgress) + Send + Sync,
{
    fn report(&self, progress: ExportProgress) {
        self(progress)
    }
}

impl ProgressSink for mpsc::UnboundedSender<ExportProgress> {
    fn report(&self, progress: ExportProgress) {
        // A consumer that went away does not fail the export.
        let _ = self.send(progress);
    }
}

/// Map a transcode fraction onto the rendering band of the progress bar.
pub fn rendering_percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return RENDER_START_PERCENT as u8;
    }
    (RENDER_START_PERCENT + fraction.clamp(0.0, 1.0) * RENDER_SPAN_PERCENT).round() as u8
}

/// Forwards progress to a sink, never letting the percentage go down.
struct MonotonicProgress<'a> {
    sink: &'a dyn ProgressSink,
    last: AtomicU8,
    last_stage: std::sync::Mutex<Option<ExportStage>>,
}

impl<'a> MonotonicProgress<'a> {
    fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
            last_stage: std::sync::Mutex::new(None),
        }
    }

    fn emit(&self, stage: ExportStage, percent: u8) {
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        let percent = percent.max(previous);

        let mut last_stage = self.last_stage.lock().unwrap_or_else(|e| e.into_inner());
        if *last_stage == Some(stage) && percent == previous {
            return;
        }
        *last_stage = Some(stage);
        self.sink.report(ExportProgress { stage, percent });
    }
}

/// Runs export jobs against the shared engine.
pub struct ExportPipeline {
    engine: Arc<EngineService>,
    blobs: Arc<dyn BlobStore>,
    settings: CompositionSettings,
}

impl ExportPipeline {
    pub fn new(
        engine: Arc<EngineService>,
        blobs: Arc<dyn BlobStore>,
        settings: CompositionSettings,
    ) -> Self {
        Self {
            engine,
            blobs,
            settings,
        }
    }

    pub fn settings(&self) -> &CompositionSettings {
        &self.settings
    }

    /// Run one export job to completion.
    pub async fn run(
        &self,
        job: ExportJob,
        sink: &dyn ProgressSink,
    ) -> VzoneResult<ExportedArtifact> {
        tracing::info!(
            bytes = job.recording.blob.len(),
            zooms = job.zooms.len(),
            background = %job.background.fill_color(),
            "Starting export"
        );
        let progress = MonotonicProgress::new(sink);

        progress.emit(ExportStage::Initializing, 0);
        let engine = self.engine.acquire().await?;

        let result = self.run_stages(engine.as_ref(), &job, &progress).await;

        for name in [INPUT_FILE, OUTPUT_FILE, ZOOMS_FILE] {
            if let Err(e) = engine.remove(name).await {
                tracing::debug!(file = name, error = %e, "Failed to clean engine file");
            }
        }

        match result {
            Ok(artifact) => {
                progress.emit(ExportStage::Complete, 100);
                tracing::info!(url = %artifact.url, bytes = artifact.blob.len(), "Export complete");
                Ok(artifact)
            }
            Err(e) => {
                tracing::error!(error = %e, "Export failed");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        engine: &dyn TranscodeEngine,
        job: &ExportJob,
        progress: &MonotonicProgress<'_>,
    ) -> VzoneResult<ExportedArtifact> {
        progress.emit(ExportStage::Staging, 10);
        engine
            .write_input(INPUT_FILE, job.recording.blob.bytes())
            .await
            .map_err(|e| stage_error(ExportStage::Staging, e))?;
        let zooms = serde_json::to_vec_pretty(&job.zooms)?;
        engine
            .write_input(ZOOMS_FILE, &zooms)
            .await
            .map_err(|e| stage_error(ExportStage::Staging, e))?;

        progress.emit(ExportStage::Rendering, rendering_percent(0.0));
        let args = transcode_args(INPUT_FILE, OUTPUT_FILE, &job.background, &self.settings);
        let on_fraction = |fraction: f64| {
            progress.emit(ExportStage::Rendering, rendering_percent(fraction));
        };
        engine
            .exec(&args, &on_fraction)
            .await
            .map_err(|e| stage_error(ExportStage::Rendering, e))?;

        progress.emit(ExportStage::Finalizing, 90);
        let bytes = engine
            .read_output(OUTPUT_FILE)
            .await
            .map_err(|e| stage_error(ExportStage::Finalizing, e))?;
        if bytes.is_empty() {
            return Err(stage_error(
                ExportStage::Finalizing,
                VzoneError::transcode("transcoder produced an empty output"),
            ));
        }
        let blob = MediaBlob::new(bytes, EXPORT_MEDIA_TYPE);
        let url = self
            .blobs
            .materialize(&blob)
            .await
            .map_err(|e| stage_error(ExportStage::Finalizing, e))?;

        Ok(ExportedArtifact::new(blob, url))
    }
}

/// Engine messages are carried as-is; other errors keep their own prefix.
fn stage_error(stage: ExportStage, error: VzoneError) -> VzoneError {
    let message = match error {
        VzoneError::Transcode { message } => message,
        other => other.to_string(),
    };
    VzoneError::export_stage(stage.name(), message)
}
