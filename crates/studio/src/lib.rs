//! V.ZONE Studio
//!
//! The recording workflow as a single actor:
//!
//! ```text
//!   idle ──start──▶ recording ◀──resume── paused
//!    ▲                 │  └─────pause─────▶ │
//!    │                 └──stop / ended──┬───┘
//!  reset                                ▼
//!    └──────────────────────────── finished ◀─┐
//!                                     │       │ success / failure
//!                                   export    │
//!                                     ▼       │
//!                                 processing ─┘
//! ```
//!
//! Presentation layers talk to the studio through a [`StudioHandle`]: they
//! send intents and observe [`StudioSnapshot`]s. Pointer presses go to the
//! [`PointerHub`] in [`StudioDeps`].

mod actor;
pub mod command;
pub mod snapshot;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use vzone_capture_engine::{CaptureProvider, FfmpegCaptureProvider};
use vzone_common::config::{AppConfig, CaptureDefaults};
use vzone_common::error::{VzoneError, VzoneResult};
use vzone_input_tracker::PointerHub;
use vzone_project_model::BackgroundConfig;
use vzone_render_engine::{
    BlobStore, CompositionSettings, EngineConfig, EngineService, ExportPipeline, ExportProgress,
    FfmpegEngineLoader, FileBlobStore,
};

pub use command::{Intent, StudioCommand};
pub use snapshot::{SnapshotSummary, StudioSnapshot};

const COMMAND_BUFFER: usize = 32;
const PROGRESS_BUFFER: usize = 64;

/// Collaborators the studio drives.
#[derive(Clone)]
pub struct StudioDeps {
    pub capture: Arc<dyn CaptureProvider>,
    pub exporter: Arc<ExportPipeline>,

    /// Materializes the raw recording for preview.
    pub blobs: Arc<dyn BlobStore>,

    pub pointer_hub: PointerHub,
    pub capture_defaults: CaptureDefaults,
}

impl StudioDeps {
    /// Real capture and export through the system ffmpeg, writing artifacts
    /// to the configured output directory.
    pub fn from_config(config: &AppConfig) -> Self {
        let blobs: Arc<dyn BlobStore> = Arc::new(FileBlobStore::new(&config.export.output_dir));
        let engine = Arc::new(EngineService::new(
            Arc::new(FfmpegEngineLoader),
            EngineConfig::default(),
        ));
        let exporter = Arc::new(ExportPipeline::new(
            engine,
            blobs.clone(),
            CompositionSettings::from(&config.export),
        ));
        Self {
            capture: Arc::new(FfmpegCaptureProvider::new()),
            exporter,
            blobs,
            pointer_hub: PointerHub::new(),
            capture_defaults: config.capture.clone(),
        }
    }
}

/// Spawns studio actors.
pub struct Studio;

impl Studio {
    /// Spawn the actor on the current runtime.
    pub fn spawn(deps: StudioDeps) -> StudioHandle {
        Self::spawn_with_background(deps, BackgroundConfig::default())
    }

    pub fn spawn_with_background(deps: StudioDeps, background: BackgroundConfig) -> StudioHandle {
        let initial = StudioSnapshot {
            background,
            ..StudioSnapshot::default()
        };
        let (snapshot_tx, snapshots) = watch::channel(initial);
        let (progress_tx, _) = broadcast::channel(PROGRESS_BUFFER);
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let pointer_hub = deps.pointer_hub.clone();

        let actor = actor::StudioActor::new(deps, snapshot_tx, progress_tx.clone(), command_rx);
        let task = tokio::spawn(actor.run());

        StudioHandle {
            commands,
            snapshots,
            progress: progress_tx,
            pointer_hub,
            task: Arc::new(std::sync::Mutex::new(Some(task))),
        }
    }
}

/// Cloneable handle to a running studio.
#[derive(Clone)]
pub struct StudioHandle {
    commands: mpsc::Sender<StudioCommand>,
    snapshots: watch::Receiver<StudioSnapshot>,
    progress: broadcast::Sender<ExportProgress>,
    pointer_hub: PointerHub,
    task: Arc<std::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl StudioHandle {
    /// Send an intent and wait for its outcome.
    pub async fn send(&self, intent: Intent) -> VzoneResult<()> {
        let (command, reply) = StudioCommand::new(intent);
        self.commands
            .send(command)
            .await
            .map_err(|_| studio_gone())?;
        reply.await.map_err(|_| studio_gone())?
    }

    pub async fn start(&self) -> VzoneResult<()> {
        self.send(Intent::Start).await
    }

    pub async fn pause(&self) -> VzoneResult<()> {
        self.send(Intent::Pause).await
    }

    pub async fn resume(&self) -> VzoneResult<()> {
        self.send(Intent::Resume).await
    }

    pub async fn stop(&self) -> VzoneResult<()> {
        self.send(Intent::Stop).await
    }

    /// Begin an export. Resolves once processing has started; watch the
    /// snapshot for the outcome.
    pub async fn export(&self) -> VzoneResult<()> {
        self.send(Intent::Export).await
    }

    pub async fn reset(&self) -> VzoneResult<()> {
        self.send(Intent::Reset).await
    }

    pub async fn set_background(&self, background: BackgroundConfig) -> VzoneResult<()> {
        self.send(Intent::SetBackground(background)).await
    }

    /// Stop any live capture and end the actor.
    pub async fn shutdown(&self) -> VzoneResult<()> {
        self.send(Intent::Shutdown).await?;
        let task = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Studio task ended abnormally");
            }
        }
        Ok(())
    }

    /// Latest snapshot.
    pub fn snapshot(&self) -> StudioSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StudioSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&StudioSnapshot) -> bool,
    ) -> VzoneResult<StudioSnapshot> {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| studio_gone())?;
        Ok(snapshot.clone())
    }

    /// Every export progress report, in order.
    pub fn export_progress(&self) -> broadcast::Receiver<ExportProgress> {
        self.progress.subscribe()
    }

    /// Where pointer presses for zoom detection are published.
    pub fn pointer_hub(&self) -> &PointerHub {
        &self.pointer_hub
    }
}

fn studio_gone() -> VzoneError {
    VzoneError::Other(anyhow::anyhow!("studio actor is not running"))
}
