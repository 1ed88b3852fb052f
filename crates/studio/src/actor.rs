//! The studio actor: sole owner of the recording lifecycle.
//!
//! One task owns every piece of mutable state. Intents arrive as
//! [`StudioCommand`]s; timer ticks, the native "stop sharing" signal,
//! pointer samples and export progress are all awaited in the same biased
//! `select!`, so transitions never interleave. The timer and the pointer
//! subscription exist only while recording and are dropped on the spot when
//! leaving it.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use vzone_capture_engine::{CaptureConstraints, CaptureSession};
use vzone_common::clock::RecordingClock;
use vzone_common::error::{VzoneError, VzoneResult};
use vzone_input_tracker::ZoomTracker;
use vzone_project_model::{
    ExportedArtifact, ProcessingStatus, RecordingLifecycleState, ZoomEffect,
};
use vzone_render_engine::{ExportJob, ExportProgress, ExportStage};

use crate::command::{Intent, StudioCommand};
use crate::snapshot::StudioSnapshot;
use crate::StudioDeps;

const TICK: Duration = Duration::from_secs(1);

/// An export running in its own task.
struct ExportTask {
    progress: mpsc::UnboundedReceiver<ExportProgress>,
    handle: JoinHandle<VzoneResult<ExportedArtifact>>,
}

enum ExportEvent {
    Progress(ExportProgress),
    Done(Result<VzoneResult<ExportedArtifact>, tokio::task::JoinError>),
}

/// Whether the actor loop keeps running after a command.
enum Flow {
    Continue,
    Shutdown,
}

pub(crate) struct StudioActor {
    deps: StudioDeps,
    snapshot: StudioSnapshot,
    publisher: watch::Sender<StudioSnapshot>,
    progress_tx: broadcast::Sender<ExportProgress>,
    commands: mpsc::Receiver<StudioCommand>,
    session: Option<CaptureSession>,
    ended: Option<watch::Receiver<bool>>,
    timer: Option<Interval>,

    /// Start of the second currently being counted.
    tick_origin: Instant,

    /// Part of a second already recorded before the last pause.
    carried: Duration,

    tracker: Option<ZoomTracker>,
    export: Option<ExportTask>,
}

impl StudioActor {
    pub(crate) fn new(
        deps: StudioDeps,
        publisher: watch::Sender<StudioSnapshot>,
        progress_tx: broadcast::Sender<ExportProgress>,
        commands: mpsc::Receiver<StudioCommand>,
    ) -> Self {
        let snapshot = publisher.borrow().clone();
        Self {
            deps,
            snapshot,
            publisher,
            progress_tx,
            commands,
            session: None,
            ended: None,
            timer: None,
            tick_origin: Instant::now(),
            carried: Duration::ZERO,
            tracker: None,
            export: None,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!("Studio started");
        loop {
            tokio::select! {
                biased;

                scheduled = next_tick(&mut self.timer), if self.timer.is_some() => {
                    self.tick_origin = scheduled;
                    self.snapshot.time += 1;
                    self.publish();
                }

                ended = next_ended(&mut self.ended), if self.ended.is_some() => {
                    match ended {
                        Ok(true) => {
                            tracing::info!("Capture ended outside the application; stopping");
                            if let Err(e) = self.stop().await {
                                tracing::warn!(error = %e, "Stop after external end failed");
                            }
                        }
                        Ok(false) => {}
                        Err(_) => self.ended = None,
                    }
                }

                effect = next_effect(&mut self.tracker), if self.tracker.is_some() => {
                    match effect {
                        Some(effect) => self.record_zoom(effect),
                        None => {
                            tracing::warn!("Pointer hub closed; zoom detection disabled");
                            self.tracker = None;
                        }
                    }
                }

                event = next_export_event(&mut self.export), if self.export.is_some() => {
                    self.on_export_event(event);
                }

                command = self.commands.recv() => {
                    let Some(StudioCommand { intent, reply }) = command else {
                        tracing::info!("All studio handles dropped");
                        self.shutdown().await;
                        break;
                    };
                    let (result, flow) = self.handle(intent).await;
                    let _ = reply.send(result);
                    if matches!(flow, Flow::Shutdown) {
                        break;
                    }
                }
            }
        }
        tracing::info!("Studio stopped");
    }

    async fn handle(&mut self, intent: Intent) -> (VzoneResult<()>, Flow) {
        tracing::debug!(intent = intent.name(), state = %self.snapshot.state, "Handling intent");
        let result = match intent {
            Intent::Start => self.start().await,
            Intent::Pause => self.pause().await,
            Intent::Resume => self.resume().await,
            Intent::Stop => self.stop().await,
            Intent::Export => self.begin_export(),
            Intent::Reset => self.reset(),
            Intent::SetBackground(background) => {
                tracing::info!(background = %background.css(), "Background changed");
                self.snapshot.background = background;
                self.publish();
                Ok(())
            }
            Intent::Shutdown => {
                self.shutdown().await;
                return (Ok(()), Flow::Shutdown);
            }
        };
        (result, Flow::Continue)
    }

    fn require(&self, intent: &str, allowed: &[RecordingLifecycleState]) -> VzoneResult<()> {
        if allowed.contains(&self.snapshot.state) {
            Ok(())
        } else {
            Err(VzoneError::invalid_transition(
                self.snapshot.state.as_str(),
                intent,
            ))
        }
    }

    async fn start(&mut self) -> VzoneResult<()> {
        self.require("start", &[RecordingLifecycleState::Idle])?;

        let defaults = &self.deps.capture_defaults;
        let constraints = CaptureConstraints {
            display_surface: defaults.display_surface.clone(),
            audio: defaults.audio,
            fps: defaults.fps,
        };
        let session = match CaptureSession::start(
            self.deps.capture.clone(),
            &constraints,
            &defaults.codec_hint,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                self.notify_error("Failed to start recording", &e);
                return Err(e);
            }
        };

        self.snapshot.time = 0;
        self.carried = Duration::ZERO;
        self.snapshot.zooms.clear();
        self.snapshot.recorded = None;
        self.snapshot.exported = None;
        self.snapshot.processing = None;

        self.ended = Some(session.ended_signal());
        self.attach_recording(
            session.clock().clone(),
            Some(session.media_start_offset_ms()),
        );
        self.session = Some(session);
        self.snapshot.state = RecordingLifecycleState::Recording;
        self.publish();
        tracing::info!("Recording started");
        Ok(())
    }

    async fn pause(&mut self) -> VzoneResult<()> {
        self.require("pause", &[RecordingLifecycleState::Recording])?;
        let Some(session) = self.session.as_mut() else {
            return Err(VzoneError::recorder_state("no capture session"));
        };
        if let Err(e) = session.pause().await {
            self.notify_error("Failed to pause recording", &e);
            return Err(e);
        }

        self.detach_recording();
        self.snapshot.state = RecordingLifecycleState::Paused;
        self.publish();
        Ok(())
    }

    async fn resume(&mut self) -> VzoneResult<()> {
        self.require("resume", &[RecordingLifecycleState::Paused])?;
        let Some(session) = self.session.as_mut() else {
            return Err(VzoneError::recorder_state("no capture session"));
        };
        if let Err(e) = session.resume().await {
            self.notify_error("Failed to resume recording", &e);
            return Err(e);
        }

        let clock = session.clock().clone();
        self.attach_recording(clock, None);
        self.snapshot.state = RecordingLifecycleState::Recording;
        self.publish();
        Ok(())
    }

    async fn stop(&mut self) -> VzoneResult<()> {
        self.require(
            "stop",
            &[
                RecordingLifecycleState::Recording,
                RecordingLifecycleState::Paused,
            ],
        )?;
        self.detach_recording();
        self.ended = None;

        let Some(session) = self.session.take() else {
            return Err(VzoneError::recorder_state("no capture session"));
        };
        let mut recorded = match session.stop().await {
            Ok(recorded) => recorded,
            Err(e) => {
                self.snapshot.state = RecordingLifecycleState::Idle;
                self.notify_error("Failed to finalize recording", &e);
                return Err(e);
            }
        };

        match self.deps.blobs.materialize(&recorded.blob).await {
            Ok(url) => recorded = recorded.with_url(url),
            Err(e) => tracing::warn!(error = %e, "Raw recording has no preview URL"),
        }

        tracing::info!(
            time = self.snapshot.time,
            zooms = self.snapshot.zooms.len(),
            bytes = recorded.blob.len(),
            "Recording finished"
        );
        self.snapshot.recorded = Some(recorded);
        self.snapshot.state = RecordingLifecycleState::Finished;
        self.publish();
        Ok(())
    }

    fn begin_export(&mut self) -> VzoneResult<()> {
        self.require("export", &[RecordingLifecycleState::Finished])?;
        let Some(recording) = self.snapshot.recorded.clone() else {
            return Err(VzoneError::invalid_transition(
                "finished without a recording",
                "export",
            ));
        };

        let job = ExportJob {
            recording,
            zooms: self.snapshot.zooms.clone(),
            background: self.snapshot.background.clone(),
        };
        let (tx, progress) = mpsc::unbounded_channel();
        let pipeline = self.deps.exporter.clone();
        let handle = tokio::spawn(async move { pipeline.run(job, &tx).await });
        self.export = Some(ExportTask { progress, handle });

        // A previous export stays visible until this one succeeds.
        self.snapshot.processing = Some(ProcessingStatus::new(
            ExportStage::Initializing.label(),
            0,
        ));
        self.snapshot.state = RecordingLifecycleState::Processing;
        self.publish();
        Ok(())
    }

    fn on_export_event(&mut self, event: ExportEvent) {
        match event {
            ExportEvent::Progress(progress) => {
                let _ = self.progress_tx.send(progress);
                self.snapshot.processing = Some(progress.status());
                self.publish();
            }
            ExportEvent::Done(result) => {
                self.export = None;
                self.snapshot.processing = None;
                self.snapshot.state = RecordingLifecycleState::Finished;
                match result {
                    Ok(Ok(exported)) => {
                        tracing::info!(url = %exported.url, "Exported video ready");
                        self.snapshot.exported = Some(exported);
                    }
                    Ok(Err(e)) => self.notify_error("Export failed", &e),
                    Err(join) => {
                        let e = VzoneError::export_stage("task", join.to_string());
                        self.notify_error("Export failed", &e);
                    }
                }
                self.publish();
            }
        }
    }

    fn reset(&mut self) -> VzoneResult<()> {
        self.require("reset", &[RecordingLifecycleState::Finished])?;
        let background = std::mem::take(&mut self.snapshot.background);
        let error_count = self.snapshot.error_count;
        self.carried = Duration::ZERO;
        self.snapshot = StudioSnapshot {
            background,
            error_count,
            ..StudioSnapshot::default()
        };
        self.publish();
        tracing::info!("Studio reset");
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.detach_recording();
        self.ended = None;
        if let Some(session) = self.session.take() {
            if let Err(e) = session.stop().await {
                tracing::warn!(error = %e, "Capture did not stop cleanly during shutdown");
            }
        }
        if let Some(export) = self.export.take() {
            export.handle.abort();
        }
    }

    /// Start the 1 Hz timer and the pointer subscription.
    ///
    /// The first tick lands once the second interrupted by the last pause is
    /// complete. `media_start_offset_ms` is set on the first attach of a
    /// session so the tracker can report its lag behind the recorder.
    fn attach_recording(&mut self, clock: RecordingClock, media_start_offset_ms: Option<u64>) {
        let now = Instant::now();
        self.tick_origin = now.checked_sub(self.carried).unwrap_or(now);
        let mut timer = tokio::time::interval_at(now + (TICK - self.carried), TICK);
        timer.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.timer = Some(timer);

        let hub = &self.deps.pointer_hub;
        self.tracker = Some(match media_start_offset_ms {
            Some(offset) => ZoomTracker::subscribe_measured(hub, clock, offset),
            None => ZoomTracker::subscribe(hub, clock),
        });
    }

    fn detach_recording(&mut self) {
        if self.timer.take().is_some() {
            let partial = Instant::now().saturating_duration_since(self.tick_origin);
            self.carried = partial.min(TICK - Duration::from_millis(1));
        }
        self.tracker = None;
    }

    fn record_zoom(&mut self, effect: ZoomEffect) {
        tracing::info!(
            id = %effect.id,
            timestamp_ms = effect.timestamp,
            x = effect.cursor_position.x,
            y = effect.cursor_position.y,
            "Zoom effect recorded"
        );
        self.snapshot.zooms.push(effect);
        self.publish();
    }

    fn notify_error(&mut self, context: &str, error: &VzoneError) {
        tracing::error!(error = %error, "{context}");
        self.snapshot.last_error = Some(format!("{context}: {error}"));
        self.snapshot.error_count += 1;
        self.publish();
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot.clone());
    }
}

async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => std::future::pending().await,
    }
}

async fn next_ended(
    ended: &mut Option<watch::Receiver<bool>>,
) -> Result<bool, watch::error::RecvError> {
    match ended {
        Some(rx) => {
            rx.changed().await?;
            let value = *rx.borrow_and_update();
            Ok(value)
        }
        None => std::future::pending().await,
    }
}

async fn next_effect(tracker: &mut Option<ZoomTracker>) -> Option<ZoomEffect> {
    match tracker {
        Some(tracker) => tracker.next_effect().await,
        None => std::future::pending().await,
    }
}

async fn next_export_event(export: &mut Option<ExportTask>) -> ExportEvent {
    let Some(task) = export else {
        return std::future::pending().await;
    };
    match task.progress.recv().await {
        Some(progress) => ExportEvent::Progress(progress),
        None => ExportEvent::Done((&mut task.handle).await),
    }
}
