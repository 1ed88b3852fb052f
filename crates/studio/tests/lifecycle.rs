use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vzone_capture_engine::MemoryCaptureProvider;
use vzone_common::config::CaptureDefaults;
use vzone_common::error::{VzoneError, VzoneResult};
use vzone_input_tracker::{PointerDown, PointerHub};
use vzone_project_model::{BackgroundConfig, CursorPosition, RecordingLifecycleState};
use vzone_render_engine::{
    CompositionSettings, EngineConfig, EngineLoader, EngineService, ExportPipeline,
    ExportStage, MemoryBlobStore, TranscodeEngine, OUTPUT_FILE,
};
use vzone_studio::{Studio, StudioDeps, StudioHandle};

/// Transcoder double that can be told to fail its next run.
#[derive(Default)]
struct FakeEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    fail_next: AtomicBool,
    runs: AtomicUsize,
    last_args: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl TranscodeEngine for FakeEngine {
    async fn write_input(&self, name: &str, bytes: &[u8]) -> VzoneResult<()> {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> VzoneResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = args.to_vec();
        progress(0.5);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(VzoneError::transcode("simulated encoder crash"));
        }
        progress(1.0);
        self.files
            .lock()
            .unwrap()
            .insert(OUTPUT_FILE.to_string(), b"\x00\x00\x00\x18ftypmp42".to_vec());
        Ok(())
    }

    async fn read_output(&self, name: &str) -> VzoneResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| VzoneError::capture(format!("{name} not found")))
    }

    async fn remove(&self, name: &str) -> VzoneResult<()> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeLoader {
    engine: Arc<FakeEngine>,
    loads: AtomicUsize,
}

#[async_trait::async_trait]
impl EngineLoader for FakeLoader {
    async fn load(&self, _config: &EngineConfig) -> VzoneResult<Arc<dyn TranscodeEngine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.engine.clone())
    }
}

struct Rig {
    capture: MemoryCaptureProvider,
    engine: Arc<FakeEngine>,
    loader: Arc<FakeLoader>,
    blobs: Arc<MemoryBlobStore>,
    hub: PointerHub,
}

impl Rig {
    fn new() -> Self {
        let engine = Arc::new(FakeEngine::default());
        Self {
            capture: MemoryCaptureProvider::new(),
            loader: Arc::new(FakeLoader {
                engine: engine.clone(),
                loads: AtomicUsize::new(0),
            }),
            engine,
            blobs: Arc::new(MemoryBlobStore::new()),
            hub: PointerHub::new(),
        }
    }

    fn spawn(&self) -> StudioHandle {
        let service = Arc::new(EngineService::new(
            self.loader.clone(),
            EngineConfig::default(),
        ));
        let exporter = Arc::new(ExportPipeline::new(
            service,
            self.blobs.clone(),
            CompositionSettings::default(),
        ));
        let deps = StudioDeps {
            capture: Arc::new(self.capture.clone()),
            exporter,
            blobs: self.blobs.clone(),
            pointer_hub: self.hub.clone(),
            capture_defaults: CaptureDefaults::default(),
        };
        Studio::spawn_with_background(deps, BackgroundConfig::solid("#ff0000"))
    }
}

fn click(x: f64, y: f64) -> PointerDown {
    PointerDown::now(x * 1920.0, y * 1080.0, 1920.0, 1080.0)
}

async fn advance_secs(studio: &StudioHandle, secs: u64) {
    let target = studio.snapshot().time + secs;
    tokio::time::advance(Duration::from_secs(secs)).await;
    studio.wait_for(|s| s.time >= target).await.unwrap();
}

/// Record for `secs` seconds and stop.
async fn record(studio: &StudioHandle, secs: u64) {
    studio.start().await.unwrap();
    advance_secs(studio, secs).await;
    studio.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn three_second_recording_with_two_clicks_yields_two_zooms() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Recording);
    assert!(studio.snapshot().zooms.is_empty());

    advance_secs(&studio, 1).await;
    assert_eq!(rig.hub.publish(click(0.1, 0.1)), 1);
    studio.wait_for(|s| s.zooms.len() == 1).await.unwrap();

    advance_secs(&studio, 1).await;
    assert_eq!(rig.hub.publish(click(0.9, 0.9)), 1);
    studio.wait_for(|s| s.zooms.len() == 2).await.unwrap();

    advance_secs(&studio, 1).await;
    studio.stop().await.unwrap();

    let snapshot = studio.snapshot();
    assert_eq!(snapshot.state, RecordingLifecycleState::Finished);
    assert_eq!(snapshot.time, 3);
    assert!(snapshot.recorded.is_some());
    assert!(snapshot.display_url().is_some());

    let zooms = snapshot.zooms.effects();
    assert_eq!(zooms.len(), 2);
    assert_eq!(zooms[0].timestamp, 1000);
    assert_eq!(zooms[1].timestamp, 2000);
    assert!(zooms[0].timestamp < zooms[1].timestamp);
    assert_eq!(zooms[0].cursor_position, CursorPosition { x: 0.1, y: 0.1 });
    assert_eq!(zooms[1].cursor_position, CursorPosition { x: 0.9, y: 0.9 });
    assert!(zooms.iter().all(|z| z.duration == 2000 && z.zoom_level == 1.5));

    assert_eq!(rig.capture.control().live_tracks(), 0);
    assert_eq!(rig.hub.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn pause_freezes_timer_and_ignores_clicks() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    advance_secs(&studio, 1).await;
    studio.pause().await.unwrap();
    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Paused);
    assert_eq!(rig.hub.subscriber_count(), 0);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(rig.hub.publish(click(0.5, 0.5)), 0);
    tokio::task::yield_now().await;
    let paused = studio.snapshot();
    assert_eq!(paused.time, 1);
    assert!(paused.zooms.is_empty());

    studio.resume().await.unwrap();
    assert_eq!(rig.hub.subscriber_count(), 1);
    advance_secs(&studio, 1).await;
    assert_eq!(studio.snapshot().time, 2);

    studio.stop().await.unwrap();
    let finished = studio.snapshot();
    assert_eq!(finished.time, 2);
    assert_eq!(finished.recorded.as_ref().unwrap().duration_secs, 2);
}

#[tokio::test(start_paused = true)]
async fn native_stop_sharing_ends_like_stop() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    advance_secs(&studio, 2).await;

    rig.capture.control().end_sharing();
    let snapshot = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    assert_eq!(snapshot.time, 2);
    assert!(snapshot.recorded.is_some());
    assert_eq!(rig.capture.control().live_tracks(), 0);
    assert_eq!(rig.hub.subscriber_count(), 0);

    tokio::time::advance(Duration::from_secs(3)).await;
    tokio::task::yield_now().await;
    assert_eq!(studio.snapshot().time, 2);
}

#[tokio::test(start_paused = true)]
async fn native_stop_sharing_while_paused_finishes() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    advance_secs(&studio, 1).await;
    studio.pause().await.unwrap();

    rig.capture.control().end_sharing();
    let snapshot = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    assert_eq!(snapshot.time, 1);
    assert_eq!(rig.capture.control().live_tracks(), 0);
}

#[tokio::test(start_paused = true)]
async fn export_with_solid_red_produces_mp4_and_completes_progress() {
    let rig = Rig::new();
    let studio = rig.spawn();
    record(&studio, 2).await;

    let mut progress = studio.export_progress();
    studio.export().await.unwrap();
    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Processing);
    assert!(studio.snapshot().processing.is_some());

    let snapshot = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    let exported = snapshot.exported.as_ref().unwrap();
    assert_eq!(exported.blob.media_type(), "video/mp4");
    assert_eq!(exported.download_name, "vzone_recording.mp4");
    assert_eq!(snapshot.display_url(), Some(&exported.url));
    assert!(snapshot.processing.is_none());
    assert!(snapshot.recorded.is_some());
    assert_eq!(snapshot.error_count, 0);

    let mut reports = Vec::new();
    while let Ok(report) = progress.try_recv() {
        reports.push(report);
    }
    let percents: Vec<u8> = reports.iter().map(|r| r.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    let last = reports.last().unwrap();
    assert_eq!(last.percent, 100);
    assert_eq!(last.stage, ExportStage::Complete);

    let args = rig.engine.last_args.lock().unwrap().clone();
    assert!(args.iter().any(|a| a.starts_with("color=c=0xff0000")));
}

#[tokio::test(start_paused = true)]
async fn transcode_failure_keeps_recording_and_allows_retry() {
    let rig = Rig::new();
    let studio = rig.spawn();
    record(&studio, 1).await;

    rig.engine.fail_next.store(true, Ordering::SeqCst);
    studio.export().await.unwrap();
    let failed = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    assert!(failed.exported.is_none());
    assert!(failed.recorded.is_some());
    assert!(failed.processing.is_none());
    assert_eq!(failed.error_count, 1);
    let message = failed.last_error.as_deref().unwrap();
    assert!(message.contains("transcode"));
    assert!(message.ends_with("simulated encoder crash"), "{message}");

    studio.export().await.unwrap();
    let retried = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    assert!(retried.exported.is_some());
    assert_eq!(retried.error_count, 1);
    assert_eq!(rig.engine.runs.load(Ordering::SeqCst), 2);
    assert_eq!(rig.loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn background_change_during_processing_only_affects_next_export() {
    let rig = Rig::new();
    let studio = rig.spawn();
    record(&studio, 1).await;

    studio.export().await.unwrap();
    studio
        .set_background(BackgroundConfig::solid("#0000ff"))
        .await
        .unwrap();
    studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    let first = rig.engine.last_args.lock().unwrap().clone();
    assert!(first.iter().any(|a| a.starts_with("color=c=0xff0000")));

    studio.export().await.unwrap();
    studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    let second = rig.engine.last_args.lock().unwrap().clone();
    assert!(second.iter().any(|a| a.starts_with("color=c=0x0000ff")));
}

#[tokio::test(start_paused = true)]
async fn invalid_intents_are_rejected_without_state_change() {
    let rig = Rig::new();
    let studio = rig.spawn();

    for result in [
        studio.pause().await,
        studio.resume().await,
        studio.stop().await,
        studio.export().await,
        studio.reset().await,
    ] {
        assert!(matches!(result, Err(VzoneError::InvalidTransition { .. })));
    }
    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Idle);

    studio.start().await.unwrap();
    for result in [
        studio.start().await,
        studio.resume().await,
        studio.export().await,
        studio.reset().await,
    ] {
        assert!(matches!(result, Err(VzoneError::InvalidTransition { .. })));
    }
    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Recording);

    let err = studio.start().await.unwrap_err();
    assert_eq!(err.to_string(), "Cannot start while recording");
    assert_eq!(studio.snapshot().error_count, 0);
}

#[tokio::test(start_paused = true)]
async fn denied_capture_stays_idle_with_one_notification() {
    let rig = Rig::new();
    let studio = rig.spawn();

    rig.capture.control().deny_next_acquisition();
    let err = studio.start().await.unwrap_err();
    assert!(matches!(err, VzoneError::CaptureAcquisitionFailed { .. }));

    let snapshot = studio.snapshot();
    assert_eq!(snapshot.state, RecordingLifecycleState::Idle);
    assert_eq!(snapshot.error_count, 1);
    assert!(snapshot.last_error.is_some());
    assert_eq!(rig.hub.subscriber_count(), 0);

    studio.start().await.unwrap();
    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Recording);
}

#[tokio::test(start_paused = true)]
async fn reset_clears_session_and_next_start_is_fresh() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    advance_secs(&studio, 1).await;
    rig.hub.publish(click(0.3, 0.3));
    studio.wait_for(|s| s.zooms.len() == 1).await.unwrap();
    studio.stop().await.unwrap();

    studio
        .set_background(BackgroundConfig::gradient("#111111", "#222222"))
        .await
        .unwrap();
    studio.reset().await.unwrap();

    let snapshot = studio.snapshot();
    assert_eq!(snapshot.state, RecordingLifecycleState::Idle);
    assert_eq!(snapshot.time, 0);
    assert!(snapshot.zooms.is_empty());
    assert!(snapshot.recorded.is_none());
    assert!(snapshot.exported.is_none());
    assert!(snapshot.processing.is_none());
    assert!(snapshot.background.is_gradient());

    studio.start().await.unwrap();
    let fresh = studio.snapshot();
    assert_eq!(fresh.time, 0);
    assert!(fresh.zooms.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failing_recorder_stop_still_releases_tracks() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    advance_secs(&studio, 1).await;
    rig.capture.control().fail_recorder_stop(true);
    studio.stop().await.unwrap();

    assert_eq!(studio.snapshot().state, RecordingLifecycleState::Finished);
    assert_eq!(rig.capture.control().live_tracks(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_live_capture() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    assert_eq!(rig.capture.control().live_tracks(), 2);
    studio.shutdown().await.unwrap();

    assert_eq!(rig.capture.control().live_tracks(), 0);
    assert!(studio.start().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn failed_reexport_keeps_the_previous_export() {
    let rig = Rig::new();
    let studio = rig.spawn();
    record(&studio, 1).await;

    studio.export().await.unwrap();
    let first = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap()
        .exported
        .expect("first export should succeed");

    rig.engine.fail_next.store(true, Ordering::SeqCst);
    studio.export().await.unwrap();
    assert_eq!(studio.snapshot().exported.as_ref(), Some(&first));

    let failed = studio
        .wait_for(|s| s.state == RecordingLifecycleState::Finished)
        .await
        .unwrap();
    assert_eq!(failed.error_count, 1);
    assert_eq!(failed.exported.as_ref(), Some(&first));
    assert_eq!(failed.display_url(), Some(&first.url));
}

#[tokio::test(start_paused = true)]
async fn simultaneous_clicks_each_become_a_zoom() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    advance_secs(&studio, 1).await;
    for i in 0..5 {
        assert_eq!(rig.hub.publish(click(0.1 * f64::from(i + 1), 0.5)), 1);
    }
    studio.wait_for(|s| s.zooms.len() == 5).await.unwrap();
    studio.stop().await.unwrap();

    let snapshot = studio.snapshot();
    let zooms = snapshot.zooms.effects();
    assert_eq!(zooms.len(), 5);
    assert!(zooms.iter().all(|z| z.timestamp == 1000));
    assert!(snapshot.zooms.is_chronological());
    let ids: std::collections::HashSet<_> = zooms.iter().map(|z| z.id.clone()).collect();
    assert_eq!(ids.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn partial_seconds_carry_across_pause() {
    let rig = Rig::new();
    let studio = rig.spawn();

    studio.start().await.unwrap();
    tokio::time::advance(Duration::from_millis(1_500)).await;
    studio.wait_for(|s| s.time == 1).await.unwrap();
    studio.pause().await.unwrap();

    tokio::time::advance(Duration::from_secs(5)).await;
    studio.resume().await.unwrap();
    tokio::time::advance(Duration::from_millis(1_500)).await;
    studio.wait_for(|s| s.time == 3).await.unwrap();
    studio.stop().await.unwrap();

    let finished = studio.snapshot();
    assert_eq!(finished.time, 3);
    assert_eq!(finished.recorded.as_ref().unwrap().duration_secs, 3);
}

#[tokio::test(start_paused = true)]
async fn unfinalizable_recording_returns_to_idle_with_error() {
    let rig = Rig::new();
    let studio = rig.spawn();
    let control = rig.capture.control();

    control.withhold_media(true);
    studio.start().await.unwrap();
    advance_secs(&studio, 1).await;
    control.fail_recorder_stop(true);

    let err = studio.stop().await.unwrap_err();
    assert!(matches!(err, VzoneError::Capture { .. }));

    let snapshot = studio.snapshot();
    assert_eq!(snapshot.state, RecordingLifecycleState::Idle);
    assert!(snapshot.recorded.is_none());
    assert_eq!(snapshot.error_count, 1);
    assert!(snapshot
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("Failed to finalize recording"));
    assert_eq!(control.live_tracks(), 0);
    assert_eq!(rig.hub.subscriber_count(), 0);

    control.withhold_media(false);
    control.fail_recorder_stop(false);
    studio.start().await.unwrap();
    let fresh = studio.snapshot();
    assert_eq!(fresh.state, RecordingLifecycleState::Recording);
    assert_eq!(fresh.time, 0);
}
