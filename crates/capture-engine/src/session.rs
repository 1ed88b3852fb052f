//! Capture session management.
//!
//! A [`CaptureSession`] owns one acquired stream and its recorder. It is
//! created already recording and is consumed by [`CaptureSession::stop`],
//! which always releases every track, even when the recorder misbehaves.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use vzone_common::clock::RecordingClock;
use vzone_common::error::{VzoneError, VzoneResult};
use vzone_project_model::{MediaBlob, RecordedArtifact, RAW_MEDIA_TYPE};

use crate::backend::{
    CaptureConstraints, CaptureProvider, MediaRecorder, MediaStream, RecorderEvent,
    RecorderEvents,
};

/// How long `stop` waits for the recorder to flush its last chunk.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Recorder running.
    Recording,
    /// Recorder paused, tracks still held.
    Paused,
}

/// A live capture session.
pub struct CaptureSession {
    provider_name: String,
    stream: MediaStream,
    recorder: Box<dyn MediaRecorder>,
    events: RecorderEvents,
    chunks: Vec<Vec<u8>>,
    clock: RecordingClock,
    state: SessionState,
    media_start_offset_ms: u64,
    active_ms: u64,
    resumed_at: Instant,
}

impl CaptureSession {
    /// Acquire a display stream and start recording it.
    ///
    /// Fails with `CaptureAcquisitionFailed` when no stream can be acquired.
    /// If the recorder cannot be created or started, the acquired tracks are
    /// released before the error is returned.
    pub async fn start(
        provider: Arc<dyn CaptureProvider>,
        constraints: &CaptureConstraints,
        codec_hint: &str,
    ) -> VzoneResult<Self> {
        tracing::info!(
            provider = provider.name(),
            surface = %constraints.display_surface,
            audio = constraints.audio,
            fps = constraints.fps,
            "Starting capture session"
        );

        let stream = provider.acquire_display_stream(constraints).await?;
        tracing::info!(
            tracks = stream.tracks().len(),
            audio = stream.has_audio(),
            "Display stream acquired"
        );

        let (mut recorder, events) = match provider.create_recorder(&stream, codec_hint) {
            Ok(created) => created,
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };

        let clock = RecordingClock::start();
        tracing::info!(epoch_wall = %clock.epoch_wall(), "Recording clock started");

        if let Err(e) = recorder.start().await {
            stream.stop_all();
            return Err(VzoneError::capture(format!("Failed to start recorder: {e}")));
        }
        let media_start_offset_ms = clock.elapsed_ms();
        tracing::info!(
            mime_type = recorder.mime_type(),
            offset_ms = media_start_offset_ms,
            "Recorder started"
        );

        Ok(Self {
            provider_name: provider.name().to_string(),
            stream,
            recorder,
            events,
            chunks: Vec::new(),
            resumed_at: clock.epoch(),
            clock,
            state: SessionState::Recording,
            media_start_offset_ms,
            active_ms: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Clock anchored at the moment the recorder was asked to start.
    pub fn clock(&self) -> &RecordingClock {
        &self.clock
    }

    /// Milliseconds between the clock epoch and the recorder reporting it
    /// had started.
    pub fn media_start_offset_ms(&self) -> u64 {
        self.media_start_offset_ms
    }

    /// Fires when the stream is ended outside the application.
    pub fn ended_signal(&self) -> watch::Receiver<bool> {
        self.stream.ended_signal()
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub fn live_tracks(&self) -> usize {
        self.stream.live_tracks()
    }

    /// Milliseconds spent recording, excluding paused intervals.
    pub fn active_ms(&self) -> u64 {
        match self.state {
            SessionState::Recording => self.active_ms + self.ms_since_resume(),
            SessionState::Paused => self.active_ms,
        }
    }

    /// Pause the recorder. Tracks stay acquired.
    pub async fn pause(&mut self) -> VzoneResult<()> {
        if self.state != SessionState::Recording {
            return Err(VzoneError::recorder_state("Not recording"));
        }
        self.recorder.pause().await?;
        self.active_ms += self.ms_since_resume();
        self.state = SessionState::Paused;
        self.collect_pending();
        tracing::info!(active_ms = self.active_ms, "Recording paused");
        Ok(())
    }

    /// Resume a paused recorder.
    pub async fn resume(&mut self) -> VzoneResult<()> {
        if self.state != SessionState::Paused {
            return Err(VzoneError::recorder_state("Not paused"));
        }
        self.recorder.resume().await?;
        self.resumed_at = Instant::now();
        self.state = SessionState::Recording;
        tracing::info!("Recording resumed");
        Ok(())
    }

    /// Stop recording, release all tracks and finalize the raw artifact.
    ///
    /// Chunks are concatenated in arrival order. A recorder that fails to
    /// stop still yields whatever it produced so far.
    pub async fn stop(mut self) -> VzoneResult<RecordedArtifact> {
        tracing::info!(provider = %self.provider_name, "Stopping capture session");
        let active_ms = self.active_ms();

        match self.recorder.stop().await {
            Ok(()) => {
                let drained = tokio::time::timeout(
                    STOP_DRAIN_TIMEOUT,
                    drain_until_stopped(&mut self.events, &mut self.chunks),
                )
                .await;
                if drained.is_err() {
                    tracing::warn!(
                        timeout_secs = STOP_DRAIN_TIMEOUT.as_secs(),
                        "Recorder did not report stop in time; finalizing buffered chunks"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Recorder failed to stop cleanly");
                self.collect_pending();
                if self.chunks.is_empty() {
                    let released = self.stream.stop_all();
                    tracing::error!(released, "No media buffered; recording is lost");
                    return Err(VzoneError::capture(format!(
                        "Recording could not be finalized: {e}"
                    )));
                }
            }
        }

        let released = self.stream.stop_all();
        tracing::info!(released, "Capture tracks released");

        let media_type = match self.recorder.mime_type() {
            "" => RAW_MEDIA_TYPE.to_string(),
            other => other.to_string(),
        };
        let blob = MediaBlob::from_chunks(&self.chunks, media_type);
        if blob.is_empty() {
            tracing::warn!("Recorder produced no media");
        }

        let duration_secs = active_ms / 1000;
        tracing::info!(
            bytes = blob.len(),
            chunks = self.chunks.len(),
            duration_secs,
            "Recording finalized"
        );
        Ok(RecordedArtifact::new(blob, duration_secs))
    }

    fn ms_since_resume(&self) -> u64 {
        Instant::now()
            .saturating_duration_since(self.resumed_at)
            .as_millis() as u64
    }

    /// Move chunks already delivered by the recorder into the buffer.
    fn collect_pending(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let RecorderEvent::Data(chunk) = event {
                if !chunk.is_empty() {
                    self.chunks.push(chunk);
                }
            }
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let released = self.stream.stop_all();
        if released > 0 {
            tracing::debug!(released, "Capture session dropped with live tracks");
        }
    }
}

async fn drain_until_stopped(events: &mut RecorderEvents, chunks: &mut Vec<Vec<u8>>) {
    while let Some(event) = events.recv().await {
        match event {
            RecorderEvent::Data(chunk) if chunk.is_empty() => {}
            RecorderEvent::Data(chunk) => chunks.push(chunk),
            RecorderEvent::Stopped => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryCaptureProvider;

    async fn start_memory_session(provider: &MemoryCaptureProvider) -> CaptureSession {
        CaptureSession::start(
            Arc::new(provider.clone()),
            &CaptureConstraints::default(),
            "video/webm; codecs=vp9",
        )
        .await
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_concatenates_chunks_and_releases_tracks() {
        let provider = MemoryCaptureProvider::new();
        let mut session = start_memory_session(&provider).await;
        assert_eq!(provider.control().live_tracks(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        session.pause().await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        session.resume().await.unwrap();
        tokio::time::advance(Duration::from_secs(1)).await;

        let artifact = session.stop().await.unwrap();
        let mut expected = vec![0x1a, 0x45, 0xdf, 0xa3];
        expected.extend_from_slice(b"segment-1");
        expected.extend_from_slice(b"segment-2");
        assert_eq!(artifact.blob.bytes(), expected.as_slice());
        assert_eq!(artifact.blob.media_type(), "video/webm");
        assert_eq!(artifact.duration_secs, 3);
        assert_eq!(provider.control().live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_denied_acquisition_propagates() {
        let provider = MemoryCaptureProvider::new();
        provider.control().deny_next_acquisition();
        let result = CaptureSession::start(
            Arc::new(provider.clone()),
            &CaptureConstraints::default(),
            "video/webm",
        )
        .await;
        assert!(matches!(
            result.err(),
            Some(VzoneError::CaptureAcquisitionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_recorder_stop_still_releases_tracks() {
        let provider = MemoryCaptureProvider::new();
        let session = start_memory_session(&provider).await;
        provider.control().fail_recorder_stop(true);

        let artifact = session.stop().await.unwrap();
        assert_eq!(artifact.blob.bytes(), &[0x1a, 0x45, 0xdf, 0xa3]);
        assert_eq!(provider.control().live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_failed_stop_without_media_is_an_error() {
        let provider = MemoryCaptureProvider::new();
        provider.control().withhold_media(true);
        let session = start_memory_session(&provider).await;
        provider.control().fail_recorder_stop(true);

        let err = session.stop().await.unwrap_err();
        assert!(matches!(err, VzoneError::Capture { .. }));
        assert!(err.to_string().contains("could not be finalized"));
        assert_eq!(provider.control().live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_pause_twice_is_rejected() {
        let provider = MemoryCaptureProvider::new();
        let mut session = start_memory_session(&provider).await;
        session.pause().await.unwrap();
        assert!(matches!(
            session.pause().await,
            Err(VzoneError::RecorderState { .. })
        ));
        assert_eq!(session.state(), SessionState::Paused);
    }

    #[tokio::test]
    async fn test_drop_releases_tracks() {
        let provider = MemoryCaptureProvider::new();
        let session = start_memory_session(&provider).await;
        drop(session);
        assert_eq!(provider.control().live_tracks(), 0);
    }
}
