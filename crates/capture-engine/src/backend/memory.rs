//! In-memory capture provider.
//!
//! Produces a synthetic stream without touching any display server. Used for
//! headless runs and by tests, which drive it through [`MemoryCaptureControl`]
//! to simulate a denied permission prompt or the OS "stop sharing" control.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use vzone_common::error::{VzoneError, VzoneResult};

use super::{
    require_state, CaptureConstraints, CaptureProvider, MediaRecorder, MediaStream, MediaTrack,
    RecorderEvent, RecorderEvents, RecorderState, TrackKind,
};

/// EBML magic that opens every WebM file.
const WEBM_MAGIC: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];

/// Shared knobs and observations for a [`MemoryCaptureProvider`].
#[derive(Default)]
pub struct MemoryCaptureControl {
    deny_next: AtomicBool,
    fail_recorder_stop: AtomicBool,
    withhold_media: AtomicBool,
    streams_acquired: AtomicU64,
    current: Mutex<Option<LiveStream>>,
}

struct LiveStream {
    tracks: Vec<Arc<MemoryTrack>>,
    ended_tx: watch::Sender<bool>,
}

impl MemoryCaptureControl {
    /// Make the next acquisition fail as if the user dismissed the prompt.
    pub fn deny_next_acquisition(&self) {
        self.deny_next.store(true, Ordering::SeqCst);
    }

    /// Make recorders fail their `stop` call.
    pub fn fail_recorder_stop(&self, fail: bool) {
        self.fail_recorder_stop.store(fail, Ordering::SeqCst);
    }

    /// Make recorders deliver no data chunks at all.
    pub fn withhold_media(&self, withhold: bool) {
        self.withhold_media.store(withhold, Ordering::SeqCst);
    }

    /// Simulate the user pressing the OS "stop sharing" control.
    ///
    /// The video track ends and the stream's ended notification fires.
    pub fn end_sharing(&self) {
        let guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(live) = guard.as_ref() {
            for track in live.tracks.iter().filter(|t| t.kind == TrackKind::Video) {
                track.stop();
            }
            live.ended_tx.send_replace(true);
        }
    }

    /// Number of live tracks on the most recent stream.
    pub fn live_tracks(&self) -> usize {
        let guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .map(|live| live.tracks.iter().filter(|t| t.is_live()).count())
            .unwrap_or(0)
    }

    pub fn streams_acquired(&self) -> u64 {
        self.streams_acquired.load(Ordering::SeqCst)
    }
}

/// Capture provider backed by memory.
#[derive(Clone, Default)]
pub struct MemoryCaptureProvider {
    control: Arc<MemoryCaptureControl>,
}

impl MemoryCaptureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> Arc<MemoryCaptureControl> {
        self.control.clone()
    }
}

#[async_trait::async_trait]
impl CaptureProvider for MemoryCaptureProvider {
    async fn acquire_display_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> VzoneResult<MediaStream> {
        if self.control.deny_next.swap(false, Ordering::SeqCst) {
            return Err(VzoneError::capture_acquisition(
                "Permission denied by user",
            ));
        }

        let mut tracks = vec![Arc::new(MemoryTrack::new(
            TrackKind::Video,
            format!("memory:{}", constraints.display_surface),
        ))];
        if constraints.audio {
            tracks.push(Arc::new(MemoryTrack::new(TrackKind::Audio, "memory:audio")));
        }

        let (ended_tx, ended_rx) = watch::channel(false);
        let stream_tracks: Vec<Arc<dyn MediaTrack>> = tracks
            .iter()
            .map(|t| t.clone() as Arc<dyn MediaTrack>)
            .collect();

        *self.control.current.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(LiveStream { tracks, ended_tx });
        self.control.streams_acquired.fetch_add(1, Ordering::SeqCst);

        Ok(MediaStream::new(stream_tracks, ended_rx))
    }

    fn create_recorder(
        &self,
        stream: &MediaStream,
        codec_hint: &str,
    ) -> VzoneResult<(Box<dyn MediaRecorder>, RecorderEvents)> {
        if stream.live_tracks() == 0 {
            return Err(VzoneError::recorder_state(
                "cannot record a stream without live tracks",
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = MemoryRecorder {
            state: RecorderState::Inactive,
            events: tx,
            mime_type: container_of(codec_hint),
            segments: 0,
            control: self.control.clone(),
        };
        Ok((Box::new(recorder), rx))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn container_of(codec_hint: &str) -> String {
    codec_hint
        .split(';')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("video/webm")
        .to_string()
}

struct MemoryTrack {
    kind: TrackKind,
    label: String,
    live: AtomicBool,
}

impl MemoryTrack {
    fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
        }
    }
}

impl MediaTrack for MemoryTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Emits the WebM magic on start and one chunk per recorded segment.
struct MemoryRecorder {
    state: RecorderState,
    events: mpsc::UnboundedSender<RecorderEvent>,
    mime_type: String,
    segments: u32,
    control: Arc<MemoryCaptureControl>,
}

impl MemoryRecorder {
    fn emit(&self, chunk: Vec<u8>) {
        if !self.control.withhold_media.load(Ordering::SeqCst) {
            let _ = self.events.send(RecorderEvent::Data(chunk));
        }
    }

    fn flush_segment(&mut self) {
        self.segments += 1;
        self.emit(format!("segment-{}", self.segments).into_bytes());
    }
}

#[async_trait::async_trait]
impl MediaRecorder for MemoryRecorder {
    async fn start(&mut self) -> VzoneResult<()> {
        require_state(self.state, RecorderState::Inactive, "start")?;
        self.emit(WEBM_MAGIC.to_vec());
        self.state = RecorderState::Recording;
        Ok(())
    }

    async fn pause(&mut self) -> VzoneResult<()> {
        require_state(self.state, RecorderState::Recording, "pause")?;
        self.flush_segment();
        self.state = RecorderState::Paused;
        Ok(())
    }

    async fn resume(&mut self) -> VzoneResult<()> {
        require_state(self.state, RecorderState::Paused, "resume")?;
        self.state = RecorderState::Recording;
        Ok(())
    }

    async fn stop(&mut self) -> VzoneResult<()> {
        if self.state == RecorderState::Inactive {
            return Err(VzoneError::recorder_state(
                "cannot stop a recorder that is Inactive",
            ));
        }
        if self.control.fail_recorder_stop.load(Ordering::SeqCst) {
            return Err(VzoneError::recorder_state("simulated recorder failure"));
        }
        if self.state == RecorderState::Recording {
            self.flush_segment();
        }
        self.state = RecorderState::Inactive;
        let _ = self.events.send(RecorderEvent::Stopped);
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}
