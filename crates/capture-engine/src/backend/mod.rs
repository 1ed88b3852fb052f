//! Capture provider and recorder contracts.
//!
//! A [`CaptureProvider`] acquires a display (+audio) [`MediaStream`] and
//! builds a [`MediaRecorder`] for it. The recorder reports encoded media as
//! [`RecorderEvent`]s on a channel so the session can buffer chunks while
//! the recorder keeps running.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use vzone_common::error::VzoneResult;

pub mod ffmpeg;
pub mod memory;

pub use ffmpeg::FfmpegCaptureProvider;
pub use memory::{MemoryCaptureControl, MemoryCaptureProvider};

/// What to capture.
#[derive(Debug, Clone)]
pub struct CaptureConstraints {
    /// Preferred display surface (`monitor`, `window`, `browser`).
    pub display_surface: String,

    /// Capture audio alongside video.
    pub audio: bool,

    /// Target frame rate.
    pub fps: u32,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            display_surface: "monitor".to_string(),
            audio: true,
            fps: 30,
        }
    }
}

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One track of a live media stream.
pub trait MediaTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    /// Release the track. Stopping an already-stopped track is a no-op.
    fn stop(&self);

    fn is_live(&self) -> bool;
}

/// A live display/audio stream.
///
/// The `ended` channel flips to `true` when the producer ends the stream
/// outside the application (the OS "stop sharing" control, the capture
/// process dying).
pub struct MediaStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
    ended: watch::Receiver<bool>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>, ended: watch::Receiver<bool>) -> Self {
        Self { tracks, ended }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Arc<dyn MediaTrack>> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Audio)
    }

    /// Stop every track. Returns how many were still live.
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for track in &self.tracks {
            if track.is_live() {
                stopped += 1;
            }
            track.stop();
        }
        stopped
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// A receiver for the externally-ended notification.
    pub fn ended_signal(&self) -> watch::Receiver<bool> {
        self.ended.clone()
    }

    pub fn is_ended(&self) -> bool {
        *self.ended.borrow()
    }
}

/// Internal state of a recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Inactive,
    Recording,
    Paused,
}

/// Output of a recorder: incremental media chunks, then one terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    Data(Vec<u8>),
    Stopped,
}

/// Receiving side of a recorder's event channel.
pub type RecorderEvents = mpsc::UnboundedReceiver<RecorderEvent>;

/// Encodes a [`MediaStream`] into a container.
///
/// Control operations fail with `VzoneError::RecorderState` when the
/// recorder is not in a compatible state (pausing while inactive, ...).
#[async_trait::async_trait]
pub trait MediaRecorder: Send {
    async fn start(&mut self) -> VzoneResult<()>;

    async fn pause(&mut self) -> VzoneResult<()>;

    async fn resume(&mut self) -> VzoneResult<()>;

    /// Request the recorder to stop. Remaining data followed by
    /// [`RecorderEvent::Stopped`] arrives on the event channel.
    async fn stop(&mut self) -> VzoneResult<()>;

    fn state(&self) -> RecorderState;

    /// Media type of the produced container.
    fn mime_type(&self) -> &str;
}

/// Platform capability that produces streams and recorders.
#[async_trait::async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Acquire a display stream. Fails with `CaptureAcquisitionFailed`
    /// when permission is denied or no source is available.
    async fn acquire_display_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> VzoneResult<MediaStream>;

    /// Create a recorder for a stream acquired from this provider.
    fn create_recorder(
        &self,
        stream: &MediaStream,
        codec_hint: &str,
    ) -> VzoneResult<(Box<dyn MediaRecorder>, RecorderEvents)>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

/// Reject a control operation unless the recorder is in `expected`.
pub(crate) fn require_state(
    current: RecorderState,
    expected: RecorderState,
    operation: &str,
) -> VzoneResult<()> {
    if current == expected {
        Ok(())
    } else {
        Err(vzone_common::error::VzoneError::recorder_state(format!(
            "cannot {operation} a recorder that is {current:?}"
        )))
    }
}
