//! ffmpeg-backed screen capture.
//!
//! The recorder runs one ffmpeg process that grabs the display (and the
//! default audio input) and muxes VP9/Opus WebM to stdout. Stdout is read in
//! chunks and forwarded as [`RecorderEvent::Data`]; EOF produces
//! [`RecorderEvent::Stopped`]. If the process exits without being asked to,
//! the stream's ended notification fires, which the studio treats exactly
//! like a stop request.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch, Notify};
use vzone_common::error::{VzoneError, VzoneResult};

use super::{
    require_state, CaptureConstraints, CaptureProvider, MediaRecorder, MediaStream, MediaTrack,
    RecorderEvent, RecorderEvents, RecorderState, TrackKind,
};

const READ_CHUNK_BYTES: usize = 64 * 1024;

/// Capture provider that drives the `ffmpeg` binary.
pub struct FfmpegCaptureProvider {
    binary: String,
    source: Mutex<Option<Arc<CaptureSource>>>,
}

impl FfmpegCaptureProvider {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            source: Mutex::new(None),
        }
    }
}

impl Default for FfmpegCaptureProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared by the tracks of one stream and its recorder.
struct CaptureSource {
    input_args: Vec<String>,
    ended_tx: watch::Sender<bool>,
    /// Set before the recorder asks ffmpeg to quit, so the exit is not
    /// reported as an external end.
    stopping: AtomicBool,
    kill: Notify,
    pid: Mutex<Option<u32>>,
}

#[async_trait::async_trait]
impl CaptureProvider for FfmpegCaptureProvider {
    async fn acquire_display_stream(
        &self,
        constraints: &CaptureConstraints,
    ) -> VzoneResult<MediaStream> {
        let status = Command::new(&self.binary)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                VzoneError::capture_acquisition(format!("{} is not available: {e}", self.binary))
            })?;
        if !status.success() {
            return Err(VzoneError::capture_acquisition(format!(
                "{} -version exited with {status}",
                self.binary
            )));
        }

        let input_args = platform_input_args(constraints)?;
        tracing::info!(args = ?input_args, "Resolved display capture input");

        let (ended_tx, ended_rx) = watch::channel(false);
        let source = Arc::new(CaptureSource {
            input_args,
            ended_tx,
            stopping: AtomicBool::new(false),
            kill: Notify::new(),
            pid: Mutex::new(None),
        });

        let mut tracks: Vec<Arc<dyn MediaTrack>> = vec![Arc::new(FfmpegTrack::new(
            TrackKind::Video,
            constraints.display_surface.clone(),
            source.clone(),
        ))];
        if constraints.audio && cfg!(any(target_os = "linux", target_os = "macos")) {
            tracks.push(Arc::new(FfmpegTrack::new(
                TrackKind::Audio,
                "default",
                source.clone(),
            )));
        }

        *self.source.lock().unwrap_or_else(|e| e.into_inner()) = Some(source);
        Ok(MediaStream::new(tracks, ended_rx))
    }

    fn create_recorder(
        &self,
        stream: &MediaStream,
        codec_hint: &str,
    ) -> VzoneResult<(Box<dyn MediaRecorder>, RecorderEvents)> {
        let source = self
            .source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| VzoneError::recorder_state("no stream acquired from this provider"))?;
        if stream.live_tracks() == 0 {
            return Err(VzoneError::recorder_state(
                "cannot record a stream without live tracks",
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let recorder = FfmpegRecorder {
            binary: self.binary.clone(),
            source,
            output_args: output_args_for_hint(codec_hint, stream.has_audio()),
            state: RecorderState::Inactive,
            stdin: None,
            events: tx,
        };
        Ok((Box::new(recorder), rx))
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

struct FfmpegTrack {
    kind: TrackKind,
    label: String,
    live: AtomicBool,
    source: Arc<CaptureSource>,
}

impl FfmpegTrack {
    fn new(kind: TrackKind, label: impl Into<String>, source: Arc<CaptureSource>) -> Self {
        Self {
            kind,
            label: label.into(),
            live: AtomicBool::new(true),
            source,
        }
    }
}

impl MediaTrack for FfmpegTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            self.source.stopping.store(true, Ordering::SeqCst);
            self.source.kill.notify_one();
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

struct FfmpegRecorder {
    binary: String,
    source: Arc<CaptureSource>,
    output_args: Vec<String>,
    state: RecorderState,
    stdin: Option<ChildStdin>,
    events: mpsc::UnboundedSender<RecorderEvent>,
}

#[async_trait::async_trait]
impl MediaRecorder for FfmpegRecorder {
    async fn start(&mut self) -> VzoneResult<()> {
        require_state(self.state, RecorderState::Inactive, "start")?;

        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(&self.source.input_args)
            .args(&self.output_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VzoneError::capture(format!("Failed to start ffmpeg capture: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VzoneError::capture("Failed to capture ffmpeg stdout"))?;
        self.stdin = child.stdin.take();
        *self.source.pid.lock().unwrap_or_else(|e| e.into_inner()) = child.id();

        tracing::info!(pid = child.id(), "ffmpeg capture process started");

        tokio::spawn(forward_stdout(stdout, self.events.clone()));
        tokio::spawn(supervise(child, self.source.clone()));

        self.state = RecorderState::Recording;
        Ok(())
    }

    async fn pause(&mut self) -> VzoneResult<()> {
        require_state(self.state, RecorderState::Recording, "pause")?;
        signal_process(&self.source, ProcessSignal::Suspend)?;
        self.state = RecorderState::Paused;
        Ok(())
    }

    async fn resume(&mut self) -> VzoneResult<()> {
        require_state(self.state, RecorderState::Paused, "resume")?;
        signal_process(&self.source, ProcessSignal::Continue)?;
        self.state = RecorderState::Recording;
        Ok(())
    }

    async fn stop(&mut self) -> VzoneResult<()> {
        if self.state == RecorderState::Inactive {
            return Err(VzoneError::recorder_state(
                "cannot stop a recorder that is Inactive",
            ));
        }
        if self.state == RecorderState::Paused {
            signal_process(&self.source, ProcessSignal::Continue)?;
        }
        self.source.stopping.store(true, Ordering::SeqCst);

        // `q` makes ffmpeg finalize the container; a process that already
        // exited has closed stdin and its stdout EOF is already on its way.
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::debug!(error = %e, "ffmpeg stdin closed before quit request");
            }
            let _ = stdin.shutdown().await;
        }
        self.state = RecorderState::Inactive;
        Ok(())
    }

    fn state(&self) -> RecorderState {
        self.state
    }

    fn mime_type(&self) -> &str {
        "video/webm"
    }
}

async fn forward_stdout(
    mut stdout: tokio::process::ChildStdout,
    events: mpsc::UnboundedSender<RecorderEvent>,
) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if events.send(RecorderEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed reading ffmpeg capture output");
                break;
            }
        }
    }
    let _ = events.send(RecorderEvent::Stopped);
}

async fn supervise(mut child: Child, source: Arc<CaptureSource>) {
    let mut stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut output = String::new();
        if let Some(stderr) = stderr.as_mut() {
            let _ = stderr.read_to_string(&mut output).await;
        }
        output
    });

    let status = tokio::select! {
        status = child.wait() => status,
        _ = source.kill.notified() => {
            if let Err(e) = child.start_kill() {
                tracing::debug!(error = %e, "ffmpeg capture already exited");
            }
            child.wait().await
        }
    };
    *source.pid.lock().unwrap_or_else(|e| e.into_inner()) = None;

    let stderr_output = stderr_task.await.unwrap_or_default();
    match status {
        Ok(status) if status.success() => {
            tracing::info!("ffmpeg capture process exited");
        }
        Ok(status) => {
            tracing::warn!(%status, stderr = %stderr_output.trim(), "ffmpeg capture process failed");
        }
        Err(e) => tracing::warn!(error = %e, "Failed to wait on ffmpeg capture"),
    }

    if !source.stopping.load(Ordering::SeqCst) {
        tracing::info!("Capture ended outside the application");
        source.ended_tx.send_replace(true);
    }
}

#[derive(Debug, Clone, Copy)]
enum ProcessSignal {
    Suspend,
    Continue,
}

#[cfg(unix)]
fn signal_process(source: &CaptureSource, signal: ProcessSignal) -> VzoneResult<()> {
    let pid = source
        .pid
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .ok_or_else(|| VzoneError::recorder_state("capture process is not running"))?;
    let signo = match signal {
        ProcessSignal::Suspend => libc::SIGSTOP,
        ProcessSignal::Continue => libc::SIGCONT,
    };
    // SAFETY: `pid` belongs to a child we spawned and still supervise.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signo) };
    if rc != 0 {
        return Err(VzoneError::capture(format!(
            "Failed to {signal:?} capture process {pid}: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn signal_process(_source: &CaptureSource, signal: ProcessSignal) -> VzoneResult<()> {
    Err(VzoneError::recorder_state(format!(
        "{signal:?} is not supported by the ffmpeg recorder on this platform"
    )))
}

/// ffmpeg input arguments for grabbing the display on this platform.
fn platform_input_args(constraints: &CaptureConstraints) -> VzoneResult<Vec<String>> {
    let fps = constraints.fps.max(1).to_string();

    #[cfg(target_os = "linux")]
    {
        let display = std::env::var("DISPLAY").map_err(|_| {
            VzoneError::capture_acquisition("No X11 display available (DISPLAY is unset)")
        })?;
        let mut args = vec![
            "-f".to_string(),
            "x11grab".to_string(),
            "-framerate".to_string(),
            fps,
            "-i".to_string(),
            display,
        ];
        if constraints.audio {
            args.extend(["-f", "pulse", "-i", "default"].map(String::from));
        }
        Ok(args)
    }

    #[cfg(target_os = "macos")]
    {
        let device = if constraints.audio { "1:0" } else { "1:none" };
        Ok(vec![
            "-f".to_string(),
            "avfoundation".to_string(),
            "-framerate".to_string(),
            fps,
            "-i".to_string(),
            device.to_string(),
        ])
    }

    #[cfg(target_os = "windows")]
    {
        if constraints.audio {
            tracing::warn!("Audio capture is not wired for gdigrab; recording video only");
        }
        Ok(vec![
            "-f".to_string(),
            "gdigrab".to_string(),
            "-framerate".to_string(),
            fps,
            "-i".to_string(),
            "desktop".to_string(),
        ])
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = fps;
        Err(VzoneError::capture_acquisition(
            "Display capture is not supported on this platform",
        ))
    }
}

/// Encoder and muxer arguments for a recorder codec hint such as
/// `video/webm; codecs=vp9`.
fn output_args_for_hint(codec_hint: &str, audio: bool) -> Vec<String> {
    let video_codec = if codec_hint.contains("vp8") {
        "libvpx"
    } else {
        "libvpx-vp9"
    };
    let mut args: Vec<String> = vec![
        "-c:v",
        video_codec,
        "-deadline",
        "realtime",
        "-cpu-used",
        "8",
        "-b:v",
        "2M",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    if audio {
        args.extend(["-c:a", "libopus"].map(String::from));
    }
    args.extend(["-f", "webm", "pipe:1"].map(String::from));
    args
}
