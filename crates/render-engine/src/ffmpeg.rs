//! Engine backed by the system `ffmpeg`/`ffprobe` binaries.
//!
//! The engine filesystem is a working directory; relative names passed to
//! `write_input`/`read_output` and used as ffmpeg arguments resolve inside it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use vzone_common::error::{VzoneError, VzoneResult};

use crate::engine::{EngineConfig, EngineLoader, TranscodeEngine};

/// Seconds without `out_time` advancing before a stall is logged.
const STALL_WARN_SECS: u64 = 10;

/// Loads [`FfmpegEngine`] after checking the binary runs.
#[derive(Debug, Default, Clone)]
pub struct FfmpegEngineLoader;

#[async_trait::async_trait]
impl EngineLoader for FfmpegEngineLoader {
    async fn load(&self, config: &EngineConfig) -> VzoneResult<Arc<dyn TranscodeEngine>> {
        if !binary_runs(&config.ffmpeg_binary).await {
            return Err(VzoneError::engine_init(format!(
                "{} not found or not executable (expected in PATH)",
                config.ffmpeg_binary
            )));
        }
        if !binary_runs(&config.ffprobe_binary).await {
            tracing::warn!(
                binary = %config.ffprobe_binary,
                "ffprobe unavailable; render progress will only report completion"
            );
        }

        let work_dir = config.resolved_work_dir();
        tokio::fs::create_dir_all(&work_dir).await.map_err(|e| {
            VzoneError::engine_init(format!(
                "Failed to create engine directory {}: {e}",
                work_dir.display()
            ))
        })?;
        tracing::debug!(work_dir = %work_dir.display(), "ffmpeg engine filesystem ready");

        Ok(Arc::new(FfmpegEngine {
            ffmpeg: config.ffmpeg_binary.clone(),
            ffprobe: config.ffprobe_binary.clone(),
            work_dir,
        }))
    }
}

/// Whether `binary -version` runs successfully.
pub async fn binary_runs(binary: &str) -> bool {
    Command::new(binary)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

pub struct FfmpegEngine {
    ffmpeg: String,
    ffprobe: String,
    work_dir: PathBuf,
}

impl FfmpegEngine {
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn path_of(&self, name: &str) -> VzoneResult<PathBuf> {
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(VzoneError::config(format!(
                "engine file name must stay inside the engine filesystem: {name}"
            )));
        }
        Ok(self.work_dir.join(relative))
    }

    /// Duration of the first file input in `args`, if ffprobe can tell.
    async fn query_input_duration(&self, args: &[String]) -> Option<f64> {
        let input = args
            .windows(2)
            .find(|w| w[0] == "-i" && self.work_dir.join(&w[1]).is_file())
            .map(|w| self.work_dir.join(&w[1]))?;

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(&input)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_reported_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait::async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn write_input(&self, name: &str, bytes: &[u8]) -> VzoneResult<()> {
        let path = self.path_of(name)?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Staged engine input");
        Ok(())
    }

    async fn exec(
        &self,
        args: &[String],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> VzoneResult<()> {
        let expected_duration_secs = self.query_input_duration(args).await;
        if expected_duration_secs.is_none() {
            tracing::debug!("Input duration unknown; progress will jump to completion");
        }

        tracing::debug!(?args, "Running ffmpeg");
        let mut child = Command::new(&self.ffmpeg)
            .current_dir(&self.work_dir)
            .args(["-hide_banner", "-y", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VzoneError::transcode(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| VzoneError::transcode("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| VzoneError::transcode("Failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        let mut last_progress_secs = 0.0f64;
        let mut last_progress_wall = std::time::Instant::now();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| VzoneError::transcode(format!("Failed reading ffmpeg progress: {e}")))?
        {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            state.update(key, value);
            if key != "progress" {
                continue;
            }

            if state.out_time_secs > last_progress_secs + 0.001 {
                last_progress_secs = state.out_time_secs;
                last_progress_wall = std::time::Instant::now();
            } else if last_progress_wall.elapsed().as_secs() >= STALL_WARN_SECS {
                tracing::warn!(
                    out_time_secs = state.out_time_secs,
                    "No ffmpeg progress advancement for {STALL_WARN_SECS}s"
                );
                last_progress_wall = std::time::Instant::now();
            }
            if let Some(fraction) = state.fraction(expected_duration_secs) {
                progress(fraction);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| VzoneError::transcode(format!("Failed to wait on ffmpeg: {e}")))?;
        let stderr_output = stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(VzoneError::transcode(format!(
                "ffmpeg failed (status {status}): {}",
                stderr_tail(&stderr_output, 20)
            )));
        }
        Ok(())
    }

    async fn read_output(&self, name: &str) -> VzoneResult<Vec<u8>> {
        let path = self.path_of(name)?;
        let bytes = tokio::fs::read(&path).await?;
        Ok(bytes)
    }

    async fn remove(&self, name: &str) -> VzoneResult<()> {
        let path = self.path_of(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

/// Accumulated `-progress` key/value state.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
    complete: bool,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    fn fraction(&self, expected_duration_secs: Option<f64>) -> Option<f64> {
        if self.complete {
            return Some(1.0);
        }
        match expected_duration_secs {
            Some(total) if total > 0.0 => Some((self.out_time_secs / total).clamp(0.0, 1.0)),
            _ => None,
        }
    }
}

fn parse_reported_duration(raw: &str) -> Option<f64> {
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

fn stderr_tail(stderr: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
