//! Transcoding engine contract and the process-wide engine service.
//!
//! Loading an engine is expensive, so [`EngineService`] loads it lazily
//! exactly once and hands the same instance to every export. Concurrent
//! callers wait on the same initialisation. A failed load is not cached:
//! the next acquisition tries again.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use vzone_common::error::{VzoneError, VzoneResult};

/// A sandboxed transcoder with its own virtual filesystem.
#[async_trait::async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Stage a file into the engine's filesystem.
    async fn write_input(&self, name: &str, bytes: &[u8]) -> VzoneResult<()>;

    /// Run one transcode. `progress` receives the completed fraction in
    /// `[0.0, 1.0]` as the engine reports it.
    async fn exec(
        &self,
        args: &[String],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> VzoneResult<()>;

    /// Read a file produced by [`TranscodeEngine::exec`].
    async fn read_output(&self, name: &str) -> VzoneResult<Vec<u8>>;

    /// Remove a file from the engine's filesystem. Missing files are ignored.
    async fn remove(&self, name: &str) -> VzoneResult<()>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}

/// Where the engine finds its binaries and keeps its files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ffmpeg_binary: String,
    pub ffprobe_binary: String,

    /// Engine filesystem root. Defaults to a per-process temp directory.
    pub work_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            work_dir: None,
        }
    }
}

impl EngineConfig {
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("vzone-engine-{}", std::process::id()))
        })
    }
}

/// Loads an engine instance.
#[async_trait::async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, config: &EngineConfig) -> VzoneResult<Arc<dyn TranscodeEngine>>;
}

/// Lazily-initialised, shared transcoding engine.
pub struct EngineService {
    loader: Arc<dyn EngineLoader>,
    config: EngineConfig,
    engine: OnceCell<Arc<dyn TranscodeEngine>>,
}

impl EngineService {
    pub fn new(loader: Arc<dyn EngineLoader>, config: EngineConfig) -> Self {
        Self {
            loader,
            config,
            engine: OnceCell::new(),
        }
    }

    /// Get the engine, loading it on first use.
    ///
    /// Fails with `EngineInitializationFailed` if loading fails.
    pub async fn acquire(&self) -> VzoneResult<Arc<dyn TranscodeEngine>> {
        let engine = self
            .engine
            .get_or_try_init(|| async {
                tracing::info!("Loading transcoding engine");
                match self.loader.load(&self.config).await {
                    Ok(engine) => {
                        tracing::info!(engine = engine.name(), "Transcoding engine ready");
                        Ok(engine)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Transcoding engine failed to load");
                        Err(match e {
                            VzoneError::EngineInitializationFailed { .. } => e,
                            other => VzoneError::engine_init(other.to_string()),
                        })
                    }
                }
            })
            .await?;
        Ok(engine.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.initialized()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}
