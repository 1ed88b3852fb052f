//! Error types shared across V.ZONE crates.

/// Top-level error type for V.ZONE operations.
#[derive(Debug, thiserror::Error)]
pub enum VzoneError {
    /// The display/audio stream could not be acquired (permission denied,
    /// no source selected, capture tool missing).
    #[error("Capture acquisition failed: {message}")]
    CaptureAcquisitionFailed { message: String },

    /// The external transcoding engine could not be loaded.
    #[error("Engine initialization failed: {message}")]
    EngineInitializationFailed { message: String },

    /// The transcoding engine failed to run a command or move files.
    #[error("Transcoder error: {message}")]
    Transcode { message: String },

    /// One stage of an export job failed.
    #[error("Export stage '{stage}' failed: {message}")]
    ExportStageFailed { stage: String, message: String },

    /// A recorder control operation was invoked in an incompatible state.
    #[error("Recorder state error: {message}")]
    RecorderState { message: String },

    /// The lifecycle state does not accept the requested intent.
    #[error("Cannot {intent} while {from}")]
    InvalidTransition { from: String, intent: String },

    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VzoneError.
pub type VzoneResult<T> = Result<T, VzoneError>;

impl VzoneError {
    pub fn capture_acquisition(msg: impl Into<String>) -> Self {
        Self::CaptureAcquisitionFailed {
            message: msg.into(),
        }
    }

    pub fn engine_init(msg: impl Into<String>) -> Self {
        Self::EngineInitializationFailed {
            message: msg.into(),
        }
    }

    pub fn export_stage(stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ExportStageFailed {
            stage: stage.into(),
            message: msg.into(),
        }
    }

    pub fn recorder_state(msg: impl Into<String>) -> Self {
        Self::RecorderState {
            message: msg.into(),
        }
    }

    pub fn invalid_transition(from: impl Into<String>, intent: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            intent: intent.into(),
        }
    }

    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error came out of the export path (engine load or a stage).
    pub fn is_export_failure(&self) -> bool {
        matches!(
            self,
            Self::EngineInitializationFailed { .. } | Self::ExportStageFailed { .. }
        )
    }
}
