//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Capture defaults used when a recording starts.
    pub capture: CaptureDefaults,

    /// Export defaults used by the export pipeline.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default capture parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Capture frame rate.
    pub fps: u32,

    /// Codec hint handed to the recorder.
    pub codec_hint: String,

    /// Whether to capture audio alongside the display.
    pub audio: bool,

    /// Preferred display surface (`monitor`, `window`, `browser`).
    pub display_surface: String,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Canvas width in pixels.
    pub canvas_width: u32,

    /// Canvas height in pixels.
    pub canvas_height: u32,

    /// Canvas frame rate for the generated background source.
    pub canvas_fps: u32,

    /// x264 preset.
    pub preset: String,

    /// x264 constant rate factor.
    pub crf: u32,

    /// Directory exported and raw artifacts are materialized into.
    pub output_dir: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vzone_studio=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            codec_hint: "video/webm; codecs=vp9".to_string(),
            audio: true,
            display_surface: "monitor".to_string(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            canvas_width: 1920,
            canvas_height: 1080,
            canvas_fps: 30,
            preset: "ultrafast".to_string(),
            crf: 22,
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(path: &std::path::Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config at {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vzone").join("config.json")
}

fn default_output_dir() -> PathBuf {
    std::env::temp_dir().join("vzone").join("artifacts")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_export_preset() {
        let config = AppConfig::default();
        assert_eq!(config.export.canvas_width, 1920);
        assert_eq!(config.export.canvas_height, 1080);
        assert_eq!(config.export.preset, "ultrafast");
        assert_eq!(config.export.crf, 22);
        assert!(config.capture.audio);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: AppConfig = serde_json::from_str(r#"{"export":{"crf":18}}"#).unwrap();
        assert_eq!(parsed.export.crf, 18);
        assert_eq!(parsed.export.preset, "ultrafast");
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join("vzone_test_config");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config.json");

        let mut config = AppConfig::default();
        config.capture.fps = 60;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.capture.fps, 60);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_corrupt_config_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join("vzone_test_config_corrupt");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.capture.fps, 30);

        std::fs::remove_dir_all(&dir).ok();
    }
}
