//! Canvas background behind the composited export.

use serde::{Deserialize, Serialize};

/// Background canvas used by the preview layout and the export compositor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackgroundConfig {
    /// Flat color (CSS color string, e.g. `#171717` or `red`).
    Solid { color: String },

    /// Two-stop linear gradient.
    Gradient {
        start_color: String,
        end_color: String,
        #[serde(default = "default_direction")]
        direction: String,
    },
}

const FALLBACK_FILL: &str = "#000000";

fn default_direction() -> String {
    "to right".to_string()
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self::solid("#171717")
    }
}

impl BackgroundConfig {
    pub fn solid(color: impl Into<String>) -> Self {
        Self::Solid {
            color: color.into(),
        }
    }

    pub fn gradient(start_color: impl Into<String>, end_color: impl Into<String>) -> Self {
        Self::Gradient {
            start_color: start_color.into(),
            end_color: end_color.into(),
            direction: default_direction(),
        }
    }

    /// The flat color the export compositor fills the canvas with.
    ///
    /// Gradients are not composited: their start color is used instead.
    pub fn fill_color(&self) -> &str {
        let color = match self {
            Self::Solid { color } => color.as_str(),
            Self::Gradient { start_color, .. } => start_color.as_str(),
        };
        if color.trim().is_empty() {
            FALLBACK_FILL
        } else {
            color.trim()
        }
    }

    /// Fill color in ffmpeg's color syntax (`#rrggbb` becomes `0xrrggbb`).
    pub fn ffmpeg_color(&self) -> String {
        let fill = self.fill_color();
        match fill.strip_prefix('#') {
            Some(hex) => format!("0x{hex}"),
            None => fill.to_string(),
        }
    }

    /// CSS background value for the preview layout.
    pub fn css(&self) -> String {
        match self {
            Self::Solid { color } => color.clone(),
            Self::Gradient {
                start_color,
                end_color,
                direction,
            } => format!("linear-gradient({direction}, {start_color}, {end_color})"),
        }
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self, Self::Gradient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_dark_solid() {
        assert_eq!(BackgroundConfig::default(), BackgroundConfig::solid("#171717"));
    }

    #[test]
    fn test_gradient_falls_back_to_start_color() {
        let bg = BackgroundConfig::gradient("#ff0000", "#0000ff");
        assert_eq!(bg.fill_color(), "#ff0000");
        assert_eq!(bg.ffmpeg_color(), "0xff0000");
        assert_eq!(bg.css(), "linear-gradient(to right, #ff0000, #0000ff)");
    }

    #[test]
    fn test_empty_start_color_uses_black() {
        let bg = BackgroundConfig::gradient("", "#0000ff");
        assert_eq!(bg.fill_color(), "#000000");
    }

    #[test]
    fn test_named_color_passes_through() {
        assert_eq!(BackgroundConfig::solid("red").ffmpeg_color(), "red");
    }

    #[test]
    fn test_gradient_direction_defaults_when_missing() {
        let bg: BackgroundConfig = serde_json::from_str(
            r##"{"type":"gradient","start_color":"#111111","end_color":"#222222"}"##,
        )
        .unwrap();
        assert_eq!(
            bg,
            BackgroundConfig::Gradient {
                start_color: "#111111".into(),
                end_color: "#222222".into(),
                direction: "to right".into(),
            }
        );
    }
}
