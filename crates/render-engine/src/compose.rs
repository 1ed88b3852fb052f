//! Composition of the recording onto a background canvas.
//!
//! The recording is scaled to fit a fixed share of the canvas and centred
//! over a solid colour source, then encoded to H.264/AAC MP4. Gradients are
//! rendered as their start colour.

use vzone_common::config::ExportDefaults;
use vzone_project_model::BackgroundConfig;

/// Percent of each canvas axis the recording may occupy.
pub const CONTENT_FIT_PERCENT: u32 = 85;

/// Canvas and encoder settings for one export.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionSettings {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub canvas_fps: u32,
    pub preset: String,
    pub crf: u32,
}

impl Default for CompositionSettings {
    fn default() -> Self {
        Self::from(&ExportDefaults::default())
    }
}

impl From<&ExportDefaults> for CompositionSettings {
    fn from(defaults: &ExportDefaults) -> Self {
        Self {
            canvas_width: defaults.canvas_width,
            canvas_height: defaults.canvas_height,
            canvas_fps: defaults.canvas_fps,
            preset: defaults.preset.clone(),
            crf: defaults.crf,
        }
    }
}

impl CompositionSettings {
    /// Largest box the recording is scaled into, rounded down to even
    /// dimensions for yuv420p.
    pub fn content_box(&self) -> (u32, u32) {
        let fit = |extent: u32| (extent * CONTENT_FIT_PERCENT / 100) & !1;
        (fit(self.canvas_width), fit(self.canvas_height))
    }
}

/// Background colour source for the lavfi input.
fn color_source(background: &BackgroundConfig, settings: &CompositionSettings) -> String {
    format!(
        "color=c={}:s={}x{}:r={}",
        background.ffmpeg_color(),
        settings.canvas_width,
        settings.canvas_height,
        settings.canvas_fps
    )
}

fn build_filter_graph(settings: &CompositionSettings) -> String {
    let (box_w, box_h) = settings.content_box();
    format!(
        "[0:v]scale={box_w}:{box_h}:force_original_aspect_ratio=decrease:force_divisible_by=2[fg];\
         [1:v][fg]overlay=(W-w)/2:(H-h)/2:shortest=1,format=yuv420p[v]"
    )
}

/// Full ffmpeg argument list compositing `input` onto `background` into
/// `output`.
pub fn transcode_args(
    input: &str,
    output: &str,
    background: &BackgroundConfig,
    settings: &CompositionSettings,
) -> Vec<String> {
    let crf = settings.crf.to_string();
    let filter_graph = build_filter_graph(settings);
    let color = color_source(background, settings);

    [
        "-i",
        input,
        "-f",
        "lavfi",
        "-i",
        color.as_str(),
        "-filter_complex",
        filter_graph.as_str(),
        "-map",
        "[v]",
        "-map",
        "0:a?",
        "-c:v",
        "libx264",
        "-preset",
        settings.preset.as_str(),
        "-crf",
        crf.as_str(),
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-movflags",
        "+faststart",
        output,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
