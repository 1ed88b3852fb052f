//! Check system capabilities.

use vzone_common::config::{config_file_path, AppConfig};
use vzone_input_tracker::backends::{detect_best_backend, DEFAULT_VIEWPORT};
use vzone_render_engine::ffmpeg::binary_runs;
use vzone_render_engine::EngineConfig;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("V.ZONE System Check");
    println!("{}", "=".repeat(50));

    let engine = EngineConfig::default();
    let ffmpeg = binary_runs(&engine.ffmpeg_binary).await;
    let ffprobe = binary_runs(&engine.ffprobe_binary).await;
    print_status(ffmpeg, &format!("ffmpeg ({})", engine.ffmpeg_binary));
    print_status(ffprobe, &format!("ffprobe ({})", engine.ffprobe_binary));

    let backend = detect_best_backend(DEFAULT_VIEWPORT);
    let pointer = backend.is_available() && backend.name() != "stub";
    print_status(pointer, &format!("Pointer input: {}", backend.name()));

    println!();
    println!("  Config: {}", config_file_path().display());
    println!("  Output directory: {}", config.export.output_dir.display());

    println!();
    if ffmpeg && ffprobe {
        println!("Recording and export are available.");
    } else {
        println!("ffmpeg and ffprobe must be on PATH to record and export.");
    }
    if !pointer {
        println!("Clicks will not produce zooms without pointer input access.");
    }

    Ok(())
}

fn print_status(ok: bool, label: &str) {
    let tag = if ok { "[OK]  " } else { "[MISS]" };
    println!("{tag} {label}");
}
