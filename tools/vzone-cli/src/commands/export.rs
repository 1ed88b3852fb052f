//! Standalone export of an existing recording.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use vzone_common::config::AppConfig;
use vzone_project_model::{
    BackgroundConfig, MediaBlob, RecordedArtifact, ZoomTimeline, RAW_MEDIA_TYPE,
};
use vzone_render_engine::{
    CompositionSettings, EngineConfig, EngineService, ExportJob, ExportPipeline, ExportProgress,
    FfmpegEngineLoader, FileBlobStore,
};

pub async fn run(
    config: AppConfig,
    input: PathBuf,
    zooms: Option<PathBuf>,
    background: BackgroundConfig,
) -> anyhow::Result<()> {
    println!("Exporting recording: {}", input.display());

    let bytes = tokio::fs::read(&input)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", input.display()))?;
    let zooms = match zooms {
        Some(path) => load_zooms(&path).await?,
        None => ZoomTimeline::new(),
    };

    let settings = CompositionSettings::from(&config.export);
    println!("  Output: {}", config.export.output_dir.display());
    println!(
        "  Canvas: {}x{} @ {} fps",
        settings.canvas_width, settings.canvas_height, settings.canvas_fps
    );
    println!("  Background: {}", background.css());
    println!("  Zooms: {}", zooms.len());

    let pipeline = ExportPipeline::new(
        Arc::new(EngineService::new(
            Arc::new(FfmpegEngineLoader),
            EngineConfig::default(),
        )),
        Arc::new(FileBlobStore::new(&config.export.output_dir)),
        settings,
    );
    let job = ExportJob {
        recording: RecordedArtifact::new(MediaBlob::new(bytes, RAW_MEDIA_TYPE), 0),
        zooms,
        background,
    };

    let progress = |p: ExportProgress| {
        print!("\r  {p}            ");
        let _ = std::io::stdout().flush();
    };

    match pipeline.run(job, &progress).await {
        Ok(exported) => {
            println!("\nExport complete: {}", exported.url);
            Ok(())
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            Err(e.into())
        }
    }
}

async fn load_zooms(path: &std::path::Path) -> anyhow::Result<ZoomTimeline> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let zooms: ZoomTimeline = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid zoom timeline {}: {e}", path.display()))?;
    if !zooms.is_chronological() {
        tracing::warn!(path = %path.display(), "Zoom timeline is not in chronological order");
    }
    Ok(zooms)
}
