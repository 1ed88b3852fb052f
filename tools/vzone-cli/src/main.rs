//! V.ZONE CLI: record the screen with click zooms and export framed videos.
//!
//! Usage:
//!   vzone record [OPTIONS]          Record interactively from stdin intents
//!   vzone export <INPUT> [OPTIONS]  Compose an existing recording into an MP4
//!   vzone check                     Check for ffmpeg and pointer input

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vzone_common::config::AppConfig;
use vzone_project_model::BackgroundConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "vzone",
    about = "Screen recording with automatic click zooms and framed export",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the screen, controlled by single-letter lines on stdin
    Record {
        /// Directory for recorded and exported files
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        background: BackgroundArgs,

        /// Record video only
        #[arg(long)]
        no_audio: bool,

        /// Export as soon as the recording finishes
        #[arg(long)]
        export: bool,
    },

    /// Compose an existing WebM recording onto a background
    Export {
        /// Recording to export
        input: PathBuf,

        /// Directory for the exported MP4
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Zoom timeline JSON to stage alongside the recording
        #[arg(long)]
        zooms: Option<PathBuf>,

        #[command(flatten)]
        background: BackgroundArgs,
    },

    /// Check system capabilities
    Check,
}

#[derive(Args)]
struct BackgroundArgs {
    /// Solid background color (e.g. "#ff0000")
    #[arg(long, value_name = "COLOR")]
    background: Option<String>,

    /// Gradient background from START to END
    #[arg(long, num_args = 2, value_names = ["START", "END"], conflicts_with = "background")]
    gradient: Option<Vec<String>>,
}

impl BackgroundArgs {
    fn into_config(self) -> BackgroundConfig {
        match (self.background, self.gradient) {
            (_, Some(colors)) if colors.len() == 2 => {
                BackgroundConfig::gradient(colors[0].clone(), colors[1].clone())
            }
            (Some(color), _) => BackgroundConfig::solid(color),
            _ => BackgroundConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    let _log_guard = vzone_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Record {
            output,
            background,
            no_audio,
            export,
        } => {
            if let Some(dir) = output {
                config.export.output_dir = dir;
            }
            config.capture.audio = !no_audio;
            commands::record::run(config, background.into_config(), export).await
        }
        Commands::Export {
            input,
            output,
            zooms,
            background,
        } => {
            if let Some(dir) = output {
                config.export.output_dir = dir;
            }
            commands::export::run(config, input, zooms, background.into_config()).await
        }
        Commands::Check => commands::check::run(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_flag_builds_gradient() {
        let cli = Cli::parse_from(["vzone", "record", "--gradient", "#111111", "#222222"]);
        let Commands::Record { background, .. } = cli.command else {
            panic!("expected record");
        };
        let config = background.into_config();
        assert_eq!(config, BackgroundConfig::gradient("#111111", "#222222"));
    }

    #[test]
    fn test_background_defaults_to_dark_solid() {
        let cli = Cli::parse_from(["vzone", "export", "take.webm"]);
        let Commands::Export { background, .. } = cli.command else {
            panic!("expected export");
        };
        assert_eq!(background.into_config(), BackgroundConfig::default());
    }

    #[test]
    fn test_background_and_gradient_conflict() {
        let parsed = Cli::try_parse_from([
            "vzone",
            "record",
            "--background",
            "#ff0000",
            "--gradient",
            "#000000",
            "#ffffff",
        ]);
        assert!(parsed.is_err());
    }
}
