//! Interactive recording session.

use tokio::io::{AsyncBufReadExt, BufReader};
use vzone_common::config::AppConfig;
use vzone_input_tracker::backends::{detect_best_backend, DEFAULT_VIEWPORT};
use vzone_input_tracker::PointerPump;
use vzone_project_model::{BackgroundConfig, RecordingLifecycleState};
use vzone_studio::{Studio, StudioDeps, StudioHandle, StudioSnapshot};

const HELP: &str = "  p = pause/resume, s = stop, x = export, r = reset, q = quit";

pub async fn run(
    config: AppConfig,
    background: BackgroundConfig,
    auto_export: bool,
) -> anyhow::Result<()> {
    println!("V.ZONE recording");
    println!("  Output: {}", config.export.output_dir.display());
    println!("  Audio: {}", config.capture.audio);
    println!("  Background: {}", background.css());
    println!();

    let studio = Studio::spawn_with_background(StudioDeps::from_config(&config), background);

    let mut pump = PointerPump::new(
        detect_best_backend(DEFAULT_VIEWPORT),
        studio.pointer_hub().clone(),
    );
    let pump_stop = pump.stop_flag();
    let pump_task = tokio::spawn(async move { pump.run().await });

    studio.start().await?;
    println!("{HELP}");
    println!();

    let mut snapshots = studio.subscribe();
    let mut printed = studio.snapshot();
    print_snapshot(&printed);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&studio, line.trim()).await {
                    break;
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = snapshots.borrow_and_update().clone();
                let just_finished = current.state == RecordingLifecycleState::Finished
                    && printed.state.is_capturing();
                if worth_printing(&printed, &current) {
                    print_snapshot(&current);
                }
                printed = current;
                if just_finished && auto_export {
                    report(studio.export().await);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    let last = studio.snapshot();
    studio.shutdown().await?;
    pump_stop.store(true, std::sync::atomic::Ordering::SeqCst);
    match pump_task.await {
        Ok(Ok(events)) => tracing::debug!(events, "Pointer pump finished"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Pointer pump failed"),
        Err(e) => tracing::warn!(error = %e, "Pointer pump task panicked"),
    }

    if let Some(recorded) = last.recorded.as_ref().and_then(|r| r.url.as_ref()) {
        println!("Recording: {recorded}");
    }
    if let Some(exported) = &last.exported {
        println!("Export:    {}", exported.url);
    }
    Ok(())
}

/// Apply one stdin intent. Returns `false` when the user asked to quit.
async fn handle_line(studio: &StudioHandle, line: &str) -> bool {
    let result = match line {
        "p" => {
            if studio.snapshot().state == RecordingLifecycleState::Paused {
                studio.resume().await
            } else {
                studio.pause().await
            }
        }
        "s" => studio.stop().await,
        "x" => studio.export().await,
        "r" => studio.reset().await,
        "q" => return false,
        "" => return true,
        other => {
            println!("Unknown command '{other}'");
            println!("{HELP}");
            return true;
        }
    };
    report(result);
    true
}

fn report(result: vzone_common::error::VzoneResult<()>) {
    if let Err(e) = result {
        println!("  ! {e}");
    }
}

fn worth_printing(previous: &StudioSnapshot, current: &StudioSnapshot) -> bool {
    previous.state != current.state
        || previous.time != current.time
        || previous.zooms.len() != current.zooms.len()
        || previous.processing != current.processing
        || previous.error_count != current.error_count
}

fn print_snapshot(snapshot: &StudioSnapshot) {
    match serde_json::to_string(&snapshot.summary()) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::warn!(error = %e, "Snapshot not printable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_ticks_are_printed() {
        let previous = StudioSnapshot::default();
        let mut current = previous.clone();
        assert!(!worth_printing(&previous, &current));

        current.time = 1;
        assert!(worth_printing(&previous, &current));
    }

    #[test]
    fn test_background_change_alone_is_quiet() {
        let previous = StudioSnapshot::default();
        let current = StudioSnapshot {
            background: BackgroundConfig::solid("#ff0000"),
            ..previous.clone()
        };
        assert!(!worth_printing(&previous, &current));
    }
}
