//! Run command - headless tracking session printing transitions and alerts.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tuskwatch::membership::TransitionKind;
use tuskwatch::session::{SessionEvent, SessionSummary, TrackingSession};

use super::common::{resolve_session, resolve_source, resolve_zones, SourceArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the run command.
pub struct RunArgs {
    pub source: Option<SourceArg>,
    pub file: Option<PathBuf>,
    pub zones: Option<PathBuf>,
    pub fps: Option<f64>,
}

/// Run the run command.
pub fn run(runner: &CliRunner, args: RunArgs) -> Result<(), CliError> {
    runner.log_startup("run");
    let config = runner.config();

    let source_config = resolve_source(args.source, args.file, config)?;
    let session_config = resolve_session(args.fps, config)?;
    let registry = resolve_zones(args.zones, config)?;
    let dispatcher = config.dispatcher()?;
    let source = source_config.open()?;

    println!(
        "Tracking {} at {:.1} fps with {} zone(s)",
        source.name(),
        session_config.frame_rate(),
        registry.len()
    );
    println!("Press Ctrl+C to stop");
    println!();

    let progress = progress_bar(source.total_frames());
    let runtime = runner.runtime()?;
    let cancel = runner.shutdown_token("Received shutdown signal, stopping...")?;

    let summary = runtime.block_on(async move {
        let session = TrackingSession::new(session_config, registry, dispatcher);
        let mut events = session.subscribe();
        let handle = session.spawn(source, cancel);

        loop {
            match events.recv().await {
                Ok(SessionEvent::Completed { .. }) => break,
                Ok(event) => print_event(&progress, event),
                Err(RecvError::Lagged(skipped)) => {
                    progress.println(format!("({} events skipped)", skipped));
                }
                Err(RecvError::Closed) => break,
            }
        }
        progress.finish_and_clear();
        handle.join().await
    });

    print_summary(&summary?);
    Ok(())
}

/// Bar for sources of known length, spinner otherwise.
fn progress_bar(total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => {
            let bar = ProgressBar::new(total);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} frames ({eta})")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                bar.set_style(style);
            }
            bar
        }
    };
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn print_event(progress: &ProgressBar, event: SessionEvent) {
    match event {
        SessionEvent::FrameUpdate(update) => {
            progress.inc(1);
            progress.set_message(format!(
                "frame {} - {} animal(s), {} inside a zone",
                update.frame_number,
                update.positions.len(),
                update.occupied.len()
            ));
        }
        SessionEvent::Entry(t) | SessionEvent::Exit(t) => {
            let kind = match t.kind {
                TransitionKind::Entry => style("ENTRY").yellow(),
                TransitionKind::Exit => style("EXIT ").green(),
            };
            progress.println(format!(
                "{} {} animal {} zone {}",
                clock(t.at),
                kind,
                t.entity_id,
                t.zone_id
            ));
        }
        SessionEvent::AlertSent(alert) => {
            progress.println(format!(
                "{} {} {}",
                clock(alert.at),
                style("ALERT").red().bold(),
                alert.message
            ));
        }
        SessionEvent::AlertSuppressed {
            entity_id,
            zone_id,
            retry_after_ms,
            ..
        } => {
            progress.println(format!(
                "{}",
                style(format!(
                    "         alert for {} in {} suppressed ({}s cooldown left)",
                    entity_id,
                    zone_id,
                    retry_after_ms / 1000
                ))
                .dim()
            ));
        }
        SessionEvent::SampleRejected {
            frame_number,
            reason,
            ..
        } => {
            progress.println(format!(
                "{}",
                style(format!("         frame {}: {}", frame_number, reason)).dim()
            ));
        }
        SessionEvent::Started { .. }
        | SessionEvent::ConfigApplied(_)
        | SessionEvent::Completed { .. } => {}
    }
}

/// Local wall-clock time of an epoch-millisecond timestamp.
fn clock(at: i64) -> String {
    DateTime::from_timestamp_millis(at)
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn print_summary(summary: &SessionSummary) {
    let stats = &summary.stats;
    println!();
    println!("Session Summary ({:?})", summary.reason);
    println!("───────────────");
    println!(
        "  Frames:      {} ({} samples, {} rejected)",
        stats.frames_processed, stats.samples_processed, stats.samples_rejected
    );
    println!(
        "  Transitions: {} entries, {} exits",
        stats.entries, stats.exits
    );
    println!(
        "  Alerts:      {} sent, {} suppressed, {} failed",
        stats.alerts_sent, stats.alerts_suppressed, stats.alerts_failed
    );
}
