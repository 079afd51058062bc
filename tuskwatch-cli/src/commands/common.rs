//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;

use clap::ValueEnum;
use tuskwatch::config::ConfigFile;
use tuskwatch::session::SessionConfig;
use tuskwatch::source::{SourceConfig, SourceKind};
use tuskwatch::zone::ZoneRegistry;

use crate::error::CliError;

/// Frame source selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SourceArg {
    /// Replay a recorded tracking file
    Replay,
    /// Simulated herd on a random walk
    Mock,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Replay => SourceKind::Replay,
            SourceArg::Mock => SourceKind::Mock,
        }
    }
}

/// Resolve the frame source from CLI args and config.
///
/// A `--file` without `--source` implies replay.
pub fn resolve_source(
    cli_source: Option<SourceArg>,
    cli_file: Option<PathBuf>,
    config: &ConfigFile,
) -> Result<SourceConfig, CliError> {
    let mut source = config.source_config();
    if cli_file.is_some() {
        source.replay_file = cli_file;
        source.kind = SourceKind::Replay;
    }
    if let Some(kind) = cli_source {
        source.kind = kind.into();
    }

    if source.kind == SourceKind::Replay && source.replay_file.is_none() {
        return Err(CliError::Config(
            "Replay source requires a tracking file. \
             Use --file or set stream.replay_file in config.ini"
                .to_string(),
        ));
    }
    Ok(source)
}

/// Resolve session settings, with `--fps` taking precedence over config.
pub fn resolve_session(
    cli_fps: Option<f64>,
    config: &ConfigFile,
) -> Result<SessionConfig, CliError> {
    let session = config.session_config()?;
    match cli_fps {
        Some(fps) if fps.is_finite() && fps > 0.0 => Ok(session.with_frame_rate(fps)),
        Some(fps) => Err(CliError::Config(format!(
            "Frame rate must be positive, got {}",
            fps
        ))),
        None => Ok(session),
    }
}

/// Load the initial zones: `--zones` file, then config.
///
/// Rejected zone definitions are reported but do not stop the command.
pub fn resolve_zones(
    cli_zones: Option<PathBuf>,
    config: &ConfigFile,
) -> Result<ZoneRegistry, CliError> {
    let mut config = config.clone();
    if cli_zones.is_some() {
        config.zones.file = cli_zones;
    }
    let (registry, report) = config.zone_registry()?;
    for rejected in &report.rejected {
        eprintln!("Warning: {}", rejected);
    }
    Ok(registry)
}
