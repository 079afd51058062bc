//! Zone inspection CLI commands.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;
use tuskwatch::config::read_zone_file;
use tuskwatch::geo::ReferenceFrame;
use tuskwatch::zone::{Zone, ZoneRegistry, ZoneShape};

use crate::error::CliError;
use crate::runner::load_config;

/// Zone subcommands.
#[derive(Debug, Subcommand)]
pub enum ZonesCommands {
    /// Validate a zones JSON file
    Check {
        /// File holding a zone array or {"zones": [...]}
        file: PathBuf,
    },

    /// Show the zones a session would start with
    Show,
}

/// Run a zones subcommand.
pub fn run(command: ZonesCommands, config_path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ZonesCommands::Check { file } => run_check(&file),
        ZonesCommands::Show => run_show(config_path),
    }
}

fn run_check(file: &Path) -> Result<(), CliError> {
    let entries = read_zone_file(file)?;
    let total = entries.len();
    let mut registry = ZoneRegistry::new();
    let report = registry.replace_values(entries);

    println!("Zone file: {}", file.display());
    println!();
    for zone in registry.iter() {
        println!("  {} {}", style("ok").green(), describe(zone, None));
    }
    for rejected in &report.rejected {
        println!("  {} {}", style("rejected").red(), rejected);
    }
    println!();
    println!(
        "{} of {} zone definition(s) accepted",
        report.accepted.len(),
        total
    );

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::Zones(format!(
            "{} invalid zone definition(s) in {}",
            report.rejected.len(),
            file.display()
        )))
    }
}

fn run_show(config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let frame = config.reference_frame()?;
    let (registry, report) = config.zone_registry()?;

    match &config.zones.file {
        Some(file) => println!("Zones from {}", file.display()),
        None if config.boundary.enabled => println!("Zones from [boundary]"),
        None => println!("No zones configured"),
    }
    for zone in registry.iter() {
        println!("  {}", describe(zone, Some(&frame)));
    }
    for rejected in &report.rejected {
        println!("  {} {}", style("rejected").red(), rejected);
    }
    Ok(())
}

/// One-line description; squares get their geographic centre when a frame
/// is given.
fn describe(zone: &Zone, frame: Option<&ReferenceFrame>) -> String {
    let name = if zone.display_name() == zone.id.as_str() {
        zone.id.to_string()
    } else {
        format!("{} \"{}\"", zone.id, zone.display_name())
    };
    match &zone.shape {
        ZoneShape::Circle {
            center,
            radius_meters,
        } => format!("{}: circle r={} m at {}", name, radius_meters, center),
        ZoneShape::Square { center, size } => {
            let geo = frame
                .and_then(|frame| frame.to_geo(*center).ok())
                .map(|coord| format!(" ({})", coord))
                .unwrap_or_default();
            format!(
                "{}: square {} at ({}, {}){}",
                name, size, center.x, center.y, geo
            )
        }
    }
}
