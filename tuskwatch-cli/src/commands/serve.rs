//! Serve command - stream tracking to map clients over WebSocket.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tuskwatch::server::{TrackingController, TrackingServer};

use super::common::{resolve_session, resolve_source, resolve_zones, SourceArg};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the serve command.
pub struct ServeArgs {
    pub source: Option<SourceArg>,
    pub file: Option<PathBuf>,
    pub bind: Option<String>,
    pub zones: Option<PathBuf>,
    pub fps: Option<f64>,
}

/// Run the serve command.
pub fn run(runner: &CliRunner, args: ServeArgs) -> Result<(), CliError> {
    runner.log_startup("serve");
    let config = runner.config();

    let source = resolve_source(args.source, args.file, config)?;
    let session = resolve_session(args.fps, config)?;
    let registry = resolve_zones(args.zones, config)?;
    let dispatcher = config.dispatcher()?;
    let bind = args
        .bind
        .unwrap_or_else(|| config.server.bind_address.clone());

    println!("Tuskwatch Server v{}", tuskwatch::VERSION);
    println!("======================");
    println!();
    println!("Listen:    ws://{}", bind);
    match &source.replay_file {
        Some(file) if source.kind == tuskwatch::source::SourceKind::Replay => {
            println!("Source:    replay ({})", file.display())
        }
        _ => println!("Source:    {}", source.kind),
    }
    println!("Rate:      {:.1} fps", session.frame_rate());
    println!(
        "Reference: {} ({} m/unit)",
        session.frame.reference, session.frame.meters_per_unit
    );
    println!("Zones:     {}", registry.len());
    for zone in registry.iter() {
        println!("  - {} ({})", zone.display_name(), zone.id);
    }
    println!(
        "Alerts:    {} on {}, {}s cooldown",
        dispatcher.provider(),
        session.trigger,
        session.cooldown.as_secs()
    );
    println!();
    println!(
        "Clients send {} to begin streaming.",
        style("{\"command\": \"start_tracking\"}").cyan()
    );
    println!("Press Ctrl+C to stop the server");
    println!();

    let runtime = runner.runtime()?;
    let cancel = runner.shutdown_token("Received shutdown signal, stopping server...")?;

    runtime.block_on(async move {
        let controller = Arc::new(TrackingController::new(
            session, registry, source, dispatcher,
        ));
        let server = TrackingServer::bind(&bind, controller).await?;
        server.run(cancel).await
    })?;

    println!("Server stopped.");
    Ok(())
}
