//! Engine binary for the Waymark proximity alert system.
//!
//! Reads JSON commands from stdin (observer fixes and marker gestures),
//! keeps the marker catalog, and runs the proximity tracker in its own
//! task. Command replies and alert events are written to stdout as one
//! JSON object per line; logs go to stderr.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `waymark-config.yaml` (or the path given as
//!    the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Start the stdout writer task
//! 4. Create the alert channel and start the alert forwarder task
//! 5. Build the proximity service and start the tracker loop
//! 6. Read commands from stdin until EOF
//! 7. Drain the tracker loop and log the summary

mod command;
mod error;

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use waymark_core::{ChannelSink, ProximityService, WaymarkConfig, runner};

use crate::command::Session;
use crate::error::EngineError;

/// Config file used when no path is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "waymark-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or stdin/stdout
/// fail. Errors in individual commands are answered and do not stop the
/// engine.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("waymark-engine starting");
    info!(
        path = %config_path.display(),
        from_file,
        threshold_km = config.proximity.threshold_km,
        min_interval_ms = config.source.min_interval_ms,
        min_distance_m = config.source.min_distance_m,
        max_future_skew_ms = config.source.max_future_skew_ms,
        queue_capacity = config.tracker.queue_capacity,
        "Configuration loaded"
    );

    // 3. Single writer for stdout so replies and alerts never interleave.
    let (out_tx, out_rx) = mpsc::channel::<String>(config.tracker.queue_capacity);
    let writer = tokio::spawn(write_lines(out_rx));

    // 4. Alert channel and forwarder.
    let (sink, mut alerts) = ChannelSink::channel(config.tracker.queue_capacity);
    let alert_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = alerts.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if alert_out.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to encode alert event"),
            }
        }
    });
    info!("Alert forwarder started");

    // 5. Proximity service and tracker loop.
    let (tracker_tx, tracker_rx) = runner::tracker_channel(config.tracker.queue_capacity);
    let mut service = ProximityService::new(sink, &config);
    let tracker = tokio::spawn(async move { runner::run_tracker(&mut service, tracker_rx).await });
    info!("Tracker loop started");

    // 6. Command loop.
    let mut session = Session::new(tracker_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut commands: u64 = 0;
    while let Some(line) = lines.next_line().await.map_err(EngineError::from)? {
        if line.trim().is_empty() {
            continue;
        }
        commands = commands.saturating_add(1);
        let reply = session.handle_line(&line).await;
        if out_tx.send(reply).await.is_err() {
            warn!("stdout writer stopped, ending command loop");
            break;
        }
    }
    info!(commands, "stdin closed");

    // 7. Shut down in pipeline order: tracker, alerts, writer.
    drop(session);
    let summary = tracker.await?;
    runner::log_tracker_end(&summary);
    forwarder.await?;
    drop(out_tx);
    writer.await??;

    info!("waymark-engine shutdown complete");
    Ok(())
}

/// Write each received line to stdout, flushing after every line.
async fn write_lines(mut lines: mpsc::Receiver<String>) -> Result<(), EngineError> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Load configuration, falling back to defaults when the file is absent.
///
/// Returns the config and whether it came from a file.
fn load_config(path: &Path) -> Result<(WaymarkConfig, bool), EngineError> {
    if path.exists() {
        Ok((WaymarkConfig::from_file(path)?, true))
    } else {
        let mut config = WaymarkConfig::default();
        config.proximity.apply_env_overrides();
        config.validate()?;
        Ok((config, false))
    }
}
