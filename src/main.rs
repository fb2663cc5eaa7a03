//! SpinBridge - smart trainer bridge
//!
//! Headless entry point: connect, record, merge or generate a TCX activity.

use anyhow::Context;
use clap::Parser;
use spinbridge::recording::exporter_tcx::{
    export_tcx_to_file, generate_tcx_filename, merge_or_generate, TcxOutcome,
};
use spinbridge::recording::runner::spawn_session;
use spinbridge::recording::session::format_duration;
use spinbridge::recording::types::{DurationFormat, SessionSummary};
use spinbridge::sensors::control::ControlDebouncer;
use spinbridge::sensors::types::TrainerKind;
use spinbridge::storage::config::{load_config, load_config_from};
use spinbridge::TrainerBridge;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "spinbridge",
    version,
    about = "Record a smart trainer session and export it as TCX",
    long_about = "Connects to an FTMS smart trainer (or a simulated one), records one averaged point per second and merges the result into an existing TCX activity or writes a new one"
)]
struct Cli {
    /// Use the simulated trainer instead of Bluetooth
    #[arg(long)]
    simulate: bool,

    /// BLE device id to connect to (first FTMS trainer otherwise)
    #[arg(long)]
    device: Option<String>,

    /// Stop after this many seconds (runs until Ctrl-C otherwise)
    #[arg(long)]
    seconds: Option<u64>,

    /// ERG target power in watts
    #[arg(long)]
    target_power: Option<i16>,

    /// Target resistance level
    #[arg(long)]
    resistance: Option<i16>,

    /// Existing TCX activity to merge the session into
    #[arg(long)]
    merge: Option<PathBuf>,

    /// Directory for the exported activity
    #[arg(long)]
    output: Option<PathBuf>,

    /// Configuration file override
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the session summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting SpinBridge v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
    .context("failed to load configuration")?;
    if let Some(device) = &cli.device {
        config.sensors.device_id = Some(device.clone());
    }

    let (bridge, events) = TrainerBridge::new(config.sensors.clone(), config.simulator.clone());
    let session = spawn_session(events);

    let kind = if cli.simulate {
        TrainerKind::Simulated
    } else {
        TrainerKind::Ble
    };
    bridge
        .connect(kind)
        .await
        .with_context(|| format!("failed to connect {}", kind))?;

    let mut debouncer = ControlDebouncer::new(bridge.clone(), config.recording.control_debounce());
    if let Some(watts) = cli.target_power {
        debouncer.set_target_power(watts);
    }
    if let Some(level) = cli.resistance {
        debouncer.set_resistance(level);
    }

    let mut progress = session.subscribe();
    let progress_task = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let snapshot = progress.borrow_and_update().clone();
            tracing::debug!(
                status = %snapshot.status,
                points = snapshot.point_count,
                "Session {}",
                format_duration(snapshot.duration_ms, DurationFormat::Auto)
            );
        }
    });

    session.start().await?;
    wait_for_end(cli.seconds).await?;
    session.stop().await?;

    debouncer.flush().await;
    if let Err(e) = bridge.disconnect().await {
        tracing::warn!("Disconnect failed: {}", e);
    }

    let recorded = session.finish().await?;
    progress_task.abort();

    let existing = match &cli.merge {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) => {
                tracing::warn!("Cannot read {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let outcome = merge_or_generate(
        existing.as_deref(),
        &recorded.points,
        &config.recording.merge_options(),
    )?;
    if let TcxOutcome::Generated {
        merge_error: Some(e),
        ..
    } = &outcome
    {
        tracing::warn!("Wrote a new activity because merging failed: {}", e);
    }

    let dir = cli
        .output
        .or_else(|| config.recording.output_dir.clone())
        .unwrap_or_else(|| config.data_dir.join("activities"));
    let path = dir.join(generate_tcx_filename(
        outcome.file_prefix(),
        chrono::Utc::now(),
    ));
    export_tcx_to_file(outcome.document(), &path)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&recorded.summary)?);
    } else {
        print_summary(&recorded.summary);
    }
    println!("Saved {}", path.display());

    Ok(())
}

async fn wait_for_end(seconds: Option<u64>) -> anyhow::Result<()> {
    match seconds {
        Some(seconds) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => {
            tracing::info!("Recording, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }
    Ok(())
}

fn print_summary(summary: &SessionSummary) {
    println!(
        "Duration: {}",
        format_duration(summary.duration_ms, DurationFormat::Auto)
    );
    println!("Points:   {}", summary.point_count);
    if let (Some(avg), Some(max)) = (summary.avg_power, summary.max_power) {
        println!("Power:    avg {} W, max {} W", avg, max);
    }
    if let (Some(avg), Some(max)) = (summary.avg_speed, summary.max_speed) {
        println!("Speed:    avg {:.1} km/h, max {:.1} km/h", avg, max);
    }
    if let Some(hr) = summary.avg_heart_rate {
        println!("HR:       avg {} bpm", hr);
    }
}
