//! Net Adapter Demo
//!
//! Runs the adapter against the in-process loopback master and plays the
//! part of the local audio callback: whatever the master sends on capture is
//! queued straight back on playback.
//!
//! Usage: `netadapter [--config PATH] [--sample-rate HZ] [--period FRAMES]
//! [--drift-ppm PPM] [--miss-every N] [name=value ...]`

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use net_audio_adapter::{
    config::{configure, AdapterOptions, DriverParam},
    constants::{DEFAULT_PERIOD_SIZE, DEFAULT_SAMPLE_RATE},
    network::{LoopbackConfig, LoopbackTransport},
    NetAdapter,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

struct Args {
    config_path: Option<PathBuf>,
    sample_rate: u32,
    period: u32,
    loopback: LoopbackConfig,
    params: Vec<DriverParam>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config_path: None,
        sample_rate: DEFAULT_SAMPLE_RATE,
        period: DEFAULT_PERIOD_SIZE,
        loopback: LoopbackConfig::default(),
        params: Vec::new(),
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| iter.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--config" => args.config_path = Some(PathBuf::from(value("--config")?)),
            "--sample-rate" => args.sample_rate = value("--sample-rate")?.parse()?,
            "--period" => args.period = value("--period")?.parse()?,
            "--drift-ppm" => args.loopback.drift_ppm = value("--drift-ppm")?.parse()?,
            "--miss-every" => args.loopback.miss_every = Some(value("--miss-every")?.parse()?),
            "-h" | "--help" => bail!(
                "usage: netadapter [--config PATH] [--sample-rate HZ] [--period FRAMES] \
                 [--drift-ppm PPM] [--miss-every N] [name=value ...]"
            ),
            other => args.params.push(other.parse()?),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting net adapter demo");

    let args = parse_args()?;

    // File options first, command line overrides them
    let config_path = args
        .config_path
        .clone()
        .or_else(|| AdapterOptions::default_path().filter(|path| path.exists()));
    let mut params = match &config_path {
        Some(path) => {
            tracing::info!("Loading options from {}", path.display());
            AdapterOptions::load(path)
                .with_context(|| format!("reading {}", path.display()))?
                .to_params()
        }
        None => Vec::new(),
    };
    params.extend(args.params.iter().cloned());

    let configured = configure(args.sample_rate, args.period, &params)?;
    if !configured.warnings.is_empty() {
        tracing::warn!("{} option(s) fell back to defaults", configured.warnings.len());
    }

    let transport = LoopbackTransport::new(args.loopback.clone());
    let master = transport.stats();
    let mut adapter = NetAdapter::new(configured.config, transport);
    let period = period_duration(args.sample_rate, args.period)?;

    adapter.open()?;
    let mut ports = adapter
        .host_ports()
        .context("net adapter opened without host ports")?;
    let mut frame = vec![0.0f32; args.period as usize];
    let mut tick = tokio::time::interval(period);
    let mut report = tokio::time::interval(STATS_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    tracing::info!("Running - press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down");
                break;
            }
            _ = tick.tick() => {
                let playback = ports.playback_channels();
                for channel in 0..ports.capture_channels() {
                    ports.read_capture(channel, &mut frame)?;
                    if channel < playback {
                        ports.write_playback(channel, &frame)?;
                    }
                }
            }
            _ = report.tick() => {
                if !adapter.is_running() {
                    tracing::error!("Net adapter loop stopped");
                    break;
                }
                let stats = adapter.stats();
                tracing::info!(
                    "Stats: {} cycles, {} skipped, {} ring resets, master got {} frames (peak {:.2})",
                    stats.cycles_completed,
                    stats.cycles_skipped,
                    stats.ring_resets,
                    master.frames_returned(),
                    master.peak()
                );
            }
        }
    }

    adapter.close()?;
    Ok(())
}

/// Host callback interval for one period. Never zero, which `interval` rejects.
fn period_duration(sample_rate: u32, period: u32) -> Result<Duration> {
    let period_ns = period as u64 * 1_000_000_000 / sample_rate.max(1) as u64;
    if period_ns == 0 {
        bail!(
            "period of {} frames at {} Hz is shorter than a nanosecond",
            period,
            sample_rate
        );
    }
    Ok(Duration::from_nanos(period_ns))
}
