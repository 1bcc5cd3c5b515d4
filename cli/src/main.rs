//! linkwatch - connection monitoring CLI
//!
//! Runs the monitoring engine against a target host until interrupted (or a
//! --duration elapses), then persists the finalized session as JSON and
//! prints a summary.

mod config;
mod store;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use linkwatch_engine::{
    HttpSpeedTester, IcmpPinger, MonitorEvent, MonitoringService, SessionSnapshot,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "linkwatch")]
#[command(version = "0.1.0")]
#[command(about = "Connection monitoring - latency, throughput and outage tracking", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "linkwatch.toml")]
    config: PathBuf,

    /// Override the target host from the config file
    #[arg(short, long)]
    target: Option<String>,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// List stored sessions instead of monitoring
    #[arg(long)]
    list: bool,

    /// Note to attach to the saved session
    #[arg(long)]
    notes: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load(&args.config)?;
    if let Some(target) = &args.target {
        config.monitor.target_host = target.clone();
    }

    // RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            std::env::var("RUST_LOG").ok().as_deref(),
            &config.logging.level,
        ))
        .init();

    let store = store::SessionStore::new(config.storage.sessions_dir.clone());

    if args.list {
        run_list(&store)
    } else {
        run_monitoring(&config, &store, &args).await
    }
}

async fn run_monitoring(
    config: &config::Config,
    store: &store::SessionStore,
    args: &Args,
) -> Result<()> {
    info!(
        "Monitoring {} (ping every {}s, speed tests {})",
        config.monitor.target_host,
        config.monitor.ping_interval_s,
        if config.monitor.speed_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    let pinger = Arc::new(IcmpPinger::new().context("ICMP probe unavailable")?);
    // Bound each transfer by its own cadence so a stalled test cannot
    // overlap the next tick.
    let mut speed_tester = HttpSpeedTester::new(config.monitor.speed_interval())?;
    if config.monitor.speed_test_duration_s > 0.0 {
        speed_tester = speed_tester
            .with_transfer_duration(Duration::from_secs_f64(config.monitor.speed_test_duration_s));
    }
    let service = MonitoringService::new(pinger, Arc::new(speed_tester));

    let mut events = service.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let session_id = service.start(config.monitor.clone())?;
    info!("Session {session_id} started (Press Ctrl+C to stop)");

    match args.duration {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("Run duration elapsed"),
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            info!("Interrupted");
        }
    }

    let snapshot = service.stop().await?;
    printer.abort();

    let path = store.save(&snapshot, args.notes.clone())?;
    println!("{}", summary_text(&snapshot));
    info!("Session saved to {path:?}");

    Ok(())
}

fn log_filter(
    env_directives: Option<&str>,
    configured: &str,
) -> tracing_subscriber::EnvFilter {
    let directives = env_directives.unwrap_or(configured);
    tracing_subscriber::EnvFilter::try_new(directives)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn run_list(store: &store::SessionStore) -> Result<()> {
    let records = store.list()?;
    if records.is_empty() {
        println!("No stored sessions.");
        return Ok(());
    }
    for record in records {
        let ended = record
            .ended_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "open".to_string());
        println!(
            "{}  {} -> {}  target={}  samples={}  outages={}",
            record.id,
            record.started_at.to_rfc3339(),
            ended,
            record.target_host,
            record.samples.len(),
            record.interruptions,
        );
    }
    Ok(())
}

fn print_event(event: &MonitorEvent) {
    let clock = Local::now().format("%H:%M:%S");
    match event {
        MonitorEvent::PingRecorded(sample) => match sample.latency_ms {
            Some(latency) => println!("[{clock}] ping -> {latency:.2}ms"),
            None => println!("[{clock}] ping -> LOST"),
        },
        MonitorEvent::SpeedRecorded(sample) => match sample.throughput_mbps {
            Some(mbps) => println!("[{clock}] {:?} -> {mbps:.2} Mbps", sample.direction),
            None => println!("[{clock}] {:?} -> FAILED", sample.direction),
        },
        MonitorEvent::OutageStarted(interval) => {
            println!(
                "[{clock}] OUTAGE after {} consecutive failures",
                interval.failure_count
            );
        }
        MonitorEvent::OutageEnded(interval) => {
            println!(
                "[{clock}] outage over ({:.1}s)",
                interval.duration_s().unwrap_or(0.0)
            );
        }
        MonitorEvent::SessionStarted { .. } | MonitorEvent::SessionEnded { .. } => {}
    }
}

fn summary_text(snapshot: &SessionSnapshot) -> String {
    let uptime_pct = snapshot.uptime_ratio() * 100.0;
    let latency = match snapshot.latency_stats() {
        Some(stats) => format!(
            "avg {:.2}, min {:.2}, max {:.2}",
            stats.avg_ms, stats.min_ms, stats.max_ms
        ),
        None => "no successful pings".to_string(),
    };
    let ended = snapshot
        .ended_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "open".to_string());

    [
        format!("Session {}", snapshot.session_id),
        format!("Target: {}", snapshot.target_host),
        format!("Start: {}", snapshot.started_at.to_rfc3339()),
        format!("End: {ended}"),
        format!("Duration: {:.2}s", snapshot.duration_s()),
        format!(
            "Uptime: {uptime_pct:.2}% ({}/{} successful pings)",
            snapshot.successful_pings(),
            snapshot.ping_samples.len()
        ),
        format!(
            "Downtime events: {} (total {:.2}s)",
            snapshot.interruption_count(),
            snapshot.total_downtime_s()
        ),
        format!("Ping latency (ms): {latency}"),
        format!("Speed samples: {}", snapshot.speed_samples.len()),
    ]
    .join("\n")
}
