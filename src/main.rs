// Headless front end: spawns the engine thread, touches the requested
// cells, and lets the patch play itself for the requested duration.
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cellarium::cli::{Args, parse_cells};
use cellarium::config::AppConfig;
use cellarium::engine::Command;
use cellarium::engine::runner;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = AppConfig::load_or_default(&args.config);

    let snapshot_period = if args.snapshots {
        args.snapshot_period.max(0.1)
    } else {
        0.0
    };
    let handle = runner::spawn(config, args.seed, snapshot_period);

    for index in parse_cells(&args.cells) {
        handle.send(Command::Touch(index));
    }

    let deadline = Instant::now() + Duration::from_secs_f64(args.duration.max(0.0));
    while Instant::now() < deadline {
        match handle
            .snapshots()
            .recv_timeout(Duration::from_millis(200))
        {
            Ok(snapshot) => {
                if let Ok(line) = serde_json::to_string(&snapshot) {
                    println!("{line}");
                }
            }
            Err(_) => {}
        }
    }

    info!("run complete");
    handle.shutdown();
}
