//! Bike-share Simulation CLI
//!
//! Replays a ride script against the ride engine and prints the resulting
//! ride table.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --bikes fleet.csv --zones zones.json script.csv > rides.csv
//! cargo run -- --strategy sequential --bikes fleet.csv --zones zones.json script.csv
//! cargo run -- --strategy concurrent --workers 8 --batch-size 500 --bikes fleet.csv --zones zones.json script.csv
//! RUST_LOG=bikeshare_engine=debug cargo run -- --bikes fleet.csv --zones zones.json script.csv
//! ```
//!
//! Logs go to stderr; stdout carries only the CSV ride table.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (unreadable fleet or zone file, missing script, etc.)

use bikeshare_engine::cli;
use bikeshare_engine::io::{load_zones, read_fleet};
use bikeshare_engine::strategy::{self, SimulationSetup};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let fleet = match read_fleet(&args.bikes_file) {
        Ok(fleet) => fleet,
        Err(e) => {
            error!(error = %e, "failed to load fleet");
            process::exit(1);
        }
    };
    let zones = match load_zones(&args.zones_file) {
        Ok(zones) => zones,
        Err(e) => {
            error!(error = %e, "failed to load zones");
            process::exit(1);
        }
    };
    info!(bikes = fleet.len(), zones = zones.len(), "simulation inputs loaded");

    let setup = SimulationSetup::new(args.to_engine_config(), fleet, zones);
    let strategy = {
        let config = if args.strategy == cli::StrategyType::Concurrent {
            Some(args.to_concurrency_config())
        } else {
            None
        };
        strategy::create_strategy(args.strategy.clone(), setup, config)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.script_file, &mut output) {
        error!(error = %e, "replay failed");
        process::exit(1);
    }
}
