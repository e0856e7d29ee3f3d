use crate::core::{EnergyModel, EngineConfig};
use crate::strategy::ConcurrencyConfig;
use crate::types::FarePlan;
use clap::{Parser, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay a ride script against the bike-share engine
#[derive(Parser, Debug)]
#[command(name = "bikeshare-sim")]
#[command(about = "Replay a ride script against the bike-share engine", long_about = None)]
pub struct CliArgs {
    /// Ride script CSV
    #[arg(value_name = "SCRIPT", help = "Path to the ride script CSV file")]
    pub script_file: PathBuf,

    /// Fleet seed CSV
    #[arg(long = "bikes", value_name = "FILE", help = "Path to the fleet seed CSV file")]
    pub bikes_file: PathBuf,

    /// Zone catalogue JSON
    #[arg(long = "zones", value_name = "FILE", help = "Path to the zone catalogue JSON file")]
    pub zones_file: PathBuf,

    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "concurrent",
        help = "Replay strategy: 'sequential' or 'concurrent'"
    )]
    pub strategy: StrategyType,

    /// Number of script events per batch (concurrent mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of script events per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Number of runtime worker threads (concurrent mode only)
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Number of worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    #[arg(long = "geofence-buffer-m", value_name = "METERS", default_value_t = 5.0)]
    pub geofence_buffer_m: f64,

    #[arg(long = "base-cents", value_name = "CENTS", default_value = "100")]
    pub base_cents: Decimal,

    #[arg(long = "per-minute-cents", value_name = "CENTS", default_value = "20")]
    pub per_minute_cents: Decimal,

    #[arg(long = "per-km-cents", value_name = "CENTS", default_value = "60")]
    pub per_km_cents: Decimal,

    #[arg(long = "body-mass-kg", value_name = "KG", default_value_t = 70.0)]
    pub body_mass_kg: f64,

    #[arg(long = "met", value_name = "MET", default_value_t = 8.0)]
    pub met: f64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long = "log-level", value_name = "FILTER", default_value = "info")]
    pub log_level: String,
}

/// Available replay strategies
#[derive(Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sequential,
    Concurrent,
}

impl CliArgs {
    /// Build the engine configuration from CLI arguments
    ///
    /// Out-of-range values fall back to defaults with a warning.
    pub fn to_engine_config(&self) -> EngineConfig {
        let plan = FarePlan {
            base_cents: self.base_cents,
            per_minute_cents: self.per_minute_cents,
            per_km_cents: self.per_km_cents,
            ..FarePlan::default()
        };
        let energy = EnergyModel {
            met: self.met,
            body_mass_kg: self.body_mass_kg,
        };
        EngineConfig::new(self.geofence_buffer_m, energy, plan)
    }

    /// Create a ConcurrencyConfig from CLI arguments
    pub fn to_concurrency_config(&self) -> ConcurrencyConfig {
        if self.batch_size.is_some() || self.workers.is_some() {
            let default = ConcurrencyConfig::default();
            ConcurrencyConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.workers.unwrap_or(default.workers),
            )
        } else {
            ConcurrencyConfig::default()
        }
    }
}
