//! Replay strategy module
//!
//! This module defines the Strategy pattern for complete simulation
//! pipelines: building the engine from the fleet and zone catalogue, reading
//! the ride script, replaying it and writing the ride table. Different replay
//! implementations (sequential, concurrent batch) can be selected at runtime.

use crate::cli::StrategyType;
use crate::core::{EngineConfig, RideEngine};
use crate::types::{Bike, EngineError, Zone};
use std::io::Write;
use std::path::Path;

pub mod concurrent;
pub mod runner;
pub mod sequential;

pub use concurrent::{ConcurrencyConfig, ConcurrentStrategy};
pub use runner::{EventResult, TripRunner};
pub use sequential::SequentialStrategy;

/// Everything needed to build a fresh engine for one replay
#[derive(Debug, Clone, Default)]
pub struct SimulationSetup {
    pub config: EngineConfig,
    pub fleet: Vec<Bike>,
    pub zones: Vec<Zone>,
}

impl SimulationSetup {
    pub fn new(config: EngineConfig, fleet: Vec<Bike>, zones: Vec<Zone>) -> Self {
        Self { config, fleet, zones }
    }

    /// Build an engine and register the whole fleet
    ///
    /// # Errors
    ///
    /// * `InvalidConfig` - the geofence buffer is unusable
    /// * `DuplicateBike` - two fleet rows share an id or scan code
    pub fn build_engine(&self) -> Result<RideEngine, EngineError> {
        let engine = RideEngine::new(self.config.clone(), self.zones.clone())?;
        for bike in &self.fleet {
            engine.registry().register(bike.clone())?;
        }
        Ok(engine)
    }
}

/// Replay strategy trait for complete simulation pipelines
pub trait ProcessingStrategy: Send + Sync {
    /// Replay the ride script at `script_path` and write the ride table
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The engine cannot be built from the setup
    /// - The script cannot be opened
    /// - Output cannot be written
    ///
    /// Rejected script events are logged and skipped; they never abort the
    /// replay.
    fn process(&self, script_path: &Path, output: &mut dyn Write) -> Result<(), String>;
}

/// Create a replay strategy based on the specified strategy type
///
/// `config` only applies to the concurrent strategy.
pub fn create_strategy(
    strategy_type: StrategyType,
    setup: SimulationSetup,
    config: Option<ConcurrencyConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sequential => Box::new(SequentialStrategy::new(setup)),
        StrategyType::Concurrent => {
            let config = config.unwrap_or_default();
            Box::new(ConcurrentStrategy::new(setup, config))
        }
    }
}
