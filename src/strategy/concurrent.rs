//! Concurrent batch replay strategy
//!
//! This module provides a multi-threaded implementation of the
//! ProcessingStrategy trait. The script is read in batches; within a batch,
//! events are partitioned by trip and every trip replays on its own task.
//!
//! # Architecture
//!
//! ```text
//! ConcurrentStrategy
//!     ├── ConcurrencyConfig (batch_size, workers)
//!     ├── AsyncReader (batch CSV reading)
//!     └── TripRunner (trip partitioning + task spawning)
//!         └── RideEngine (per-bike and per-ride exclusion)
//! ```
//!
//! # Ordering
//!
//! - Batches are processed one after another, so a trip whose events span
//!   several batches still sees them in file order
//! - Trips inside a batch race each other; contention for the same bike or
//!   rider is settled by the engine, exactly one contender winning
//!
//! Trips that do not compete for a bike or rider end up in the same state as
//! under the sequential strategy.

use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::write_rides_csv;
use crate::strategy::{ProcessingStrategy, SimulationSetup, TripRunner};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Configuration for batch replay
#[derive(Clone, Debug)]
pub struct ConcurrencyConfig {
    /// Number of script events per batch
    pub batch_size: usize,
    /// Number of runtime worker threads
    pub workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            workers: num_cpus::get(),
        }
    }
}

impl ConcurrencyConfig {
    /// Create a new ConcurrencyConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, workers: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(batch_size, default = default.batch_size, "invalid batch size, using default");
            default.batch_size
        } else {
            batch_size
        };

        let workers = if workers == 0 {
            warn!(workers, default = default.workers, "invalid worker count, using default");
            default.workers
        } else {
            workers
        };

        Self { batch_size, workers }
    }
}

/// Concurrent batch replay strategy
#[derive(Debug, Clone)]
pub struct ConcurrentStrategy {
    setup: SimulationSetup,
    config: ConcurrencyConfig,
}

impl ConcurrentStrategy {
    pub fn new(setup: SimulationSetup, config: ConcurrencyConfig) -> Self {
        Self { setup, config }
    }
}

impl ProcessingStrategy for ConcurrentStrategy {
    fn process(&self, script_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let engine = self.setup.build_engine().map_err(|e| e.to_string())?;
        let runner = TripRunner::new(engine);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.workers)
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        runtime.block_on(async {
            let file = tokio::fs::File::open(script_path)
                .await
                .map_err(|e| format!("Failed to open file '{}': {}", script_path.display(), e))?;

            // csv-async reads through the futures I/O traits
            let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
            let mut reader = AsyncReader::new(compat_file);

            let mut batches = 0usize;
            let mut applied = 0usize;
            let mut rejected = 0usize;
            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                // Finish this batch before reading the next one
                let results = runner.process_batch(batch).await;
                batches += 1;
                for result in &results {
                    if result.result.is_ok() {
                        applied += 1;
                    } else {
                        rejected += 1;
                    }
                }
            }
            info!(batches, applied, rejected, "concurrent replay finished");

            write_rides_csv(&runner.rows(), output)?;

            Ok(())
        })
    }
}
