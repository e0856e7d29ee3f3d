//! Sequential replay strategy
//!
//! This module provides a single-threaded implementation of the
//! ProcessingStrategy trait. Events are streamed from the `SyncReader` and
//! applied one at a time, in file order, on a current-thread runtime.
//!
//! # Design
//!
//! The SequentialStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Ride lifecycle rules to `RideEngine` through a `TripRunner`
//! - CSV output to `csv_format::write_rides_csv`
//!
//! Because every event is applied in order, the output is deterministic and
//! serves as the reference the concurrent strategy is compared against.

use crate::io::csv_format::write_rides_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{ProcessingStrategy, SimulationSetup, TripRunner};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Sequential replay strategy
///
/// # Examples
///
/// ```no_run
/// use bikeshare_engine::strategy::{ProcessingStrategy, SequentialStrategy, SimulationSetup};
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SequentialStrategy::new(SimulationSetup::default());
/// let mut output = io::stdout();
///
/// strategy.process(Path::new("script.csv"), &mut output)
///     .expect("Replay failed");
/// ```
#[derive(Debug, Clone)]
pub struct SequentialStrategy {
    setup: SimulationSetup,
}

impl SequentialStrategy {
    pub fn new(setup: SimulationSetup) -> Self {
        Self { setup }
    }
}

impl ProcessingStrategy for SequentialStrategy {
    fn process(&self, script_path: &Path, output: &mut dyn Write) -> Result<(), String> {
        let engine = self.setup.build_engine().map_err(|e| e.to_string())?;
        let runner = TripRunner::new(engine);

        let reader = SyncReader::new(script_path)?;

        // The engine spawns its unlock and lock effects, so it needs a runtime
        // even when replaying on one thread
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let mut applied = 0usize;
        let mut rejected = 0usize;
        runtime.block_on(async {
            for result in reader {
                match result {
                    Ok(event) => {
                        if runner.apply_logged(event).await.result.is_ok() {
                            applied += 1;
                        } else {
                            rejected += 1;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping script row");
                        rejected += 1;
                    }
                }
            }
        });
        info!(applied, rejected, "sequential replay finished");

        write_rides_csv(&runner.rows(), output)?;

        Ok(())
    }
}
