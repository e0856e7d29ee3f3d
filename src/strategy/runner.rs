//! Script replay with trip-based partitioning
//!
//! This module provides the `TripRunner`, which applies script events to a
//! `RideEngine` and remembers which ride each trip label produced.
//!
//! # Design
//!
//! Events for one trip must be applied in file order (unlock before
//! telemetry before lock), but different trips are independent. The runner
//! therefore partitions a batch by trip label and replays each trip's
//! events sequentially on its own task, while trips run concurrently.
//!
//! # Architecture
//!
//! ```text
//! TripRunner (Clone)
//!     ├── RideEngine                      (shared engine)
//!     └── Arc<DashMap<trip, RideId>>      (trip label → ride)
//! ```

use crate::core::{PaymentNotice, RideEngine};
use crate::io::TripRow;
use crate::types::{EngineError, RideId, ScriptAction, ScriptEvent};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of replaying one script event
#[derive(Debug, Clone)]
pub struct EventResult {
    pub event: ScriptEvent,
    pub result: Result<(), EngineError>,
}

/// Replays script events against an engine
#[derive(Debug, Clone)]
pub struct TripRunner {
    engine: RideEngine,
    trips: Arc<DashMap<String, RideId>>,
}

impl TripRunner {
    pub fn new(engine: RideEngine) -> Self {
        Self {
            engine,
            trips: Arc::new(DashMap::new()),
        }
    }

    pub fn engine(&self) -> &RideEngine {
        &self.engine
    }

    fn ride_for(&self, trip: &str) -> Result<RideId, EngineError> {
        self.trips
            .get(trip)
            .map(|entry| *entry.value())
            .ok_or_else(|| EngineError::unknown_trip(trip))
    }

    /// Apply one event
    ///
    /// Failures are returned to the caller; they never abort the replay.
    pub async fn apply(&self, event: &ScriptEvent) -> Result<(), EngineError> {
        let trip = event.trip.as_str();
        match &event.action {
            ScriptAction::Unlock {
                key,
                rider,
                qr_public_id,
            } => {
                let receipt = self.engine.unlock(qr_public_id, *rider, key).await?;
                self.trips.insert(event.trip.clone(), receipt.ride.id);
            }
            ScriptAction::Telemetry(sample) => {
                let ride = self.ride_for(trip)?;
                self.engine.append_telemetry(ride, *sample).await?;
            }
            ScriptAction::Lock { key, position } => {
                let ride = self.ride_for(trip)?;
                self.engine.lock(ride, *position, key).await?;
            }
            ScriptAction::Capture => {
                let ride = self.ride_for(trip)?;
                self.engine.apply_payment_notice(ride, PaymentNotice::Captured).await?;
            }
            ScriptAction::Refund => {
                let ride = self.ride_for(trip)?;
                self.engine.apply_payment_notice(ride, PaymentNotice::Refunded).await?;
            }
        }
        Ok(())
    }

    /// Apply an event and log a rejection instead of returning it
    pub async fn apply_logged(&self, event: ScriptEvent) -> EventResult {
        let result = self.apply(&event).await;
        match &result {
            Ok(()) => debug!(trip = %event.trip, op = event.action.name(), "event applied"),
            Err(e) => warn!(
                trip = %event.trip,
                op = event.action.name(),
                kind = e.kind(),
                error = %e,
                "event rejected"
            ),
        }
        EventResult { event, result }
    }

    /// Split a batch into per-trip event lists, each in original order
    pub fn partition_by_trip(&self, batch: Vec<ScriptEvent>) -> HashMap<String, Vec<ScriptEvent>> {
        let mut trip_batches: HashMap<String, Vec<ScriptEvent>> = HashMap::new();

        for event in batch {
            trip_batches.entry(event.trip.clone()).or_default().push(event);
        }

        trip_batches
    }

    /// Replay one trip's events sequentially
    pub async fn process_trip_events(&self, events: Vec<ScriptEvent>) -> Vec<EventResult> {
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.apply_logged(event).await);
        }
        results
    }

    /// Replay a batch with one task per trip
    ///
    /// Results may come back in a different order than the input.
    pub async fn process_batch(&self, batch: Vec<ScriptEvent>) -> Vec<EventResult> {
        let trip_batches = self.partition_by_trip(batch);

        let mut tasks = Vec::new();
        for (_trip, events) in trip_batches {
            let runner = self.clone();
            tasks.push(tokio::spawn(async move { runner.process_trip_events(events).await }));
        }

        let mut results = Vec::new();
        for task in tasks {
            match task.await {
                Ok(trip_results) => results.extend(trip_results),
                Err(e) => warn!(error = %e, "trip task failed"),
            }
        }

        results
    }

    /// The ride table: one row per trip that started a ride
    pub fn rows(&self) -> Vec<TripRow> {
        self.trips
            .iter()
            .filter_map(|entry| {
                let ride = self.engine.ride(*entry.value()).ok()?;
                Some(TripRow {
                    trip: entry.key().clone(),
                    ride,
                })
            })
            .collect()
    }
}
