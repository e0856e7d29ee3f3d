//! Ride-related types
//!
//! A ride moves through `Active -> Ended -> {Billed, Refunded}`. Only an
//! active ride accepts telemetry; its metrics are frozen once it ends. The
//! billed and refunded states are reached through payment notices sent by the
//! external payment service.

use super::bike::BikeId;
use super::error::EngineError;
use super::telemetry::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ride identifier
pub type RideId = u64;

/// Rider identifier
pub type RiderId = u32;

/// Lifecycle state of a ride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideState {
    Active,
    Ended,
    Billed,
    Refunded,
}

impl RideState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideState::Active => "active",
            RideState::Ended => "ended",
            RideState::Billed => "billed",
            RideState::Refunded => "refunded",
        }
    }
}

/// Events that drive the ride state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideEvent {
    /// Bike locked inside a legal zone
    Lock,

    /// Payment captured by the payment service
    Capture,

    /// Payment refunded or voided by the payment service
    Refund,
}

impl RideEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideEvent::Lock => "lock",
            RideEvent::Capture => "capture",
            RideEvent::Refund => "refund",
        }
    }
}

impl RideState {
    /// Apply an event to a ride state
    ///
    /// Locking a ride that is no longer active reports `RideNotActive`; any
    /// other invalid pair is an `IllegalTransition`.
    pub fn apply(self, ride: RideId, event: RideEvent) -> Result<RideState, EngineError> {
        match (self, event) {
            (RideState::Active, RideEvent::Lock) => Ok(RideState::Ended),
            (RideState::Ended, RideEvent::Capture) => Ok(RideState::Billed),
            (RideState::Ended | RideState::Billed, RideEvent::Refund) => Ok(RideState::Refunded),
            (state, RideEvent::Lock) => Err(EngineError::ride_not_active(ride, state)),
            (state, event) => Err(EngineError::illegal_transition(
                "ride",
                ride,
                state.as_str(),
                event.as_str(),
            )),
        }
    }
}

/// Accumulated trip metrics
///
/// While the ride is active these are running totals; once the ride ends they
/// are frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideMetrics {
    /// Great-circle distance travelled, in meters
    pub meters: f64,

    /// Elapsed time between the first and last accepted samples, in seconds
    pub seconds: f64,

    /// Estimated energy expenditure
    pub energy_kcal: f64,

    /// Mean speed over the trip (meters / seconds), zero before any time elapsed
    pub avg_speed_mps: f64,

    /// Highest reported instantaneous speed
    pub max_speed_mps: f64,

    /// Base fare in cents before any external surge multiplier
    pub fare_cents: i64,

    /// Fare plan version the ride was priced with
    pub pricing_version: u32,
}

impl RideMetrics {
    /// Zeroed metrics for a freshly unlocked ride
    pub fn zeroed(pricing_version: u32, base_fare_cents: i64) -> Self {
        RideMetrics {
            meters: 0.0,
            seconds: 0.0,
            energy_kcal: 0.0,
            avg_speed_mps: 0.0,
            max_speed_mps: 0.0,
            fare_cents: base_fare_cents,
            pricing_version,
        }
    }
}

/// A ride record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub rider: RiderId,
    pub bike: BikeId,
    pub state: RideState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub metrics: RideMetrics,

    /// Route trace, in sample order
    pub polyline: Vec<GeoPoint>,

    /// Timestamp of the last accepted telemetry sample
    pub last_sample_ts: Option<f64>,

    /// Optimistic concurrency counter, bumped on every committed write
    pub version: u64,
}

impl Ride {
    /// A freshly unlocked ride at version 0 with zeroed metrics
    pub fn start(
        id: RideId,
        rider: RiderId,
        bike: BikeId,
        started_at: DateTime<Utc>,
        metrics: RideMetrics,
    ) -> Self {
        Ride {
            id,
            rider,
            bike,
            state: RideState::Active,
            started_at,
            ended_at: None,
            metrics,
            polyline: Vec::new(),
            last_sample_ts: None,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == RideState::Active
    }
}
