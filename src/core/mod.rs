//! Core business logic module
//!
//! This module contains the ride lifecycle components:
//! - `geo` - Geometry helpers on the `geo` crate (haversine, containment, nearest boundary point)
//! - `exclusion` - Per-key async mutual exclusion and conflict retry
//! - `idempotency` - Keyed outcome ledger for retried mutations
//! - `metrics` - Trip metrics accumulation and energy model
//! - `geofence` - Lock-point validation against the zone catalogue
//! - `bike_registry` - Bike records and the lock-state machine
//! - `ride_store` - Ride arena with active-ride indexes
//! - `ride_engine` - Orchestration of unlock, telemetry, lock and payment notices
//! - `config` - Engine tunables
//! - `traits` - Clock and notification seams

pub mod bike_registry;
pub mod config;
pub mod exclusion;
pub mod geo;
pub mod geofence;
pub mod idempotency;
pub mod metrics;
pub mod ride_engine;
pub mod ride_store;
pub mod traits;

pub use bike_registry::BikeRegistry;
pub use config::EngineConfig;
pub use exclusion::{retry_once, ExclusionGuard, ExclusionTable};
pub use geofence::{DenialReason, GeofenceDecision, GeofenceValidator, ParkingStatus};
pub use idempotency::{Fingerprint, IdempotencyRecord, IdempotencyStore};
pub use metrics::{EnergyModel, MetricsAccumulator};
pub use ride_engine::{LockReceipt, PaymentNotice, RideEngine, TelemetryReceipt, UnlockReceipt};
pub use ride_store::RideStore;
pub use traits::{ChannelSink, Clock, ManualClock, NullSink, RideEndedNotice, RideEventSink, SystemClock};
