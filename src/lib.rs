//! Bike-share Ride Engine Library
//! # Overview
//!
//! This library implements the ride and bike lifecycle of a dockless
//! bike-share service: unlocking a bike with a scan code, accumulating trip
//! telemetry, validating the parking spot against a zone catalogue and
//! ending the ride with a fare quote. Mutations are safe under concurrent,
//! retried requests.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (Bike, Ride, Zone, FarePlan, EngineError, ...)
//! - [`cli`] - CLI arguments parsing
//! - [`core`] - Business logic components:
//!   - [`core::ride_engine`] - Unlock, telemetry, lock and payment orchestration
//!   - [`core::bike_registry`] - Bike records and lock-state transitions
//!   - [`core::ride_store`] - Ride records and active-ride indexes
//!   - [`core::geofence`] - Parking validation with boundary buffer
//!   - [`core::metrics`] - Distance, duration, energy and fare accumulation
//!   - [`core::idempotency`] - Keyed replay of completed mutations
//! - [`io`] - Fleet, zone and script loading, ride table output
//! - [`strategy`] - Sequential and concurrent script replay
//!
//! # Ride Lifecycle
//!
//! - **Active**: started by a successful unlock; accepts telemetry
//! - **Ended**: the bike was locked inside legal parking; metrics are final
//! - **Billed**: the payment service captured the fare
//! - **Refunded**: the payment service refunded a captured fare
//!
//! # Bike States
//!
//! Each bike carries:
//! - `status`: `ok` or `maintenance`; only bikes in service can be unlocked
//! - `lock_state`: `locked` or `unlocked`
//! - `battery_pct`, `position` and a `version` used for conflict detection

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod strategy;
pub mod types;

pub use core::{EngineConfig, RideEngine};
pub use io::write_rides_csv;
pub use types::{
    Bike, BikeId, BikeStatus, EngineError, GeoPoint, Ride, RideId, RideState, RiderId,
    TelemetrySample, Zone, ZoneKind,
};
