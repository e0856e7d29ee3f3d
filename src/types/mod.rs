//! Types module
//!
//! Contains core data structures used throughout the engine.
//! This module organizes types into logical submodules:
//! - `bike`: Bike records and the lock-state machine
//! - `ride`: Ride records, metrics and the ride lifecycle
//! - `telemetry`: Coordinates and telemetry samples
//! - `zone`: Geofence zones and polygons
//! - `pricing`: Fare plans, quotes and banker's rounding
//! - `script`: Replayable ride script events
//! - `error`: Error types for the engine

pub mod bike;
pub mod error;
pub mod pricing;
pub mod ride;
pub mod script;
pub mod telemetry;
pub mod zone;

pub use bike::{Bike, BikeEvent, BikeId, BikeStatus, LockState};
pub use error::{EngineError, ErrorOutcome};
pub use pricing::{round_cents, FarePlan, FareQuote, PricingCatalog};
pub use ride::{Ride, RideEvent, RideId, RideMetrics, RideState, RiderId};
pub use script::{ScriptAction, ScriptEvent};
pub use telemetry::{GeoPoint, TelemetrySample};
pub use zone::{Polygon, Zone, ZoneId, ZoneKind};
