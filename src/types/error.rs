//! Error types for the bike-share engine
//!
//! Every failure the engine can report is a variant of [`EngineError`]. All of
//! them are recoverable by the caller; the engine never terminates the process
//! on a domain error.
//!
//! # Error Categories
//!
//! - **Lookup errors**: unknown bike or ride
//! - **State errors**: bike unavailable, ride not active, illegal transitions
//! - **Telemetry errors**: out-of-order or malformed samples
//! - **Geofence errors**: lock point outside legal parking (carries a remediation point)
//! - **Retry errors**: idempotency key reuse, optimistic concurrency conflicts
//! - **Loader errors**: file, I/O and parse failures for the seed and script files

use super::bike::BikeId;
use super::ride::{RideId, RideState, RiderId};
use super::telemetry::GeoPoint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineError {
    /// No bike matches the given scan code or id
    #[error("Bike {reference} not found")]
    BikeNotFound {
        /// Scan code or id that was looked up
        reference: String,
    },

    /// Bike cannot be unlocked (in maintenance or already unlocked)
    #[error("Bike {bike} is not available: {reason}")]
    BikeUnavailable { bike: BikeId, reason: String },

    /// No ride with this id
    #[error("Ride {ride} not found")]
    RideNotFound { ride: RideId },

    /// Ride is not in the active state
    #[error("Ride {ride} is not active (state: {state})")]
    RideNotActive { ride: RideId, state: String },

    /// Script trip label with no ride behind it
    #[error("Trip '{trip}' has no ride; its unlock is missing or failed")]
    UnknownTrip { trip: String },

    /// Rider already has an active ride
    #[error("Rider {rider} already has active ride {ride}")]
    RiderHasActiveRide { rider: RiderId, ride: RideId },

    /// Telemetry timestamp does not advance past the last accepted sample
    #[error("Out-of-order sample: ts {ts} is not after last accepted ts {last_ts}")]
    OutOfOrderSample { ts: f64, last_ts: f64 },

    /// Telemetry sample has values that cannot be accepted
    #[error("Invalid sample: {reason}")]
    InvalidSample { reason: String },

    /// Lock point is not in a legal parking zone
    ///
    /// Carries the nearest legal parking point so the rider can be routed there.
    #[error("Cannot lock ride {ride} here: {reason}{}", nearest_parking.map(|p| format!(" (nearest parking at {:.6}, {:.6})", p.lat, p.lon)).unwrap_or_default())]
    GeofenceViolation {
        ride: RideId,
        reason: String,
        nearest_parking: Option<GeoPoint>,
    },

    /// Idempotency key was reused for a different request
    #[error("Idempotency key '{key}' reused with a different request payload")]
    IdempotencyConflict { key: String },

    /// Optimistic version check failed
    #[error("Concurrent modification of {entity} {id}: expected version {expected}, found {actual}")]
    ConcurrentModification {
        entity: String,
        id: u64,
        expected: u64,
        actual: u64,
    },

    /// State machine rejected an event
    #[error("Illegal transition for {entity} {id}: cannot apply '{event}' in state '{from}'")]
    IllegalTransition {
        entity: String,
        id: u64,
        from: String,
        event: String,
    },

    /// Fleet provisioning reused a bike id or scan code
    #[error("Duplicate bike {reference}")]
    DuplicateBike { reference: String },

    /// Configuration values are unusable
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Background task running an operation failed
    #[error("Task failed: {message}")]
    TaskFailed { message: String },

    /// File not found at the specified path
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    /// I/O error while reading or writing files
    #[error("I/O error: {message}")]
    IoError { message: String },

    /// Seed, catalogue or script parsing error
    #[error("Parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        EngineError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        let line = match error.line() {
            0 => None,
            l => Some(l as u64),
        };

        EngineError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

/// Caller-facing rendering of an error
///
/// `kind` is a stable tag; `detail` is human-readable. Only geofence
/// violations carry a remediation point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorOutcome {
    pub kind: &'static str,
    pub status: u16,
    pub detail: String,
    pub nearest_parking: Option<GeoPoint>,
}

impl EngineError {
    /// Stable snake_case tag for this error
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::BikeNotFound { .. } => "bike_not_found",
            EngineError::BikeUnavailable { .. } => "bike_unavailable",
            EngineError::RideNotFound { .. } => "ride_not_found",
            EngineError::RideNotActive { .. } => "ride_not_active",
            EngineError::UnknownTrip { .. } => "unknown_trip",
            EngineError::RiderHasActiveRide { .. } => "rider_has_active_ride",
            EngineError::OutOfOrderSample { .. } => "out_of_order_sample",
            EngineError::InvalidSample { .. } => "invalid_sample",
            EngineError::GeofenceViolation { .. } => "geofence_violation",
            EngineError::IdempotencyConflict { .. } => "idempotency_conflict",
            EngineError::ConcurrentModification { .. } => "concurrent_modification",
            EngineError::IllegalTransition { .. } => "illegal_transition",
            EngineError::DuplicateBike { .. } => "duplicate_bike",
            EngineError::InvalidConfig { .. } => "invalid_config",
            EngineError::TaskFailed { .. } => "task_failed",
            EngineError::FileNotFound { .. } => "file_not_found",
            EngineError::IoError { .. } => "io_error",
            EngineError::ParseError { .. } => "parse_error",
        }
    }

    /// HTTP-class status for the transport layer
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::BikeNotFound { .. }
            | EngineError::RideNotFound { .. }
            | EngineError::UnknownTrip { .. }
            | EngineError::FileNotFound { .. } => 404,
            EngineError::BikeUnavailable { .. }
            | EngineError::RideNotActive { .. }
            | EngineError::RiderHasActiveRide { .. }
            | EngineError::OutOfOrderSample { .. }
            | EngineError::GeofenceViolation { .. }
            | EngineError::IdempotencyConflict { .. }
            | EngineError::ConcurrentModification { .. }
            | EngineError::IllegalTransition { .. }
            | EngineError::DuplicateBike { .. } => 409,
            EngineError::InvalidSample { .. }
            | EngineError::InvalidConfig { .. }
            | EngineError::ParseError { .. } => 422,
            EngineError::TaskFailed { .. } | EngineError::IoError { .. } => 500,
        }
    }

    /// Whether the outcome is final for an idempotency key
    ///
    /// Transient failures are not recorded, so a retry under the same key
    /// executes again.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            EngineError::ConcurrentModification { .. }
                | EngineError::TaskFailed { .. }
                | EngineError::IoError { .. }
        )
    }

    pub fn to_outcome(&self) -> ErrorOutcome {
        let nearest_parking = match self {
            EngineError::GeofenceViolation {
                nearest_parking, ..
            } => *nearest_parking,
            _ => None,
        };
        ErrorOutcome {
            kind: self.kind(),
            status: self.status_code(),
            detail: self.to_string(),
            nearest_parking,
        }
    }
}

// Helper functions for creating common errors

impl EngineError {
    pub fn bike_not_found(reference: impl ToString) -> Self {
        EngineError::BikeNotFound {
            reference: reference.to_string(),
        }
    }

    pub fn bike_unavailable(bike: BikeId, reason: &str) -> Self {
        EngineError::BikeUnavailable {
            bike,
            reason: reason.to_string(),
        }
    }

    pub fn ride_not_found(ride: RideId) -> Self {
        EngineError::RideNotFound { ride }
    }

    pub fn ride_not_active(ride: RideId, state: RideState) -> Self {
        EngineError::RideNotActive {
            ride,
            state: state.as_str().to_string(),
        }
    }

    pub fn unknown_trip(trip: &str) -> Self {
        EngineError::UnknownTrip {
            trip: trip.to_string(),
        }
    }

    pub fn rider_has_active_ride(rider: RiderId, ride: RideId) -> Self {
        EngineError::RiderHasActiveRide { rider, ride }
    }

    pub fn out_of_order_sample(ts: f64, last_ts: f64) -> Self {
        EngineError::OutOfOrderSample { ts, last_ts }
    }

    pub fn invalid_sample(reason: impl Into<String>) -> Self {
        EngineError::InvalidSample {
            reason: reason.into(),
        }
    }

    pub fn geofence_violation(ride: RideId, reason: &str, nearest_parking: Option<GeoPoint>) -> Self {
        EngineError::GeofenceViolation {
            ride,
            reason: reason.to_string(),
            nearest_parking,
        }
    }

    pub fn idempotency_conflict(key: &str) -> Self {
        EngineError::IdempotencyConflict {
            key: key.to_string(),
        }
    }

    pub fn concurrent_modification(entity: &str, id: u64, expected: u64, actual: u64) -> Self {
        EngineError::ConcurrentModification {
            entity: entity.to_string(),
            id,
            expected,
            actual,
        }
    }

    pub fn illegal_transition(entity: &str, id: u64, from: &str, event: &str) -> Self {
        EngineError::IllegalTransition {
            entity: entity.to_string(),
            id,
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    pub fn duplicate_bike(reference: impl ToString) -> Self {
        EngineError::DuplicateBike {
            reference: reference.to_string(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn task_failed(message: impl ToString) -> Self {
        EngineError::TaskFailed {
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::bike_not_found(
        EngineError::bike_not_found("BK-9"),
        "Bike BK-9 not found"
    )]
    #[case::bike_unavailable(
        EngineError::bike_unavailable(3, "bike is in maintenance"),
        "Bike 3 is not available: bike is in maintenance"
    )]
    #[case::ride_not_active(
        EngineError::ride_not_active(12, RideState::Ended),
        "Ride 12 is not active (state: ended)"
    )]
    #[case::out_of_order(
        EngineError::out_of_order_sample(10.0, 20.0),
        "Out-of-order sample: ts 10 is not after last accepted ts 20"
    )]
    #[case::geofence_without_point(
        EngineError::geofence_violation(4, "outside parking", None),
        "Cannot lock ride 4 here: outside parking"
    )]
    #[case::geofence_with_point(
        EngineError::geofence_violation(4, "inside no-park zone", Some(GeoPoint::new(1.5, 103.25))),
        "Cannot lock ride 4 here: inside no-park zone (nearest parking at 1.500000, 103.250000)"
    )]
    #[case::idempotency_conflict(
        EngineError::idempotency_conflict("k-1"),
        "Idempotency key 'k-1' reused with a different request payload"
    )]
    #[case::concurrent_modification(
        EngineError::concurrent_modification("bike", 5, 2, 3),
        "Concurrent modification of bike 5: expected version 2, found 3"
    )]
    #[case::parse_error_with_line(
        EngineError::ParseError { line: Some(42), message: "bad field".to_string() },
        "Parse error at line 42: bad field"
    )]
    fn test_error_display(#[case] error: EngineError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::not_found(EngineError::ride_not_found(1), "ride_not_found", 404)]
    #[case::unavailable(EngineError::bike_unavailable(1, "x"), "bike_unavailable", 409)]
    #[case::conflict(EngineError::idempotency_conflict("k"), "idempotency_conflict", 409)]
    #[case::invalid_sample(EngineError::invalid_sample("x"), "invalid_sample", 422)]
    #[case::task_failed(EngineError::task_failed("boom"), "task_failed", 500)]
    #[case::unknown_trip(EngineError::unknown_trip("ghost"), "unknown_trip", 404)]
    fn test_kind_and_status(
        #[case] error: EngineError,
        #[case] kind: &str,
        #[case] status: u16,
    ) {
        assert_eq!(error.kind(), kind);
        assert_eq!(error.status_code(), status);
    }

    #[test]
    fn test_outcome_carries_nearest_point_only_for_geofence() {
        let point = GeoPoint::new(1.0, 2.0);
        let outcome = EngineError::geofence_violation(1, "outside parking", Some(point)).to_outcome();
        assert_eq!(outcome.kind, "geofence_violation");
        assert_eq!(outcome.nearest_parking, Some(point));

        let outcome = EngineError::ride_not_found(1).to_outcome();
        assert_eq!(outcome.nearest_parking, None);
        assert_eq!(outcome.detail, "Ride 1 not found");
    }

    #[test]
    fn test_transient_errors_are_not_terminal() {
        assert!(!EngineError::concurrent_modification("ride", 1, 1, 2).is_terminal());
        assert!(!EngineError::task_failed("join").is_terminal());
        assert!(EngineError::bike_unavailable(1, "x").is_terminal());
        assert!(EngineError::geofence_violation(1, "x", None).is_terminal());
    }

    #[test]
    fn test_error_survives_json_round_trip() {
        let error = EngineError::geofence_violation(2, "outside parking", Some(GeoPoint::new(1.0, 2.0)));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "geofence_violation");
        let back: EngineError = serde_json::from_value(json).unwrap();
        assert_eq!(back, error);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: EngineError = io_error.into();
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
