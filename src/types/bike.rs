//! Bike-related types
//!
//! A bike has two orthogonal axes of state: its service `status` (ok or in
//! maintenance) and its `lock_state`. Only bikes in service may leave the
//! locked state.

use super::error::EngineError;
use super::telemetry::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Internal bike identifier
pub type BikeId = u32;

/// Service status of a bike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BikeStatus {
    /// In service and rentable
    Ok,

    /// Pulled from service; cannot be unlocked
    Maintenance,
}

/// Physical lock state of a bike
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Events that drive the lock-state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BikeEvent {
    Unlock,
    Lock,
}

impl LockState {
    /// Apply an event to a lock state
    ///
    /// Only `Locked --Unlock--> Unlocked` and `Unlocked --Lock--> Locked`
    /// are valid; every other pair is rejected.
    pub fn apply(self, bike: BikeId, event: BikeEvent) -> Result<LockState, EngineError> {
        match (self, event) {
            (LockState::Locked, BikeEvent::Unlock) => Ok(LockState::Unlocked),
            (LockState::Unlocked, BikeEvent::Lock) => Ok(LockState::Locked),
            (LockState::Unlocked, BikeEvent::Unlock) => {
                Err(EngineError::bike_unavailable(bike, "bike is already unlocked"))
            }
            (LockState::Locked, BikeEvent::Lock) => Err(EngineError::illegal_transition(
                "bike",
                u64::from(bike),
                "locked",
                "lock",
            )),
        }
    }
}

/// A fleet bike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bike {
    /// Internal identifier
    pub id: BikeId,

    /// Public code printed on the bike's QR sticker (unique across the fleet)
    pub qr_public_id: String,

    pub status: BikeStatus,
    pub lock_state: LockState,

    /// Battery charge in percent, clamped to [0, 100]
    pub battery_pct: u8,

    /// Last known position
    pub position: GeoPoint,

    /// Optimistic concurrency counter, bumped on every committed write
    pub version: u64,

    pub last_reported_at: Option<DateTime<Utc>>,
}

impl Bike {
    /// Create a locked, in-service bike at version 0
    pub fn new(id: BikeId, qr_public_id: impl Into<String>, position: GeoPoint) -> Self {
        Bike {
            id,
            qr_public_id: qr_public_id.into(),
            status: BikeStatus::Ok,
            lock_state: LockState::Locked,
            battery_pct: 100,
            position,
            version: 0,
            last_reported_at: None,
        }
    }

    /// Whether a rider could unlock this bike right now
    pub fn is_available(&self) -> bool {
        self.status == BikeStatus::Ok && self.lock_state == LockState::Locked
    }
}
