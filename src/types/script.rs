//! Ride script types
//!
//! A ride script is a replayable list of rider actions used by the
//! simulation binary. Each event belongs to a trip, a script-local label
//! that binds the events following an unlock to the ride it created.

use super::ride::RiderId;
use super::telemetry::{GeoPoint, TelemetrySample};

/// One scripted rider or payment-service action
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    Unlock {
        key: String,
        rider: RiderId,
        qr_public_id: String,
    },
    Telemetry(TelemetrySample),
    Lock {
        key: String,
        position: GeoPoint,
    },
    Capture,
    Refund,
}

impl ScriptAction {
    pub fn name(&self) -> &'static str {
        match self {
            ScriptAction::Unlock { .. } => "unlock",
            ScriptAction::Telemetry(_) => "telemetry",
            ScriptAction::Lock { .. } => "lock",
            ScriptAction::Capture => "capture",
            ScriptAction::Refund => "refund",
        }
    }
}

/// A script event bound to its trip label
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptEvent {
    pub trip: String,
    pub action: ScriptAction,
}
