//! Lock-point validation against the zone catalogue
//!
//! A lock point is legal when it lies inside a parking zone, or within the
//! configured buffer of a parking zone's boundary, and is not strictly inside
//! any no-park zone. No-park zones get no buffer.
//!
//! Denials carry the nearest legal parking point so that the routing
//! collaborator can guide the rider there.

use super::geo::{self, BoundaryPoint};
use crate::types::{EngineError, GeoPoint, Zone, ZoneId, ZoneKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default tolerance around parking boundaries, in meters
pub const DEFAULT_BUFFER_M: f64 = 5.0;

/// Where an allowed lock point sits relative to its parking zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParkingStatus {
    Inside,
    WithinBuffer,
}

/// Why a lock point was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    OutsideParking,
    NoParkZone,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::OutsideParking => "outside any parking zone",
            DenialReason::NoParkZone => "inside a no-park zone",
        }
    }
}

/// Outcome of validating a lock point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeofenceDecision {
    Allowed {
        zone: ZoneId,
        status: ParkingStatus,
    },
    Denied {
        reason: DenialReason,
        nearest_parking: Option<GeoPoint>,
    },
}

impl GeofenceDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GeofenceDecision::Allowed { .. })
    }
}

/// Validates lock points against a fixed zone catalogue
#[derive(Debug, Clone)]
pub struct GeofenceValidator {
    parking: Vec<Zone>,
    no_park: Vec<Zone>,
    buffer_m: f64,
}

impl GeofenceValidator {
    /// Build a validator over `zones`
    ///
    /// Zones with fewer than three vertices cannot enclose anything; they
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the buffer is negative or not finite.
    pub fn new(zones: Vec<Zone>, buffer_m: f64) -> Result<Self, EngineError> {
        if !buffer_m.is_finite() || buffer_m < 0.0 {
            return Err(EngineError::invalid_config(format!(
                "geofence buffer must be a finite non-negative number of meters, got {}",
                buffer_m
            )));
        }

        let mut parking = Vec::new();
        let mut no_park = Vec::new();
        for zone in zones {
            if zone.polygon.is_degenerate() {
                warn!(zone = zone.id, name = %zone.name, "skipping zone with fewer than three vertices");
                continue;
            }
            match zone.kind {
                ZoneKind::Parking => parking.push(zone),
                ZoneKind::NoPark => no_park.push(zone),
            }
        }

        Ok(Self {
            parking,
            no_park,
            buffer_m,
        })
    }

    pub fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    /// Number of usable zones
    pub fn zone_count(&self) -> usize {
        self.parking.len() + self.no_park.len()
    }

    /// Decide whether a bike may be locked at `point`
    pub fn validate(&self, point: GeoPoint) -> GeofenceDecision {
        if self.in_no_park(point) {
            return GeofenceDecision::Denied {
                reason: DenialReason::NoParkZone,
                nearest_parking: self.nearest_parking(point),
            };
        }

        if let Some(zone) = self.parking.iter().find(|z| geo::contains(&z.polygon, point)) {
            return GeofenceDecision::Allowed {
                zone: zone.id,
                status: ParkingStatus::Inside,
            };
        }

        let within_buffer = self
            .parking
            .iter()
            .filter_map(|z| {
                geo::nearest_point_on_polygon_boundary(point, &z.polygon).map(|b| (z.id, b.distance_m))
            })
            .filter(|(_, d)| *d <= self.buffer_m)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match within_buffer {
            Some((zone, _)) => GeofenceDecision::Allowed {
                zone,
                status: ParkingStatus::WithinBuffer,
            },
            None => GeofenceDecision::Denied {
                reason: DenialReason::OutsideParking,
                nearest_parking: self.nearest_parking(point),
            },
        }
    }

    fn in_no_park(&self, point: GeoPoint) -> bool {
        self.no_park
            .iter()
            .any(|z| geo::strictly_contains(&z.polygon, point))
    }

    /// Closest point on any parking boundary that is not inside a no-park zone
    ///
    /// The exact nearest boundary point of each zone is tried first; zone
    /// vertices are fallback candidates for when that point is covered by a
    /// no-park zone.
    pub fn nearest_parking(&self, point: GeoPoint) -> Option<GeoPoint> {
        let projected = self
            .parking
            .iter()
            .filter_map(|z| geo::nearest_point_on_polygon_boundary(point, &z.polygon));
        let vertices = self.parking.iter().flat_map(|z| {
            z.polygon.vertices.iter().map(move |v| BoundaryPoint {
                point: *v,
                distance_m: geo::distance(point, *v),
            })
        });

        projected
            .chain(vertices)
            .filter(|candidate| !self.in_no_park(candidate.point))
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
            .map(|candidate| candidate.point)
    }
}
