//! Geofence zone types
//!
//! Zones are static reference data supplied by the catalogue loader and
//! read-only to the engine.

use super::telemetry::GeoPoint;
use serde::{Deserialize, Serialize};

/// Zone identifier
pub type ZoneId = u32;

/// What a zone means for parking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    /// Bikes may be locked inside (plus the configured buffer)
    Parking,

    /// Bikes may never be locked inside; no buffer applies
    NoPark,
}

/// A closed ring of vertices
///
/// The ring is implicitly closed: the last vertex connects back to the first.
/// A repeated closing vertex (as GeoJSON writes it) is tolerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<GeoPoint>,
}

impl Polygon {
    pub fn new(vertices: Vec<GeoPoint>) -> Self {
        Self { vertices }
    }

    /// Iterate the ring's edges as (start, end) pairs, closing the ring
    pub fn edges(&self) -> impl Iterator<Item = (GeoPoint, GeoPoint)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// A ring needs at least three vertices to enclose an area
    pub fn is_degenerate(&self) -> bool {
        self.vertices.len() < 3
    }

    /// The ring as a planar `geo` polygon, x = lon and y = lat
    ///
    /// `geo` closes the exterior ring itself.
    pub fn to_geo(&self) -> geo::Polygon<f64> {
        let ring: Vec<geo::Coord<f64>> = self
            .vertices
            .iter()
            .map(|v| geo::coord! { x: v.lon, y: v.lat })
            .collect();
        geo::Polygon::new(geo::LineString::new(ring), vec![])
    }
}

/// A geofence zone from the catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub kind: ZoneKind,
    pub polygon: Polygon,
}
