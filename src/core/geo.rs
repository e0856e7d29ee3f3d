//! Geometry helpers
//!
//! Thin functions over WGS84 coordinates, built on the `geo` crate:
//! great-circle distance, polygon containment and nearest-boundary-point
//! queries. Nothing here holds state.
//!
//! Boundary queries project the polygon onto a local equirectangular plane
//! centred on the query point and run `ClosestPoint` there. At geofence
//! scale (tens to hundreds of meters) the projection error is far below GPS
//! noise, and the returned distance is re-measured with haversine.

use crate::types::{GeoPoint, Polygon};
use ::geo::{Closest, ClosestPoint, Contains, Distance, HaversineMeasure, Intersects, LineString, Point};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (haversine)
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    HaversineMeasure::new(EARTH_RADIUS_M).distance(Point::from(a), Point::from(b))
}

/// Total length of a polyline in meters
pub fn polyline_distance(points: &[GeoPoint]) -> f64 {
    points.windows(2).map(|w| distance(w[0], w[1])).sum()
}

/// Whether `point` lies inside `polygon`; points on the boundary count as inside
pub fn contains(polygon: &Polygon, point: GeoPoint) -> bool {
    !polygon.is_degenerate() && polygon.to_geo().intersects(&Point::from(point))
}

/// Whether `point` lies inside `polygon` and not on its boundary
pub fn strictly_contains(polygon: &Polygon, point: GeoPoint) -> bool {
    !polygon.is_degenerate() && polygon.to_geo().contains(&Point::from(point))
}

/// Closest point on a polygon's boundary together with its distance in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPoint {
    pub point: GeoPoint,
    pub distance_m: f64,
}

/// Local planar frame centred on an origin, in meters
struct LocalFrame {
    origin: GeoPoint,
    meters_per_deg_lat: f64,
    meters_per_deg_lon: f64,
}

impl LocalFrame {
    fn new(origin: GeoPoint) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let meters_per_deg_lon = meters_per_deg_lat * origin.lat.to_radians().cos().max(1e-12);
        Self {
            origin,
            meters_per_deg_lat,
            meters_per_deg_lon,
        }
    }

    /// The polygon's closed ring in frame coordinates
    fn ring(&self, polygon: &Polygon) -> LineString<f64> {
        let mut ring: Vec<(f64, f64)> = polygon.vertices.iter().map(|v| self.project(*v)).collect();
        if let Some(first) = ring.first().copied() {
            ring.push(first);
        }
        LineString::from(ring)
    }

    fn project(&self, p: GeoPoint) -> (f64, f64) {
        (
            (p.lon - self.origin.lon) * self.meters_per_deg_lon,
            (p.lat - self.origin.lat) * self.meters_per_deg_lat,
        )
    }

    fn unproject(&self, p: Point<f64>) -> GeoPoint {
        GeoPoint::new(
            self.origin.lat + p.y() / self.meters_per_deg_lat,
            self.origin.lon + p.x() / self.meters_per_deg_lon,
        )
    }
}

/// Nearest point on the polygon's boundary to `point`
///
/// Works for points inside or outside the polygon. Returns `None` for an
/// empty ring.
pub fn nearest_point_on_polygon_boundary(point: GeoPoint, polygon: &Polygon) -> Option<BoundaryPoint> {
    if !point.is_valid() {
        return None;
    }
    if let [only] = polygon.vertices[..] {
        return Some(BoundaryPoint {
            point: only,
            distance_m: distance(point, only),
        });
    }

    let frame = LocalFrame::new(point);
    let nearest = match frame.ring(polygon).closest_point(&Point::new(0.0, 0.0)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => frame.unproject(p),
        Closest::Indeterminate => return None,
    };

    Some(BoundaryPoint {
        point: nearest,
        distance_m: distance(point, nearest),
    })
}
