//! Position and telemetry types
//!
//! `GeoPoint` is the coordinate type shared by bikes, zones and telemetry.
//! `TelemetrySample` is one reading streamed by a bike during a ride.

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Whether both components are finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A single telemetry reading for an active ride
///
/// Samples are consumed by the metrics accumulator and are not retained
/// individually beyond the ride polyline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Reported position
    pub position: GeoPoint,

    /// Instantaneous speed in meters per second
    pub speed_mps: f64,

    /// Reading time in seconds since the Unix epoch
    pub ts: f64,
}

impl TelemetrySample {
    pub fn new(lat: f64, lon: f64, speed_mps: f64, ts: f64) -> Self {
        Self {
            position: GeoPoint::new(lat, lon),
            speed_mps,
            ts,
        }
    }

    /// Describe why a sample cannot be accepted, if it cannot
    pub fn validation_error(&self) -> Option<String> {
        if !self.position.is_valid() {
            return Some(format!(
                "position ({}, {}) is outside WGS84 bounds",
                self.position.lat, self.position.lon
            ));
        }
        if !self.speed_mps.is_finite() || self.speed_mps < 0.0 {
            return Some(format!("speed {} m/s is not a finite non-negative value", self.speed_mps));
        }
        if !self.ts.is_finite() {
            return Some(format!("timestamp {} is not finite", self.ts));
        }
        None
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(point: GeoPoint) -> Self {
        geo::Point::new(point.lon, point.lat)
    }
}

impl From<geo::Point<f64>> for GeoPoint {
    fn from(point: geo::Point<f64>) -> Self {
        GeoPoint::new(point.y(), point.x())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::valid(TelemetrySample::new(1.30, 103.85, 4.5, 1_000.0), true)]
    #[case::lat_out_of_range(TelemetrySample::new(91.0, 103.85, 4.5, 1_000.0), false)]
    #[case::lon_out_of_range(TelemetrySample::new(1.30, 181.0, 4.5, 1_000.0), false)]
    #[case::negative_speed(TelemetrySample::new(1.30, 103.85, -1.0, 1_000.0), false)]
    #[case::nan_speed(TelemetrySample::new(1.30, 103.85, f64::NAN, 1_000.0), false)]
    #[case::infinite_ts(TelemetrySample::new(1.30, 103.85, 4.5, f64::INFINITY), false)]
    fn test_sample_validation(#[case] sample: TelemetrySample, #[case] valid: bool) {
        assert_eq!(sample.validation_error().is_none(), valid);
    }

    #[test]
    fn test_geo_point_axis_order() {
        let point: geo::Point<f64> = GeoPoint::new(1.30, 103.85).into();

        assert_eq!(point.x(), 103.85);
        assert_eq!(point.y(), 1.30);
        assert_eq!(GeoPoint::from(point), GeoPoint::new(1.30, 103.85));
    }
}
