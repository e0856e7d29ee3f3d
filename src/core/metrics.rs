//! Trip metrics accumulation
//!
//! A `MetricsAccumulator` consumes the telemetry samples of one ride in
//! timestamp order and keeps running totals for distance, elapsed time and
//! peak speed, plus the route polyline. Derived figures (energy, average
//! speed, fare) are computed on demand by [`MetricsAccumulator::metrics`].
//!
//! The accumulator is plain data. The ride engine resumes it from the stored
//! ride, appends under the ride's exclusion and writes the result back, so
//! a rejected sample never leaves a partial update behind.

use super::geo;
use crate::types::{EngineError, FarePlan, GeoPoint, Ride, RideMetrics, TelemetrySample};

/// Metabolic energy model for a cycling rider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyModel {
    /// Metabolic equivalent of the activity
    pub met: f64,

    pub body_mass_kg: f64,
}

impl Default for EnergyModel {
    fn default() -> Self {
        Self {
            met: 8.0,
            body_mass_kg: 70.0,
        }
    }
}

impl EnergyModel {
    /// `kcal = MET * mass * hours`, zero when no time has elapsed
    pub fn kcal(&self, seconds: f64) -> f64 {
        if seconds <= 0.0 {
            return 0.0;
        }
        self.met * self.body_mass_kg * seconds / 3600.0
    }
}

/// Running totals for one ride
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsAccumulator {
    meters: f64,
    seconds: f64,
    max_speed_mps: f64,
    last: Option<(GeoPoint, f64)>,
    polyline: Vec<GeoPoint>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the accumulator from a stored ride
    pub fn resume(ride: &Ride) -> Self {
        let last = ride
            .last_sample_ts
            .zip(ride.polyline.last().copied())
            .map(|(ts, point)| (point, ts));

        Self {
            meters: ride.metrics.meters,
            seconds: ride.metrics.seconds,
            max_speed_mps: ride.metrics.max_speed_mps,
            last,
            polyline: ride.polyline.clone(),
        }
    }

    /// Append one sample
    ///
    /// The first sample only establishes the origin. Every later sample must
    /// be strictly newer than the last accepted one. On error the accumulator
    /// is unchanged.
    ///
    /// # Returns
    ///
    /// The length in meters of the segment this sample added
    pub fn append(&mut self, sample: TelemetrySample) -> Result<f64, EngineError> {
        if let Some(reason) = sample.validation_error() {
            return Err(EngineError::invalid_sample(reason));
        }

        let segment = match self.last {
            Some((_, last_ts)) if sample.ts <= last_ts => {
                return Err(EngineError::out_of_order_sample(sample.ts, last_ts));
            }
            Some((last_point, last_ts)) => {
                let segment = geo::distance(last_point, sample.position);
                self.meters += segment;
                self.seconds += sample.ts - last_ts;
                segment
            }
            None => 0.0,
        };

        self.max_speed_mps = self.max_speed_mps.max(sample.speed_mps);
        self.last = Some((sample.position, sample.ts));
        self.polyline.push(sample.position);
        Ok(segment)
    }

    pub fn meters(&self) -> f64 {
        self.meters
    }

    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn last_ts(&self) -> Option<f64> {
        self.last.map(|(_, ts)| ts)
    }

    pub fn last_position(&self) -> Option<GeoPoint> {
        self.last.map(|(point, _)| point)
    }

    pub fn polyline(&self) -> &[GeoPoint] {
        &self.polyline
    }

    /// Snapshot the running totals priced with `plan`
    pub fn metrics(&self, plan: &FarePlan, energy: &EnergyModel) -> RideMetrics {
        let avg_speed_mps = if self.seconds > 0.0 {
            self.meters / self.seconds
        } else {
            0.0
        };

        RideMetrics {
            meters: self.meters,
            seconds: self.seconds,
            energy_kcal: energy.kcal(self.seconds),
            avg_speed_mps,
            max_speed_mps: self.max_speed_mps,
            fare_cents: plan.quote(self.meters, self.seconds).base_cents,
            pricing_version: plan.version,
        }
    }

    /// Write the totals and trace back onto the ride
    pub fn store_into(self, ride: &mut Ride, plan: &FarePlan, energy: &EnergyModel) {
        ride.metrics = self.metrics(plan, energy);
        ride.last_sample_ts = self.last_ts();
        ride.polyline = self.polyline;
    }
}
