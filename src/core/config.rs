//! Engine configuration
//!
//! `EngineConfig` collects the tunables of the ride engine. Values that are
//! out of range fall back to their defaults with a warning instead of failing
//! startup.

use super::geofence::DEFAULT_BUFFER_M;
use super::metrics::EnergyModel;
use crate::types::{FarePlan, PricingCatalog};
use tracing::warn;

/// Default time an idempotency record is kept, in hours
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Tunables for a [`RideEngine`](super::RideEngine)
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tolerance around parking boundaries, in meters
    pub geofence_buffer_m: f64,

    /// Energy estimate parameters
    pub energy: EnergyModel,

    /// How long idempotency records are retained before purging
    pub idempotency_retention: chrono::Duration,

    /// Fare plans; new rides pin the active plan
    pub pricing: PricingCatalog,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geofence_buffer_m: DEFAULT_BUFFER_M,
            energy: EnergyModel::default(),
            idempotency_retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
            pricing: PricingCatalog::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new EngineConfig with custom values
    ///
    /// Invalid values (negative or non-finite buffer, non-positive mass or
    /// MET, a fare plan with negative rates) are replaced by defaults.
    pub fn new(geofence_buffer_m: f64, energy: EnergyModel, plan: FarePlan) -> Self {
        let default = Self::default();

        let geofence_buffer_m = if geofence_buffer_m.is_finite() && geofence_buffer_m >= 0.0 {
            geofence_buffer_m
        } else {
            warn!(
                value = geofence_buffer_m,
                default = default.geofence_buffer_m,
                "invalid geofence buffer, using default"
            );
            default.geofence_buffer_m
        };

        let met = positive_or(energy.met, default.energy.met, "met");
        let body_mass_kg = positive_or(energy.body_mass_kg, default.energy.body_mass_kg, "body_mass_kg");

        let version = plan.version;
        let pricing = match PricingCatalog::new(vec![plan], version) {
            Ok(catalog) => catalog,
            Err(e) => {
                warn!(error = %e, "invalid fare plan, using default");
                default.pricing
            }
        };

        Self {
            geofence_buffer_m,
            energy: EnergyModel { met, body_mass_kg },
            idempotency_retention: default.idempotency_retention,
            pricing,
        }
    }

    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        if retention > chrono::Duration::zero() {
            self.idempotency_retention = retention;
        } else {
            warn!(seconds = retention.num_seconds(), "invalid idempotency retention, keeping current");
        }
        self
    }

    pub fn with_pricing(mut self, pricing: PricingCatalog) -> Self {
        self.pricing = pricing;
        self
    }
}

fn positive_or(value: f64, default: f64, field: &str) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warn!(field, value, default, "invalid energy parameter, using default");
        default
    }
}
