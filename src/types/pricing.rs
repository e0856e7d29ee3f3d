//! Fare plans and fare quotes
//!
//! All fare arithmetic is exact decimal arithmetic. The final cent value is
//! rounded half-to-even so that ties do not bias fares upward across many
//! rides, and the result is reproducible for identical inputs.
//!
//! The engine owns the *base* fare only. A surge multiplier chosen by the
//! external pricing service is composed with [`FareQuote::with_multiplier`],
//! which multiplies the unrounded base amount and rounds once.

use super::error::EngineError;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Round a cent amount to a whole cent, ties to even
pub fn round_cents(raw: Decimal) -> i64 {
    raw.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
        .to_i64()
        .unwrap_or(i64::MAX)
}

/// A versioned linear fare plan
#[derive(Debug, Clone, PartialEq)]
pub struct FarePlan {
    pub version: u32,
    pub name: String,
    pub base_cents: Decimal,
    pub per_minute_cents: Decimal,
    pub per_km_cents: Decimal,
}

impl Default for FarePlan {
    fn default() -> Self {
        Self {
            version: 1,
            name: "Flat".to_string(),
            base_cents: Decimal::from(100),
            per_minute_cents: Decimal::from(20),
            per_km_cents: Decimal::from(60),
        }
    }
}

impl FarePlan {
    /// Quote the fare for a distance and duration
    ///
    /// `raw = base + per_minute * seconds / 60 + per_km * meters / 1000`
    pub fn quote(&self, meters: f64, seconds: f64) -> FareQuote {
        let meters = Decimal::from_f64(meters.max(0.0)).unwrap_or(Decimal::ZERO);
        let seconds = Decimal::from_f64(seconds.max(0.0)).unwrap_or(Decimal::ZERO);
        let minutes = seconds / Decimal::from(60);
        let km = meters / Decimal::from(1000);

        let raw = self.base_cents + self.per_minute_cents * minutes + self.per_km_cents * km;
        FareQuote {
            pricing_version: self.version,
            raw_cents: raw,
            base_cents: round_cents(raw).max(0),
        }
    }

    /// Reject plans with negative rates
    pub fn validate(&self) -> Result<(), EngineError> {
        for (field, value) in [
            ("base_cents", self.base_cents),
            ("per_minute_cents", self.per_minute_cents),
            ("per_km_cents", self.per_km_cents),
        ] {
            if value.is_sign_negative() && !value.is_zero() {
                return Err(EngineError::invalid_config(format!(
                    "fare plan {} has negative {}: {}",
                    self.version, field, value
                )));
            }
        }
        Ok(())
    }
}

/// A fare quote produced from a plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FareQuote {
    pub pricing_version: u32,

    /// Unrounded amount in cents
    pub raw_cents: Decimal,

    /// Base fare in whole cents, ties to even
    pub base_cents: i64,
}

impl FareQuote {
    /// Compose the base fare with an external surge multiplier
    pub fn with_multiplier(&self, multiplier: Decimal) -> i64 {
        round_cents(self.raw_cents * multiplier).max(0)
    }
}

/// Fare plans by version, with one plan marked active
///
/// Rides pin the plan version active at unlock and are priced with that plan
/// for their whole lifetime.
#[derive(Debug, Clone)]
pub struct PricingCatalog {
    plans: Vec<FarePlan>,
    active_version: u32,
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self {
            plans: vec![FarePlan::default()],
            active_version: 1,
        }
    }
}

impl PricingCatalog {
    /// Build a catalog; the active version must be one of the plans
    pub fn new(plans: Vec<FarePlan>, active_version: u32) -> Result<Self, EngineError> {
        for plan in &plans {
            plan.validate()?;
        }
        if !plans.iter().any(|p| p.version == active_version) {
            return Err(EngineError::invalid_config(format!(
                "active fare plan version {} is not in the catalog",
                active_version
            )));
        }
        Ok(Self {
            plans,
            active_version,
        })
    }

    /// The plan new rides are priced with
    pub fn active(&self) -> &FarePlan {
        self.plan(self.active_version)
            .unwrap_or_else(|| &self.plans[0])
    }

    pub fn plan(&self, version: u32) -> Option<&FarePlan> {
        self.plans.iter().find(|p| p.version == version)
    }

    /// The plan a ride pinned, falling back to the active plan if it was removed
    pub fn plan_or_active(&self, version: u32) -> &FarePlan {
        self.plan(version).unwrap_or_else(|| self.active())
    }
}
