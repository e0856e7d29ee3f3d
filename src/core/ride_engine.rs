//! Ride lifecycle orchestration
//!
//! This module provides the `RideEngine`, the entry point for every rider
//! action. It coordinates the bike registry, the ride store, the idempotency
//! ledger and the geofence validator.
//!
//! # Architecture
//!
//! ```text
//! RideEngine (Clone, Arc<EngineInner>)
//!     ├── BikeRegistry       (bike records, per-bike exclusion)
//!     ├── RideStore          (ride arena, per-ride exclusion)
//!     ├── IdempotencyStore   (keyed outcomes for unlock / lock)
//!     ├── GeofenceValidator  (zone catalogue)
//!     └── RideEventSink      (payment notification)
//! ```
//!
//! # Concurrency
//!
//! Steps touching a ride hold its exclusion; steps touching a bike hold the
//! bike's. `lock` holds both, always taken ride first, then bike. Unlock and
//! lock run on a spawned task which the caller awaits: dropping the caller's
//! future does not abort the task, so the effect still completes and is
//! recorded for a retry under the same idempotency key.

use super::bike_registry::BikeRegistry;
use super::config::EngineConfig;
use super::exclusion::retry_once;
use super::geofence::{GeofenceDecision, GeofenceValidator, ParkingStatus};
use super::idempotency::{Fingerprint, IdempotencyStore};
use super::metrics::MetricsAccumulator;
use super::ride_store::RideStore;
use super::traits::{Clock, NullSink, RideEndedNotice, RideEventSink, SystemClock};
use crate::types::{
    Bike, BikeEvent, BikeId, EngineError, GeoPoint, Ride, RideEvent, RideId, RideMetrics,
    RideState, RiderId, TelemetrySample, Zone, ZoneId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Idempotency endpoint name for unlock requests
pub const UNLOCK_ENDPOINT: &str = "/unlock";

/// Idempotency endpoint name for lock requests
pub const LOCK_ENDPOINT: &str = "/lock";

/// Result of a successful unlock: the new ride and the unlocked bike
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockReceipt {
    pub ride: Ride,
    pub bike: Bike,
}

/// Running totals after a telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReceipt {
    pub meters: f64,
    pub seconds: f64,
    pub energy_kcal: f64,
    pub fare_cents: i64,
}

/// Result of a successful lock: the ended ride and its frozen metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockReceipt {
    pub ride: Ride,
    pub metrics: RideMetrics,
    pub zone: ZoneId,
    pub parking_status: ParkingStatus,
}

/// Callback from the payment service about an ended ride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentNotice {
    Captured,
    Refunded,
}

impl PaymentNotice {
    fn event(self) -> (RideEvent, RideState) {
        match self {
            PaymentNotice::Captured => (RideEvent::Capture, RideState::Billed),
            PaymentNotice::Refunded => (RideEvent::Refund, RideState::Refunded),
        }
    }
}

#[derive(Serialize)]
struct UnlockRequest<'a> {
    qr_public_id: &'a str,
    rider_id: RiderId,
}

#[derive(Serialize)]
struct LockRequest {
    ride_id: RideId,
    lat: f64,
    lon: f64,
}

#[derive(Debug)]
struct EngineInner {
    bikes: BikeRegistry,
    rides: RideStore,
    idempotency: IdempotencyStore,
    geofence: GeofenceValidator,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn RideEventSink>,
}

/// Ride lifecycle engine
///
/// Cheap to clone; every clone shares the same state.
#[derive(Debug, Clone)]
pub struct RideEngine {
    inner: Arc<EngineInner>,
}

impl RideEngine {
    /// Create an engine on the system clock that discards ride notifications
    pub fn new(config: EngineConfig, zones: Vec<Zone>) -> Result<Self, EngineError> {
        Self::with_collaborators(config, zones, Arc::new(SystemClock), Arc::new(NullSink))
    }

    /// Create an engine with explicit clock and notification sink
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the geofence buffer is unusable.
    pub fn with_collaborators(
        config: EngineConfig,
        zones: Vec<Zone>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn RideEventSink>,
    ) -> Result<Self, EngineError> {
        let geofence = GeofenceValidator::new(zones, config.geofence_buffer_m)?;
        let inner = EngineInner {
            bikes: BikeRegistry::new(Arc::clone(&clock)),
            rides: RideStore::new(),
            idempotency: IdempotencyStore::new(config.idempotency_retention, Arc::clone(&clock)),
            geofence,
            config,
            clock,
            sink,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Bike registry, for provisioning, maintenance and battery reports
    pub fn registry(&self) -> &BikeRegistry {
        &self.inner.bikes
    }

    pub fn geofence(&self) -> &GeofenceValidator {
        &self.inner.geofence
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Start a ride on the bike with scan code `qr_public_id`
    ///
    /// Keyed on `("/unlock", {qr_public_id, rider_id})`.
    ///
    /// # Errors
    ///
    /// * `BikeNotFound` - no bike has this scan code
    /// * `BikeUnavailable` - bike is in maintenance or already unlocked
    /// * `RiderHasActiveRide` - rider is already riding
    /// * `IdempotencyConflict` - key reused for a different request
    pub async fn unlock(
        &self,
        qr_public_id: &str,
        rider: RiderId,
        idempotency_key: &str,
    ) -> Result<UnlockReceipt, EngineError> {
        let fingerprint = Fingerprint::of(
            UNLOCK_ENDPOINT,
            &UnlockRequest {
                qr_public_id,
                rider_id: rider,
            },
        )?;

        let engine = self.clone();
        let key = idempotency_key.to_string();
        let code = qr_public_id.to_string();
        tokio::spawn(async move {
            engine
                .inner
                .idempotency
                .execute(&key, &fingerprint, || engine.unlock_effect(&code, rider))
                .await
        })
        .await
        .map_err(EngineError::task_failed)?
    }

    async fn unlock_effect(&self, code: &str, rider: RiderId) -> Result<UnlockReceipt, EngineError> {
        let inner = &self.inner;
        let bike = inner.bikes.find_by_code(code)?;

        let _bike_guard = inner.bikes.acquire(bike.id).await;
        let bike = inner.bikes.unlock_held(bike.id).map_err(|e| {
            debug!(bike = bike.id, rider, error = %e, "unlock refused");
            e
        })?;

        let plan = inner.config.pricing.active();
        let metrics = RideMetrics::zeroed(plan.version, plan.quote(0.0, 0.0).base_cents);
        let ride = Ride::start(inner.rides.next_id(), rider, bike.id, inner.clock.now(), metrics);
        let ride = match inner.rides.start(ride) {
            Ok(ride) => ride,
            Err(e) => {
                // Rider is busy elsewhere; put the bike back as it was
                if let Err(revert) = inner.bikes.revert_unlock_held(bike.id) {
                    warn!(bike = bike.id, error = %revert, "unlock not reverted");
                }
                debug!(bike = bike.id, rider, error = %e, "unlock refused");
                return Err(e);
            }
        };

        info!(ride = ride.id, bike = bike.id, rider, pricing_version = plan.version, "ride started");
        Ok(UnlockReceipt { ride, bike })
    }

    /// Feed one telemetry sample into an active ride
    ///
    /// # Errors
    ///
    /// * `RideNotFound` / `RideNotActive` - no such ride, or it has ended
    /// * `OutOfOrderSample` - timestamp does not advance
    /// * `InvalidSample` - coordinates or speed out of range
    pub async fn append_telemetry(
        &self,
        ride_id: RideId,
        sample: TelemetrySample,
    ) -> Result<TelemetryReceipt, EngineError> {
        let inner = &self.inner;
        let _ride_guard = inner.rides.acquire(ride_id).await;

        let mut ride = inner.rides.get(ride_id)?;
        if !ride.is_active() {
            return Err(EngineError::ride_not_active(ride_id, ride.state));
        }

        let plan = inner.config.pricing.plan_or_active(ride.metrics.pricing_version);
        let mut track = MetricsAccumulator::resume(&ride);
        let segment = track.append(sample)?;

        let expected = ride.version;
        track.store_into(&mut ride, plan, &inner.config.energy);
        let ride = inner.rides.commit(ride, expected)?;

        {
            let _bike_guard = inner.bikes.acquire(ride.bike).await;
            if let Err(e) = inner.bikes.update_position(ride.bike, sample.position) {
                warn!(ride = ride_id, bike = ride.bike, error = %e, "bike position not updated");
            }
        }

        debug!(
            ride = ride_id,
            segment_m = segment,
            meters = ride.metrics.meters,
            seconds = ride.metrics.seconds,
            "telemetry accepted"
        );
        Ok(TelemetryReceipt {
            meters: ride.metrics.meters,
            seconds: ride.metrics.seconds,
            energy_kcal: ride.metrics.energy_kcal,
            fare_cents: ride.metrics.fare_cents,
        })
    }

    /// End a ride by locking its bike at `position`
    ///
    /// Keyed on `("/lock", {ride_id, lat, lon})`. On success the ride is
    /// ended, the bike is locked at `position`, and the notification sink is
    /// told about the ride.
    ///
    /// # Errors
    ///
    /// * `RideNotFound` / `RideNotActive` - no such ride, or it has ended
    /// * `InvalidSample` - position is not a finite WGS84 coordinate
    /// * `GeofenceViolation` - point is not legal parking; the ride stays
    ///   active and the error carries the nearest legal point
    /// * `ConcurrentModification` - the bike changed twice underneath
    /// * `IdempotencyConflict` - key reused for a different request
    pub async fn lock(
        &self,
        ride_id: RideId,
        position: GeoPoint,
        idempotency_key: &str,
    ) -> Result<LockReceipt, EngineError> {
        if !position.is_valid() {
            return Err(EngineError::invalid_sample(format!(
                "lock position ({}, {}) is outside WGS84 bounds",
                position.lat, position.lon
            )));
        }
        let fingerprint = Fingerprint::of(
            LOCK_ENDPOINT,
            &LockRequest {
                ride_id,
                lat: position.lat,
                lon: position.lon,
            },
        )?;

        let engine = self.clone();
        let key = idempotency_key.to_string();
        tokio::spawn(async move {
            engine
                .inner
                .idempotency
                .execute(&key, &fingerprint, || engine.lock_effect(ride_id, position))
                .await
        })
        .await
        .map_err(EngineError::task_failed)?
    }

    async fn lock_effect(&self, ride_id: RideId, position: GeoPoint) -> Result<LockReceipt, EngineError> {
        let inner = &self.inner;
        let ride_guard = inner.rides.acquire(ride_id).await;

        let ride = inner.rides.get(ride_id)?;
        if !ride.is_active() {
            return Err(EngineError::ride_not_active(ride_id, ride.state));
        }

        let (zone, parking_status) = match inner.geofence.validate(position) {
            GeofenceDecision::Allowed { zone, status } => (zone, status),
            GeofenceDecision::Denied {
                reason,
                nearest_parking,
            } => {
                warn!(ride = ride_id, lat = position.lat, lon = position.lon, reason = reason.as_str(), "lock refused");
                return Err(EngineError::geofence_violation(ride_id, reason.as_str(), nearest_parking));
            }
        };

        let bike_guard = inner.bikes.acquire(ride.bike).await;
        let (ride, bike) = retry_once(|| self.commit_lock(ride_id, position))?;
        drop(bike_guard);
        drop(ride_guard);
        inner.rides.release_exclusion(ride_id);

        let ended_at = ride.ended_at.unwrap_or_else(|| inner.clock.now());
        inner.sink.ride_ended(RideEndedNotice {
            ride: ride.id,
            rider: ride.rider,
            bike: bike.id,
            metrics: ride.metrics.clone(),
            ended_at,
        });

        info!(
            ride = ride.id,
            bike = bike.id,
            zone,
            meters = ride.metrics.meters,
            seconds = ride.metrics.seconds,
            fare_cents = ride.metrics.fare_cents,
            "ride ended"
        );
        Ok(LockReceipt {
            metrics: ride.metrics.clone(),
            ride,
            zone,
            parking_status,
        })
    }

    /// End the ride and lock its bike as one step; caller holds both exclusions
    ///
    /// The bike is committed first: it is the only side another writer can
    /// touch, so a conflict there aborts before anything is written.
    fn commit_lock(&self, ride_id: RideId, position: GeoPoint) -> Result<(Ride, Bike), EngineError> {
        let inner = &self.inner;
        let mut ride = inner.rides.get(ride_id)?;
        let mut bike = inner.bikes.get(ride.bike)?;
        let (ride_expected, bike_expected) = (ride.version, bike.version);
        let now = inner.clock.now();

        ride.state = ride.state.apply(ride_id, RideEvent::Lock)?;
        ride.ended_at = Some(now);
        let plan = inner.config.pricing.plan_or_active(ride.metrics.pricing_version);
        ride.metrics = MetricsAccumulator::resume(&ride).metrics(plan, &inner.config.energy);

        bike.lock_state = bike.lock_state.apply(bike.id, BikeEvent::Lock)?;
        bike.position = position;
        bike.last_reported_at = Some(now);

        let bike = inner.bikes.commit(bike, bike_expected)?;
        let ride = inner.rides.commit(ride, ride_expected)?;
        Ok((ride, bike))
    }

    /// Apply a payment-service callback to an ended ride
    ///
    /// `Captured` moves an ended ride to billed and `Refunded` moves an ended
    /// or billed ride to refunded. Repeating a notice that already took effect is a
    /// no-op.
    pub async fn apply_payment_notice(&self, ride_id: RideId, notice: PaymentNotice) -> Result<Ride, EngineError> {
        let inner = &self.inner;
        let _ride_guard = inner.rides.acquire(ride_id).await;

        let mut ride = inner.rides.get(ride_id)?;
        let (event, target) = notice.event();
        if ride.state == target {
            debug!(ride = ride_id, notice = ?notice, "payment notice already applied");
            return Ok(ride);
        }

        let expected = ride.version;
        ride.state = ride.state.apply(ride_id, event)?;
        let ride = inner.rides.commit(ride, expected)?;

        info!(ride = ride_id, state = ride.state.as_str(), "payment notice applied");
        Ok(ride)
    }

    pub fn ride(&self, id: RideId) -> Result<Ride, EngineError> {
        self.inner.rides.get(id)
    }

    pub fn active_ride_for_bike(&self, bike: BikeId) -> Option<Ride> {
        self.inner.rides.active_for_bike(bike)
    }

    /// All rides sorted by id
    pub fn rides(&self) -> Vec<Ride> {
        self.inner.rides.list()
    }

    /// All bikes sorted by id
    pub fn bikes(&self) -> Vec<Bike> {
        self.inner.bikes.list()
    }

    /// Drop idempotency records past their retention window
    pub fn purge_idempotency(&self) -> usize {
        self.inner.idempotency.purge_expired()
    }

    /// Drop idle per-bike and per-ride exclusion handles
    pub fn prune_exclusions(&self) -> usize {
        let pruned = self.inner.bikes.prune_exclusion() + self.inner.rides.prune_exclusion();
        if pruned > 0 {
            debug!(pruned, "pruned idle exclusion handles");
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::EARTH_RADIUS_M;
    use crate::core::traits::{ChannelSink, ManualClock};
    use crate::types::{BikeStatus, LockState, Polygon, ZoneKind};
    use chrono::Utc;
    use std::time::Duration;

    const M_PER_DEG: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

    fn zones() -> Vec<Zone> {
        // ~111 m parking square; the ride below starts inside it
        vec![Zone {
            id: 1,
            name: "Depot".to_string(),
            kind: ZoneKind::Parking,
            polygon: Polygon::new(vec![
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(0.0, 0.001),
                GeoPoint::new(0.001, 0.001),
                GeoPoint::new(0.001, 0.0),
            ]),
        }]
    }

    fn engine() -> RideEngine {
        let engine = RideEngine::new(EngineConfig::default(), zones()).unwrap();
        engine
            .registry()
            .register(Bike::new(1, "BK-1", GeoPoint::new(0.0005, 0.0005)))
            .unwrap();
        engine
    }

    fn inside() -> GeoPoint {
        GeoPoint::new(0.0005, 0.0005)
    }

    fn outside() -> GeoPoint {
        GeoPoint::new(0.01, 0.01)
    }

    #[tokio::test]
    async fn test_unlock_starts_ride() {
        let engine = engine();

        let receipt = engine.unlock("BK-1", 7, "u-1").await.unwrap();

        let ride = engine.ride(receipt.ride.id).unwrap();
        assert_eq!(receipt.ride, ride);
        assert_eq!(receipt.bike.id, 1);
        assert_eq!(receipt.bike.lock_state, LockState::Unlocked);
        assert_eq!(ride.state, RideState::Active);
        assert_eq!(ride.rider, 7);
        assert_eq!(ride.metrics.fare_cents, 100);
        assert_eq!(ride.metrics.pricing_version, 1);
        assert_eq!(engine.registry().get(1).unwrap().lock_state, LockState::Unlocked);
        assert_eq!(engine.active_ride_for_bike(1).map(|r| r.id), Some(receipt.ride.id));
    }

    #[tokio::test]
    async fn test_unlock_unknown_code() {
        let engine = engine();

        let result = engine.unlock("BK-404", 7, "u-1").await;

        assert_eq!(result, Err(EngineError::bike_not_found("BK-404")));
    }

    #[tokio::test]
    async fn test_unlock_replay_has_no_new_effect() {
        let engine = engine();

        let first = engine.unlock("BK-1", 7, "u-1").await.unwrap();
        let bike_version = engine.registry().get(1).unwrap().version;
        let second = engine.unlock("BK-1", 7, "u-1").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.rides().len(), 1);
        assert_eq!(engine.registry().get(1).unwrap().version, bike_version);
    }

    #[tokio::test]
    async fn test_unlock_key_reuse_with_other_payload_conflicts() {
        let engine = engine();
        engine.unlock("BK-1", 7, "u-1").await.unwrap();

        let result = engine.unlock("BK-1", 8, "u-1").await;

        assert_eq!(result, Err(EngineError::idempotency_conflict("u-1")));
    }

    #[tokio::test]
    async fn test_second_unlock_of_same_bike_is_unavailable() {
        let engine = engine();
        engine.unlock("BK-1", 7, "u-1").await.unwrap();

        let result = engine.unlock("BK-1", 8, "u-2").await;

        assert!(matches!(result, Err(EngineError::BikeUnavailable { bike: 1, .. })));
        // rider 8 is still free to ride
        engine.registry().register(Bike::new(2, "BK-2", inside())).unwrap();
        assert!(engine.unlock("BK-2", 8, "u-3").await.is_ok());
    }

    #[tokio::test]
    async fn test_rider_with_active_ride_cannot_unlock_again() {
        let engine = engine();
        engine.registry().register(Bike::new(2, "BK-2", inside())).unwrap();
        let first = engine.unlock("BK-1", 7, "u-1").await.unwrap();

        let result = engine.unlock("BK-2", 7, "u-2").await;

        assert_eq!(result, Err(EngineError::rider_has_active_ride(7, first.ride.id)));
        assert!(engine.registry().get(2).unwrap().is_available());
    }

    #[tokio::test]
    async fn test_unlock_waiting_on_busy_bike_does_not_block_rider() {
        let engine = engine();
        engine.registry().register(Bike::new(2, "BK-2", inside())).unwrap();
        engine.unlock("BK-1", 8, "held").await.unwrap();

        let guard = engine.registry().acquire(1).await;
        let waiting = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.unlock("BK-1", 7, "a").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = engine.unlock("BK-2", 7, "b").await.unwrap();
        drop(guard);

        let first = waiting.await.unwrap();
        assert!(matches!(first, Err(EngineError::BikeUnavailable { bike: 1, .. })));
        assert_eq!(engine.ride(second.ride.id).unwrap().rider, 7);
        assert_eq!(engine.unlock("BK-2", 7, "b").await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_unlock_refused_for_busy_rider_leaves_bike_locked() {
        let engine = engine();
        engine.registry().register(Bike::new(2, "BK-2", inside())).unwrap();
        let first = engine.unlock("BK-1", 7, "u-1").await.unwrap();

        let result = engine.unlock("BK-2", 7, "u-2").await;

        assert_eq!(result, Err(EngineError::rider_has_active_ride(7, first.ride.id)));
        assert!(engine.ride(first.ride.id).is_ok());
        assert_eq!(engine.registry().get(2).unwrap().lock_state, LockState::Locked);
        assert_eq!(engine.rides().len(), 1);
    }

    #[tokio::test]
    async fn test_maintenance_bike_cannot_unlock() {
        let engine = engine();
        engine.registry().set_status(1, BikeStatus::Maintenance).await.unwrap();

        let result = engine.unlock("BK-1", 7, "u-1").await;

        assert!(matches!(result, Err(EngineError::BikeUnavailable { .. })));
        assert!(engine.rides().is_empty());
    }

    #[tokio::test]
    async fn test_telemetry_accumulates_and_moves_bike() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;

        engine
            .append_telemetry(ride, TelemetrySample::new(0.0, 0.0, 3.0, 0.0))
            .await
            .unwrap();
        let receipt = engine
            .append_telemetry(ride, TelemetrySample::new(300.0 / M_PER_DEG, 0.0, 3.0, 120.0))
            .await
            .unwrap();

        assert!((receipt.meters - 300.0).abs() < 0.01);
        assert_eq!(receipt.seconds, 120.0);
        // 100 + 20 * 2 + 60 * 0.3 = 158
        assert_eq!(receipt.fare_cents, 158);
        let bike = engine.registry().get(1).unwrap();
        assert!((bike.position.lat - 300.0 / M_PER_DEG).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_out_of_order_telemetry_is_rejected() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;
        engine
            .append_telemetry(ride, TelemetrySample::new(0.0, 0.0, 3.0, 50.0))
            .await
            .unwrap();
        let before = engine.ride(ride).unwrap();

        let result = engine
            .append_telemetry(ride, TelemetrySample::new(0.0, 0.0001, 3.0, 50.0))
            .await;

        assert!(matches!(result, Err(EngineError::OutOfOrderSample { .. })));
        assert_eq!(engine.ride(ride).unwrap(), before);
    }

    #[tokio::test]
    async fn test_telemetry_for_unknown_ride() {
        let engine = engine();

        let result = engine
            .append_telemetry(99, TelemetrySample::new(0.0, 0.0, 3.0, 0.0))
            .await;

        assert_eq!(result, Err(EngineError::ride_not_found(99)));
    }

    #[tokio::test]
    async fn test_lock_outside_parking_keeps_ride_active() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;

        let result = engine.lock(ride, outside(), "l-1").await;

        match result {
            Err(EngineError::GeofenceViolation {
                nearest_parking, ..
            }) => {
                let nearest = nearest_parking.unwrap();
                assert!((nearest.lat - 0.001).abs() < 1e-9);
                assert!((nearest.lon - 0.001).abs() < 1e-9);
            }
            other => panic!("expected geofence violation, got {:?}", other),
        }
        assert!(engine.ride(ride).unwrap().is_active());
        assert_eq!(engine.registry().get(1).unwrap().lock_state, LockState::Unlocked);
    }

    #[tokio::test]
    async fn test_lock_rejects_non_finite_position() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;

        let nan = engine.lock(ride, GeoPoint::new(f64::NAN, 0.0), "l-1").await;
        let out_of_range = engine.lock(ride, GeoPoint::new(0.0, 181.0), "l-1").await;

        assert!(matches!(nan, Err(EngineError::InvalidSample { .. })));
        assert!(matches!(out_of_range, Err(EngineError::InvalidSample { .. })));
        assert!(engine.ride(ride).unwrap().is_active());
        // Nothing was recorded under the key
        assert!(engine.lock(ride, inside(), "l-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_refund_straight_from_ended() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;
        engine.lock(ride, inside(), "l-1").await.unwrap();

        let refunded = engine.apply_payment_notice(ride, PaymentNotice::Refunded).await.unwrap();
        let late_capture = engine.apply_payment_notice(ride, PaymentNotice::Captured).await;

        assert_eq!(refunded.state, RideState::Refunded);
        assert!(matches!(late_capture, Err(EngineError::IllegalTransition { .. })));
    }

    #[tokio::test]
    async fn test_lock_ends_ride_and_notifies() {
        let (sink, mut notices) = ChannelSink::new();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let engine = RideEngine::with_collaborators(
            EngineConfig::default(),
            zones(),
            clock.clone(),
            Arc::new(sink),
        )
        .unwrap();
        engine.registry().register(Bike::new(1, "BK-1", inside())).unwrap();

        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;
        engine
            .append_telemetry(ride, TelemetrySample::new(0.0002, 0.0002, 3.0, 0.0))
            .await
            .unwrap();
        engine
            .append_telemetry(ride, TelemetrySample::new(0.0008, 0.0008, 3.0, 60.0))
            .await
            .unwrap();
        clock.advance(chrono::Duration::seconds(60));

        let receipt = engine.lock(ride, inside(), "l-1").await.unwrap();

        assert_eq!(receipt.parking_status, ParkingStatus::Inside);
        assert_eq!(receipt.zone, 1);
        let stored = engine.ride(ride).unwrap();
        assert_eq!(receipt.ride, stored);
        assert_eq!(stored.state, RideState::Ended);
        assert_eq!(stored.metrics, receipt.metrics);
        assert_eq!(stored.ended_at, Some(clock.now()));
        let bike = engine.registry().get(1).unwrap();
        assert!(bike.is_available());
        assert_eq!(bike.position, inside());
        assert!(engine.active_ride_for_bike(1).is_none());

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.ride, ride);
        assert_eq!(notice.metrics, receipt.metrics);
    }

    #[tokio::test]
    async fn test_lock_replay_and_late_telemetry() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;

        let first = engine.lock(ride, inside(), "l-1").await.unwrap();
        let replay = engine.lock(ride, inside(), "l-1").await.unwrap();
        let fresh_key = engine.lock(ride, inside(), "l-2").await;
        let late = engine
            .append_telemetry(ride, TelemetrySample::new(0.0, 0.0, 1.0, 1.0))
            .await;

        assert_eq!(first, replay);
        assert!(matches!(fresh_key, Err(EngineError::RideNotActive { .. })));
        assert!(matches!(late, Err(EngineError::RideNotActive { .. })));
        assert_eq!(engine.registry().get(1).unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_bike_is_unlockable_after_ride() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;
        engine.lock(ride, inside(), "l-1").await.unwrap();

        let next = engine.unlock("BK-1", 7, "u-2").await.unwrap();

        assert_ne!(next.ride.id, ride);
    }

    #[tokio::test]
    async fn test_payment_notices() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;

        let early = engine.apply_payment_notice(ride, PaymentNotice::Captured).await;
        assert!(matches!(early, Err(EngineError::IllegalTransition { .. })));

        engine.lock(ride, inside(), "l-1").await.unwrap();
        let billed = engine.apply_payment_notice(ride, PaymentNotice::Captured).await.unwrap();
        assert_eq!(billed.state, RideState::Billed);

        let again = engine.apply_payment_notice(ride, PaymentNotice::Captured).await.unwrap();
        assert_eq!(again.version, billed.version);

        let refunded = engine.apply_payment_notice(ride, PaymentNotice::Refunded).await.unwrap();
        assert_eq!(refunded.state, RideState::Refunded);
    }

    #[tokio::test]
    async fn test_battery_report_during_ride_does_not_block_lock() {
        let engine = engine();
        let ride = engine.unlock("BK-1", 7, "u-1").await.unwrap().ride.id;

        engine.registry().report_battery(1, 42).unwrap();
        engine.lock(ride, inside(), "l-1").await.unwrap();

        let bike = engine.registry().get(1).unwrap();
        assert_eq!(bike.battery_pct, 42);
        assert_eq!(bike.lock_state, LockState::Locked);
    }

    #[tokio::test]
    async fn test_ended_rides_leave_no_exclusion_handles() {
        let engine = engine();
        for round in 0..5 {
            let ride = engine.unlock("BK-1", 7, &format!("u-{}", round)).await.unwrap().ride.id;
            engine
                .append_telemetry(ride, TelemetrySample::new(0.0005, 0.0005, 3.0, 0.0))
                .await
                .unwrap();
            engine.lock(ride, inside(), &format!("l-{}", round)).await.unwrap();
        }
        assert_eq!(engine.inner.rides.exclusion_len(), 0);

        // A late sample recreates the handle; pruning clears it
        let late = engine
            .append_telemetry(1, TelemetrySample::new(0.0005, 0.0005, 3.0, 9.0))
            .await;
        assert!(matches!(late, Err(EngineError::RideNotActive { .. })));
        assert_eq!(engine.inner.rides.exclusion_len(), 1);
        assert_eq!(engine.prune_exclusions(), 2);
        assert_eq!(engine.inner.rides.exclusion_len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_unlock_still_completes() {
        let engine = engine();

        let _ = tokio::time::timeout(Duration::from_nanos(1), engine.unlock("BK-1", 7, "u-1")).await;
        let receipt = engine.unlock("BK-1", 7, "u-1").await.unwrap();

        assert_eq!(engine.rides().len(), 1);
        assert_eq!(engine.ride(receipt.ride.id).unwrap().rider, 7);
    }
}
