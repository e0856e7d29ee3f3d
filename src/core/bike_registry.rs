//! Bike registry
//!
//! This module provides the `BikeRegistry`, which owns every bike record and
//! drives the lock-state machine.
//!
//! # Design
//!
//! Records live in a `DashMap` keyed by bike id, with a second map from the
//! public scan code to the id. Every write goes through [`BikeRegistry::commit`],
//! a compare-and-swap on the record's version: the write only lands if the
//! stored version still equals the version the caller read.
//!
//! Lifecycle transitions (unlock, lock, maintenance) additionally serialize
//! on a per-bike exclusion handle. Battery reports deliberately do not take
//! the exclusion, so they can interleave with an in-flight transition; the
//! version check is what catches that.

use super::exclusion::{retry_once, ExclusionGuard, ExclusionTable};
use super::traits::Clock;
use crate::types::{Bike, BikeEvent, BikeId, BikeStatus, EngineError, GeoPoint};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Thread-safe store of fleet bikes
#[derive(Debug)]
pub struct BikeRegistry {
    bikes: DashMap<BikeId, Bike>,
    codes: DashMap<String, BikeId>,
    exclusion: ExclusionTable<BikeId>,
    clock: Arc<dyn Clock>,
}

impl BikeRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            bikes: DashMap::new(),
            codes: DashMap::new(),
            exclusion: ExclusionTable::new(),
            clock,
        }
    }

    /// Add a bike to the fleet
    ///
    /// # Errors
    ///
    /// `DuplicateBike` if the id or the scan code is already registered.
    pub fn register(&self, bike: Bike) -> Result<(), EngineError> {
        let Entry::Vacant(slot) = self.bikes.entry(bike.id) else {
            return Err(EngineError::duplicate_bike(bike.id));
        };
        match self.codes.entry(bike.qr_public_id.clone()) {
            Entry::Occupied(_) => Err(EngineError::duplicate_bike(&bike.qr_public_id)),
            Entry::Vacant(code) => {
                code.insert(bike.id);
                debug!(bike = bike.id, code = %bike.qr_public_id, "bike registered");
                slot.insert(bike);
                Ok(())
            }
        }
    }

    /// Resolve a public scan code to a bike snapshot
    pub fn find_by_code(&self, code: &str) -> Result<Bike, EngineError> {
        let id = self
            .codes
            .get(code)
            .map(|entry| *entry.value())
            .ok_or_else(|| EngineError::bike_not_found(code))?;
        self.get(id)
    }

    pub fn get(&self, id: BikeId) -> Result<Bike, EngineError> {
        self.bikes
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::bike_not_found(id))
    }

    /// All bikes sorted by id
    pub fn list(&self) -> Vec<Bike> {
        let mut bikes: Vec<Bike> = self.bikes.iter().map(|entry| entry.value().clone()).collect();
        bikes.sort_by_key(|b| b.id);
        bikes
    }

    pub fn len(&self) -> usize {
        self.bikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bikes.is_empty()
    }

    /// Wait for exclusive access to one bike's lifecycle
    pub async fn acquire(&self, id: BikeId) -> ExclusionGuard {
        self.exclusion.acquire(&id).await
    }

    /// Drop idle exclusion handles
    pub fn prune_exclusion(&self) -> usize {
        self.exclusion.prune()
    }

    /// Compare-and-swap a modified snapshot back into the registry
    ///
    /// # Arguments
    ///
    /// * `bike` - The modified snapshot
    /// * `expected_version` - The version the snapshot was read at
    ///
    /// # Returns
    ///
    /// The committed record with its bumped version, or
    /// `ConcurrentModification` if another write landed first.
    pub fn commit(&self, mut bike: Bike, expected_version: u64) -> Result<Bike, EngineError> {
        let mut entry = self
            .bikes
            .get_mut(&bike.id)
            .ok_or_else(|| EngineError::bike_not_found(bike.id))?;

        if entry.version != expected_version {
            return Err(EngineError::concurrent_modification(
                "bike",
                u64::from(bike.id),
                expected_version,
                entry.version,
            ));
        }

        bike.version = expected_version + 1;
        *entry = bike.clone();
        Ok(bike)
    }

    /// Unlock a bike for a new ride
    ///
    /// # Errors
    ///
    /// `BikeUnavailable` when the bike is in maintenance or already unlocked.
    pub async fn try_unlock(&self, id: BikeId) -> Result<Bike, EngineError> {
        let _guard = self.acquire(id).await;
        self.unlock_held(id)
    }

    /// Unlock step for callers already holding the bike's exclusion
    pub fn unlock_held(&self, id: BikeId) -> Result<Bike, EngineError> {
        retry_once(|| {
            let mut bike = self.get(id)?;
            if bike.status == BikeStatus::Maintenance {
                return Err(EngineError::bike_unavailable(id, "bike is in maintenance"));
            }
            let expected = bike.version;
            bike.lock_state = bike.lock_state.apply(id, BikeEvent::Unlock)?;
            self.commit(bike, expected)
        })
    }

    /// Undo an unlock whose ride could not start; caller holds the bike's exclusion
    ///
    /// The bike returns to locked where it stands.
    pub fn revert_unlock_held(&self, id: BikeId) -> Result<Bike, EngineError> {
        retry_once(|| {
            let mut bike = self.get(id)?;
            let expected = bike.version;
            bike.lock_state = bike.lock_state.apply(id, BikeEvent::Lock)?;
            self.commit(bike, expected)
        })
    }

    /// Lock a bike at `position`
    pub async fn lock(&self, id: BikeId, position: GeoPoint) -> Result<Bike, EngineError> {
        let _guard = self.acquire(id).await;
        self.lock_held(id, position)
    }

    /// Lock step for callers already holding the bike's exclusion
    pub fn lock_held(&self, id: BikeId, position: GeoPoint) -> Result<Bike, EngineError> {
        retry_once(|| {
            let mut bike = self.get(id)?;
            let expected = bike.version;
            bike.lock_state = bike.lock_state.apply(id, BikeEvent::Lock)?;
            bike.position = position;
            bike.last_reported_at = Some(self.clock.now());
            self.commit(bike, expected)
        })
    }

    /// Move a bike in or out of service
    pub async fn set_status(&self, id: BikeId, status: BikeStatus) -> Result<Bike, EngineError> {
        let _guard = self.acquire(id).await;
        let bike = retry_once(|| {
            let mut bike = self.get(id)?;
            let expected = bike.version;
            bike.status = status;
            self.commit(bike, expected)
        })?;
        info!(bike = id, status = ?status, "bike status changed");
        Ok(bike)
    }

    /// Record a battery reading from the bike's controller
    ///
    /// Does not take the bike's exclusion. Values above 100 are clamped.
    pub fn report_battery(&self, id: BikeId, battery_pct: u8) -> Result<Bike, EngineError> {
        retry_once(|| {
            let mut bike = self.get(id)?;
            let expected = bike.version;
            bike.battery_pct = battery_pct.min(100);
            bike.last_reported_at = Some(self.clock.now());
            self.commit(bike, expected)
        })
    }

    /// Move a bike's last known position; caller holds the bike's exclusion
    pub fn update_position(&self, id: BikeId, position: GeoPoint) -> Result<Bike, EngineError> {
        retry_once(|| {
            let mut bike = self.get(id)?;
            let expected = bike.version;
            bike.position = position;
            bike.last_reported_at = Some(self.clock.now());
            self.commit(bike, expected)
        })
    }
}
