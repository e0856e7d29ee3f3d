//! Ride storage
//!
//! Rides are kept in an arena keyed by id. Two secondary indexes track the
//! single active ride a bike or rider may have. Like the bike registry,
//! writes are version-checked and lifecycle steps serialize on a per-ride
//! exclusion handle.

use super::exclusion::{ExclusionGuard, ExclusionTable};
use crate::types::{BikeId, EngineError, Ride, RideId, RiderId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe ride arena
#[derive(Debug)]
pub struct RideStore {
    rides: DashMap<RideId, Ride>,
    active_by_bike: DashMap<BikeId, RideId>,
    active_by_rider: DashMap<RiderId, RideId>,
    next_id: AtomicU64,
    exclusion: ExclusionTable<RideId>,
}

impl RideStore {
    pub fn new() -> Self {
        Self {
            rides: DashMap::new(),
            active_by_bike: DashMap::new(),
            active_by_rider: DashMap::new(),
            next_id: AtomicU64::new(1),
            exclusion: ExclusionTable::new(),
        }
    }

    /// Reserve a fresh ride id
    pub fn next_id(&self) -> RideId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Store a newly started ride and index it as its bike's and rider's
    /// active ride
    ///
    /// The rider's slot stays locked until the ride is in the arena, so a
    /// competing start never reports a ride that does not exist.
    ///
    /// # Errors
    ///
    /// `RiderHasActiveRide` if the rider already has an active ride.
    pub fn start(&self, ride: Ride) -> Result<Ride, EngineError> {
        match self.active_by_rider.entry(ride.rider) {
            Entry::Occupied(existing) => Err(EngineError::rider_has_active_ride(ride.rider, *existing.get())),
            Entry::Vacant(slot) => {
                self.rides.insert(ride.id, ride.clone());
                self.active_by_bike.insert(ride.bike, ride.id);
                slot.insert(ride.id);
                Ok(ride)
            }
        }
    }

    pub fn get(&self, id: RideId) -> Result<Ride, EngineError> {
        self.rides
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::ride_not_found(id))
    }

    /// Compare-and-swap a modified ride back into the arena
    ///
    /// A ride leaving the active state is dropped from the active indexes.
    pub fn commit(&self, mut ride: Ride, expected_version: u64) -> Result<Ride, EngineError> {
        {
            let mut entry = self
                .rides
                .get_mut(&ride.id)
                .ok_or_else(|| EngineError::ride_not_found(ride.id))?;

            if entry.version != expected_version {
                return Err(EngineError::concurrent_modification(
                    "ride",
                    ride.id,
                    expected_version,
                    entry.version,
                ));
            }

            ride.version = expected_version + 1;
            *entry = ride.clone();
        }

        if !ride.is_active() {
            self.active_by_bike.remove_if(&ride.bike, |_, held| *held == ride.id);
            self.active_by_rider.remove_if(&ride.rider, |_, held| *held == ride.id);
        }
        Ok(ride)
    }

    pub fn active_for_bike(&self, bike: BikeId) -> Option<Ride> {
        let id = *self.active_by_bike.get(&bike)?.value();
        self.get(id).ok()
    }

    pub fn active_for_rider(&self, rider: RiderId) -> Option<RideId> {
        self.active_by_rider.get(&rider).map(|entry| *entry.value())
    }

    /// All rides sorted by id
    pub fn list(&self) -> Vec<Ride> {
        let mut rides: Vec<Ride> = self.rides.iter().map(|entry| entry.value().clone()).collect();
        rides.sort_by_key(|r| r.id);
        rides
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }

    /// Wait for exclusive access to one ride's lifecycle
    pub async fn acquire(&self, id: RideId) -> ExclusionGuard {
        self.exclusion.acquire(&id).await
    }

    /// Drop an ended ride's exclusion handle if it is idle
    pub fn release_exclusion(&self, id: RideId) -> bool {
        self.exclusion.release(&id)
    }

    /// Drop idle exclusion handles
    pub fn prune_exclusion(&self) -> usize {
        self.exclusion.prune()
    }

    /// Number of live exclusion handles
    pub fn exclusion_len(&self) -> usize {
        self.exclusion.len()
    }
}

impl Default for RideStore {
    fn default() -> Self {
        Self::new()
    }
}
