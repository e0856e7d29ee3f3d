//! Per-key mutual exclusion
//!
//! `ExclusionTable` hands out one async mutex per key so that operations on
//! the same bike, ride or idempotency key serialize while operations on
//! different keys proceed in parallel. There is no table-wide lock: the
//! `DashMap` shard lock is held only long enough to clone the key's handle.
//!
//! Guards are owned (`OwnedMutexGuard`) so they can be held across `.await`
//! points and moved into spawned tasks.

use crate::types::EngineError;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

/// Guard proving exclusive access to one key
pub type ExclusionGuard = OwnedMutexGuard<()>;

/// Table of per-key exclusion handles
#[derive(Debug)]
pub struct ExclusionTable<K>
where
    K: Eq + Hash,
{
    handles: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> ExclusionTable<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &K) -> ExclusionGuard {
        let handle = self.handle(key);
        handle.lock_owned().await
    }

    /// Take exclusive access to `key` only if nobody holds it
    pub fn try_acquire(&self, key: &K) -> Option<ExclusionGuard> {
        self.handle(key).try_lock_owned().ok()
    }

    fn handle(&self, key: &K) -> Arc<Mutex<()>> {
        self.handles
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop `key`'s handle if nobody holds or waits on it
    ///
    /// A later `acquire` for the key creates a fresh handle.
    pub fn release(&self, key: &K) -> bool {
        self.handles
            .remove_if(key, |_, handle| Arc::strong_count(handle) == 1)
            .is_some()
    }

    /// Drop every handle nobody holds or waits on
    pub fn prune(&self) -> usize {
        let before = self.handles.len();
        self.handles.retain(|_, handle| Arc::strong_count(handle) > 1);
        before.saturating_sub(self.handles.len())
    }

    /// Number of keys with a live handle
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<K> Default for ExclusionTable<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Run a read-modify-commit step, retrying once on a version conflict
///
/// `step` must re-read its inputs on every call. A second conflict is
/// returned to the caller.
pub fn retry_once<T, F>(mut step: F) -> Result<T, EngineError>
where
    F: FnMut() -> Result<T, EngineError>,
{
    match step() {
        Err(e @ EngineError::ConcurrentModification { .. }) => {
            warn!(error = %e, "version conflict, retrying once");
            step()
        }
        other => other,
    }
}
