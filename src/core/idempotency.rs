//! Idempotency ledger for retried mutations
//!
//! Every keyed mutation (unlock, lock) runs through [`IdempotencyStore::execute`].
//! The store guarantees that at most one effectful execution happens per key:
//!
//! - first call for a key runs the operation and records its outcome;
//! - a later call with the same fingerprint replays the recorded outcome;
//! - a later call with a different fingerprint fails with `IdempotencyConflict`;
//! - concurrent calls for one key serialize on the key's slot, so the second
//!   caller waits for the first and then replays.
//!
//! Outcomes are stored as JSON so that one ledger serves every operation type.
//! Records are append-only: once written they are only read or purged.

use super::traits::Clock;
use crate::types::EngineError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Hash of an endpoint plus its normalized request body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a request
    ///
    /// The payload is converted to a JSON value first; object keys serialize
    /// in sorted order, so field order in the caller's struct does not matter.
    pub fn of<P: Serialize>(endpoint: &str, payload: &P) -> Result<Self, EngineError> {
        let mut envelope = serde_json::Map::new();
        envelope.insert("endpoint".to_string(), serde_json::Value::from(endpoint));
        envelope.insert("payload".to_string(), serde_json::to_value(payload)?);

        let canonical = serde_json::to_string(&serde_json::Value::Object(envelope))?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(Fingerprint(hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A recorded outcome for one idempotency key
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    pub key: String,
    pub fingerprint: Fingerprint,
    pub outcome: Result<serde_json::Value, EngineError>,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    fn replay<T: DeserializeOwned>(&self) -> Result<T, EngineError> {
        match &self.outcome {
            Ok(value) => Ok(serde_json::from_value(value.clone())?),
            Err(error) => Err(error.clone()),
        }
    }
}

type Slot = Arc<Mutex<Option<IdempotencyRecord>>>;

/// Ledger of idempotency keys and their recorded outcomes
#[derive(Debug)]
pub struct IdempotencyStore {
    slots: DashMap<String, Slot>,
    retention: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl IdempotencyStore {
    pub fn new(retention: chrono::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: DashMap::new(),
            retention,
            clock,
        }
    }

    /// Run `operation` at most once for `key`
    ///
    /// Successful results and terminal failures are recorded and replayed to
    /// later callers with the same fingerprint. Transient failures
    /// (`EngineError::is_terminal() == false`) are returned but not recorded,
    /// so the next call with the key executes again.
    pub async fn execute<T, F, Fut>(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        operation: F,
    ) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        if let Some(record) = guard.as_ref() {
            if record.fingerprint != *fingerprint {
                warn!(key, "idempotency key reused with a different payload");
                return Err(EngineError::idempotency_conflict(key));
            }
            debug!(key, "replaying recorded outcome");
            return record.replay();
        }

        let result = operation().await;

        let outcome = match &result {
            Ok(value) => match serde_json::to_value(value) {
                Ok(json) => Some(Ok(json)),
                Err(e) => {
                    warn!(key, error = %e, "outcome could not be recorded");
                    None
                }
            },
            Err(error) if error.is_terminal() => Some(Err(error.clone())),
            Err(_) => None,
        };

        if let Some(outcome) = outcome {
            *guard = Some(IdempotencyRecord {
                key: key.to_string(),
                fingerprint: fingerprint.clone(),
                outcome,
                created_at: self.clock.now(),
            });
        }

        result
    }

    fn slot(&self, key: &str) -> Slot {
        self.slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Look up the recorded outcome for a key, if one exists and is not in flight
    pub fn record(&self, key: &str) -> Option<IdempotencyRecord> {
        let slot = self.slots.get(key)?.clone();
        let guard = slot.try_lock().ok()?;
        guard.clone()
    }

    /// Drop records older than the retention window
    ///
    /// Slots that another caller currently holds or is about to lock are
    /// never removed, so purging cannot let two executions race on one key.
    pub fn purge_expired(&self) -> usize {
        let cutoff = self.clock.now() - self.retention;
        let before = self.slots.len();

        self.slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(guard) => match guard.as_ref() {
                    Some(record) => record.created_at > cutoff,
                    None => false,
                },
                Err(_) => true,
            }
        });

        let purged = before.saturating_sub(self.slots.len());
        if purged > 0 {
            debug!(purged, "purged expired idempotency records");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
