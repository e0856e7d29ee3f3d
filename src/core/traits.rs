//! Seams to external collaborators
//!
//! The engine talks to the outside world through these traits so that tests
//! and the simulation binary can plug in their own implementations.

use crate::types::{BikeId, RideId, RideMetrics, RiderId};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Source of wall-clock time
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Notice sent to the pricing/payment service once a ride has ended
///
/// The payment service is idempotent on `ride`, so duplicate delivery is safe.
#[derive(Debug, Clone, PartialEq)]
pub struct RideEndedNotice {
    pub ride: RideId,
    pub rider: RiderId,
    pub bike: BikeId,
    pub metrics: RideMetrics,
    pub ended_at: DateTime<Utc>,
}

/// Receiver of ride lifecycle notifications
///
/// Delivery is fire-and-forget: implementations must not block and the
/// engine ignores delivery failures beyond logging them.
pub trait RideEventSink: Send + Sync + std::fmt::Debug {
    fn ride_ended(&self, notice: RideEndedNotice);
}

/// Sink that drops every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RideEventSink for NullSink {
    fn ride_ended(&self, _notice: RideEndedNotice) {}
}

/// Sink that forwards notifications into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<RideEndedNotice>,
}

impl ChannelSink {
    /// Create a sink and the receiving end the payment service reads from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RideEndedNotice>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl RideEventSink for ChannelSink {
    fn ride_ended(&self, notice: RideEndedNotice) {
        let ride = notice.ride;
        if self.sender.send(notice).is_err() {
            warn!(ride, "payment notification dropped: receiver closed");
        }
    }
}
