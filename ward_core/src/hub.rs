//! Broadcast Hub - fan-out of one serialized message per tick.
//!
//! # Locking
//!
//! The subscriber map is only touched under its mutex, and never across
//! a send:
//!
//! 1. lock, clone the senders, unlock
//! 2. serialize once, `try_send` to each snapshot member
//! 3. lock, remove exactly the members whose send failed, unlock
//!
//! A subscriber added between (1) and (3) is not part of the snapshot and
//! so neither receives this message nor risks removal.

use crate::events::{encode, WardEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Opaque subscriber identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving end of a subscription. Dropping it closes the queue, and
/// the next broadcast removes the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<String>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next message; `None` once the hub has dropped us.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }

    /// Returns a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

/// Outcome of one `broadcast` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    pub broadcasts: u64,
    pub payloads_serialized: u64,
    pub messages_delivered: u64,
    pub subscribers_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    broadcasts: AtomicU64,
    payloads_serialized: AtomicU64,
    messages_delivered: AtomicU64,
    subscribers_dropped: AtomicU64,
}

/// Subscriber registry and fan-out.
#[derive(Debug)]
pub struct BroadcastHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<String>>>,
    buffer: usize,
    counters: Counters,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl BroadcastHub {
    /// Creates a hub whose subscriptions queue up to `buffer` messages.
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
            counters: Counters::default(),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<String>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = SubscriberId::new();
        self.subscribers().insert(id, tx);
        debug!(subscriber = %id, "Subscriber added");
        Subscription { id, receiver: rx }
    }

    /// Removes a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers().remove(&id).is_some();
        if removed {
            debug!(subscriber = %id, "Subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Sends `event` to every current subscriber; failed ones are dropped.
    pub fn broadcast(
        &self,
        event: &WardEvent,
        at: SystemTime,
    ) -> Result<BroadcastReport, serde_json::Error> {
        self.counters.broadcasts.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<(SubscriberId, mpsc::Sender<String>)> = self
            .subscribers()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();
        if snapshot.is_empty() {
            return Ok(BroadcastReport::default());
        }

        let payload = encode(event, at)?;
        self.counters.payloads_serialized.fetch_add(1, Ordering::Relaxed);

        let mut failed = Vec::new();
        for (id, tx) in &snapshot {
            if let Err(e) = tx.try_send(payload.clone()) {
                let cause = match e {
                    mpsc::error::TrySendError::Full(_) => "queue full",
                    mpsc::error::TrySendError::Closed(_) => "receiver closed",
                };
                warn!(subscriber = %id, cause, "Dropping subscriber");
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut subscribers = self.subscribers();
            for id in &failed {
                subscribers.remove(id);
            }
        }

        let report = BroadcastReport {
            delivered: snapshot.len() - failed.len(),
            dropped: failed.len(),
        };
        self.counters
            .messages_delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.counters
            .subscribers_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        debug!(
            kind = event.kind(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast complete"
        );
        Ok(report)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            broadcasts: self.counters.broadcasts.load(Ordering::Relaxed),
            payloads_serialized: self.counters.payloads_serialized.load(Ordering::Relaxed),
            messages_delivered: self.counters.messages_delivered.load(Ordering::Relaxed),
            subscribers_dropped: self.counters.subscribers_dropped.load(Ordering::Relaxed),
        }
    }
}
