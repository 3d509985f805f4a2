//! Subscriber registry and fan-out.
//!
//! The hub owns every subscriber queue. Register, unregister, and submit all
//! serialize on one lock around the subscriber table, so a fan-out always
//! sees a consistent snapshot of the set. Delivery onto each queue uses
//! `try_send`: a full queue drops the message for that subscriber only and
//! the submitter never waits on a slow viewer.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{
    Mutex,
    mpsc::{self, error::TryRecvError, error::TrySendError},
};
use tracing::{debug, trace};

use crate::frame::Message;

/// Pending messages a subscriber may buffer before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one fan-out. Informational only; drops are never an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub subscribers: usize,
    pub registered: u64,
    pub unregistered: u64,
    pub submitted: u64,
    pub delivered: u64,
    pub dropped: u64,
}

/// Receive end of a registered subscriber.
///
/// Yields `None` once the subscriber has been unregistered (after any
/// already queued messages) or the hub has been closed.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Message>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.receiver.try_recv()
    }
}

/// Handle to a broadcast hub. Clones share the same subscriber set.
#[derive(Clone)]
pub struct Hub {
    state: Arc<HubState>,
}

struct HubState {
    subscribers: Mutex<SubscriberTable>,
    queue_capacity: usize,
    next_id: AtomicU64,
    registered: AtomicU64,
    unregistered: AtomicU64,
    submitted: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct SubscriberTable {
    queues: HashMap<SubscriberId, mpsc::Sender<Message>>,
    // Once set, nothing is ever inserted again.
    closed: bool,
}

impl Hub {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a hub whose subscribers each buffer up to `queue_capacity`
    /// messages. A capacity of zero is treated as one.
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            state: Arc::new(HubState {
                subscribers: Mutex::new(SubscriberTable::default()),
                queue_capacity: queue_capacity.max(1),
                next_id: AtomicU64::new(1),
                registered: AtomicU64::new(0),
                unregistered: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.state.queue_capacity
    }

    /// Adds a subscriber with an empty queue. The subscriber only becomes
    /// visible to fan-out once it is fully inserted.
    ///
    /// On a closed hub the queue is released at once, so the returned
    /// subscription yields `None` on its first receive.
    pub async fn register(&self) -> Subscription {
        let id = SubscriberId(self.state.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.state.queue_capacity);

        let mut table = self.state.subscribers.lock().await;
        if table.closed {
            debug!(subscriber = %id, "hub closed, subscriber not registered");
            return Subscription { id, receiver };
        }
        table.queues.insert(id, sender);
        self.state.registered.fetch_add(1, Ordering::Relaxed);
        debug!(subscriber = %id, subscribers = table.queues.len(), "subscriber registered");

        Subscription { id, receiver }
    }

    /// Removes a subscriber and releases its queue. Returns `false` if it was
    /// already gone. No submit that starts after this returns can reach it.
    pub async fn unregister(&self, id: SubscriberId) -> bool {
        let mut table = self.state.subscribers.lock().await;
        let removed = table.queues.remove(&id).is_some();
        if removed {
            self.state.unregistered.fetch_add(1, Ordering::Relaxed);
            debug!(subscriber = %id, subscribers = table.queues.len(), "subscriber unregistered");
        }
        removed
    }

    /// Delivers `message` to every subscriber registered at this moment.
    /// Does nothing once the hub is closed.
    pub async fn submit(&self, message: impl Into<Message>) -> FanOut {
        let message = message.into();
        let mut outcome = FanOut::default();

        {
            let table = self.state.subscribers.lock().await;
            if table.closed {
                return outcome;
            }
            for (id, sender) in table.queues.iter() {
                match sender.try_send(message.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        trace!(subscriber = %id, "queue full, dropping message");
                        outcome.dropped += 1;
                    }
                    // Receiver is gone and its gateway is about to unregister.
                    Err(TrySendError::Closed(_)) => outcome.dropped += 1,
                }
            }
        }

        self.state.submitted.fetch_add(1, Ordering::Relaxed);
        self.state
            .delivered
            .fetch_add(outcome.delivered as u64, Ordering::Relaxed);
        self.state
            .dropped
            .fetch_add(outcome.dropped as u64, Ordering::Relaxed);

        outcome
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.subscribers.lock().await.queues.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.subscribers.lock().await.closed
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count().await,
            registered: self.state.registered.load(Ordering::Relaxed),
            unregistered: self.state.unregistered.load(Ordering::Relaxed),
            submitted: self.state.submitted.load(Ordering::Relaxed),
            delivered: self.state.delivered.load(Ordering::Relaxed),
            dropped: self.state.dropped.load(Ordering::Relaxed),
        }
    }

    /// Drops every subscriber queue and refuses new ones. Each subscription
    /// drains what it already holds and then ends. Returns how many
    /// subscribers were removed.
    pub async fn close(&self) -> usize {
        let mut table = self.state.subscribers.lock().await;
        table.closed = true;
        let closed = table.queues.len();
        table.queues.clear();
        debug!(closed, "hub closed");
        closed
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
