//! Fan-out of appended events to attached observers.
//!
//! Each observer owns a bounded queue. Delivery never waits: an observer whose
//! queue is full is disconnected and must re-attach to get a fresh replay.

use std::collections::HashMap;
use std::sync::Arc;

use klaude_core::{Event, ObserverId};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Why a specific observer stopped receiving events. Local to that observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ObserverDeliveryFailure {
    #[error("observer queue overflowed")]
    Overflow,
    #[error("observer disconnected")]
    Disconnected,
}

#[derive(Default)]
struct ObserverState {
    failure: Mutex<Option<ObserverDeliveryFailure>>,
}

/// The receiving end of one attached observer.
pub struct ObserverChannel {
    id: ObserverId,
    rx: mpsc::Receiver<Arc<Event>>,
    state: Arc<ObserverState>,
}

impl ObserverChannel {
    pub fn id(&self) -> &ObserverId {
        &self.id
    }

    /// Next live event. `None` once the observer is detached and its queue drained.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Arc<Event>, TryRecvError> {
        self.rx.try_recv()
    }

    /// Set when the broadcaster dropped this observer because delivery failed.
    pub fn failure(&self) -> Option<ObserverDeliveryFailure> {
        *self.state.failure.lock()
    }

    pub fn into_stream(self) -> ReceiverStream<Arc<Event>> {
        ReceiverStream::new(self.rx)
    }
}

impl std::fmt::Debug for ObserverChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverChannel")
            .field("id", &self.id)
            .field("failure", &self.failure())
            .finish()
    }
}

struct Subscriber {
    tx: mpsc::Sender<Arc<Event>>,
    state: Arc<ObserverState>,
}

/// Result of publishing one event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: Vec<(ObserverId, ObserverDeliveryFailure)>,
}

/// Registry of live subscriptions. Not synchronized itself: the session log
/// owns it behind the same lock that assigns event ids.
pub struct Broadcaster {
    subscribers: HashMap<ObserverId, Subscriber>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&mut self) -> ObserverChannel {
        let id = ObserverId::new();
        let (tx, rx) = mpsc::channel(self.capacity);
        let state = Arc::new(ObserverState::default());
        self.subscribers.insert(
            id.clone(),
            Subscriber {
                tx,
                state: Arc::clone(&state),
            },
        );
        ObserverChannel { id, rx, state }
    }

    /// Remove a subscription. Unknown or already removed ids are a no-op.
    pub fn unsubscribe(&mut self, id: &ObserverId) -> bool {
        self.subscribers.remove(id).is_some()
    }

    /// Hand an event to every subscriber without waiting on any of them.
    pub fn publish(&mut self, event: &Arc<Event>) -> Delivery {
        let mut delivery = Delivery::default();

        for (id, sub) in &self.subscribers {
            match sub.tx.try_send(Arc::clone(event)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        observer_id = %id,
                        event_id = %event.id,
                        capacity = self.capacity,
                        "observer queue full, disconnecting"
                    );
                    delivery.dropped.push((id.clone(), ObserverDeliveryFailure::Overflow));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(observer_id = %id, "observer gone, removing subscription");
                    delivery
                        .dropped
                        .push((id.clone(), ObserverDeliveryFailure::Disconnected));
                }
            }
        }

        for (id, failure) in &delivery.dropped {
            if let Some(sub) = self.subscribers.remove(id) {
                *sub.state.failure.lock() = Some(*failure);
            }
        }

        delivery
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
