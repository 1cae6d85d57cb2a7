use std::sync::Arc;

use chrono::Utc;
use klaude_core::{Event, EventId, InvalidEventError, NewEvent, ObserverId, SessionId, TaskId};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::{Broadcaster, ObserverChannel, ObserverDeliveryFailure};
use crate::index::{NodeId, NodeStatus, TaskTreeIndex};

/// Default bound of each observer's live queue.
pub const DEFAULT_OBSERVER_QUEUE: usize = 1024;

struct LogState {
    events: Vec<Arc<Event>>,
    index: TaskTreeIndex,
    broadcaster: Broadcaster,
    next_id: EventId,
}

/// Append-only, strictly ordered record of one conversation.
///
/// All mutation goes through [`SessionLog::append`]. Id assignment, validation,
/// index update and hand-off to observers happen under one lock, so every
/// observer sees the same total order and `attach` can take a snapshot and
/// subscribe without a gap or a duplicate.
pub struct SessionLog {
    session_id: SessionId,
    state: Mutex<LogState>,
}

impl SessionLog {
    pub fn new(observer_queue_capacity: usize) -> Self {
        Self::with_session_id(SessionId::new(), observer_queue_capacity)
    }

    pub fn with_session_id(session_id: SessionId, observer_queue_capacity: usize) -> Self {
        Self {
            session_id,
            state: Mutex::new(LogState {
                events: Vec::new(),
                index: TaskTreeIndex::new(),
                broadcaster: Broadcaster::new(observer_queue_capacity),
                next_id: EventId::FIRST,
            }),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Validate, number and record an event, then hand it to every attached observer.
    ///
    /// Delivery has been attempted for all current observers by the time this returns.
    #[instrument(skip_all, fields(session_id = %self.session_id, event_type = event.kind.event_type()))]
    pub fn append(&self, event: NewEvent) -> Result<Arc<Event>, InvalidEventError> {
        let mut state = self.state.lock();

        if let Err(e) = state.index.validate(&event) {
            warn!(kind = e.kind(), error = %e, "rejected event");
            return Err(e);
        }

        let id = state.next_id;
        let event = Arc::new(event.into_event(id, self.session_id.clone(), Utc::now()));
        state.index.record(&event);
        state.events.push(Arc::clone(&event));
        state.next_id = id.next();

        let delivery = state.broadcaster.publish(&event);
        debug!(event_id = %id, delivered = delivery.delivered, "appended event");
        for (observer_id, failure) in &delivery.dropped {
            match failure {
                ObserverDeliveryFailure::Overflow => {
                    warn!(observer_id = %observer_id, reason = %failure, "observer detached")
                }
                ObserverDeliveryFailure::Disconnected => {
                    info!(observer_id = %observer_id, reason = %failure, "observer detached")
                }
            }
        }

        Ok(event)
    }

    /// Every event appended so far, in id order.
    pub fn snapshot(&self) -> Vec<Arc<Event>> {
        self.state.lock().events.clone()
    }

    /// Take a replay snapshot and subscribe to the live feed as one atomic step.
    ///
    /// The channel's first event is the one right after the last replayed event.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub fn attach(&self) -> (Vec<Arc<Event>>, ObserverChannel) {
        let mut state = self.state.lock();
        let replay = state.events.clone();
        let channel = state.broadcaster.subscribe();
        info!(
            observer_id = %channel.id(),
            replayed = replay.len(),
            observers = state.broadcaster.len(),
            "observer attached"
        );
        (replay, channel)
    }

    /// Stop delivering to an observer. Unknown or already detached ids are a no-op.
    pub fn detach(&self, observer_id: &ObserverId) -> bool {
        let removed = self.state.lock().broadcaster.unsubscribe(observer_id);
        if removed {
            info!(session_id = %self.session_id, observer_id = %observer_id, "observer detached");
        }
        removed
    }

    pub fn children_of(&self, task_id: &TaskId) -> Vec<NodeId> {
        self.state.lock().index.children_of(task_id).to_vec()
    }

    pub fn status_of(&self, node: &NodeId) -> NodeStatus {
        self.state.lock().index.status_of(node)
    }

    /// Copy of the incrementally maintained index.
    pub fn index(&self) -> TaskTreeIndex {
        self.state.lock().index.clone()
    }

    /// Index re-derived from a replay of the current snapshot.
    pub fn rebuild_index(&self) -> Result<TaskTreeIndex, InvalidEventError> {
        let snapshot = self.snapshot();
        TaskTreeIndex::rebuild(snapshot.iter().map(Arc::as_ref))
    }

    /// Snapshot and incremental index taken under the same lock.
    pub fn snapshot_with_index(&self) -> (Vec<Arc<Event>>, TaskTreeIndex) {
        let state = self.state.lock();
        (state.events.clone(), state.index.clone())
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    pub fn observer_count(&self) -> usize {
        self.state.lock().broadcaster.len()
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_QUEUE)
    }
}

impl std::fmt::Debug for SessionLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLog")
            .field("session_id", &self.session_id)
            .field("events", &self.len())
            .finish()
    }
}
