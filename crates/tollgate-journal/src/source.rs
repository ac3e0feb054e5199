use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::broadcast;
use tollgate_events::{Event, EventId, EventKind, EventPayload, OrderedEvent};
use tracing::debug;

use crate::journal::EventJournal;

/// Capacity of the broadcast feed used by async observers
const FEED_CAPACITY: usize = 1024;

/// Handle returned when registering a listener, used to detach it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&OrderedEvent) + Send + Sync>;

struct ListenerEntry {
    id: ListenerId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Appended events waiting to reach listeners, in id order
#[derive(Default)]
struct Delivery {
    queue: VecDeque<OrderedEvent>,
    /// Set while some thread is draining `queue`
    active: bool,
}

/// Entry point for the packet layer: publishes events into the journal and
/// notifies every live listener.
///
/// Listeners run synchronously on a publishing thread, in id order, with no
/// lock of the source held. A listener may publish again: the nested event is
/// queued and delivered by the outer call once the current event has reached
/// every listener. Async observers that only need to see the stream can use
/// [`EventSource::feed`] instead.
pub struct EventSource {
    journal: Arc<EventJournal>,
    listeners: RwLock<Vec<ListenerEntry>>,
    next_listener_id: AtomicU64,
    delivery: Mutex<Delivery>,
    feed: broadcast::Sender<OrderedEvent>,
}

impl EventSource {
    pub fn new(journal: Arc<EventJournal>) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            journal,
            listeners: RwLock::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            delivery: Mutex::new(Delivery::default()),
            feed,
        }
    }

    pub fn journal(&self) -> &Arc<EventJournal> {
        &self.journal
    }

    fn delivery(&self) -> MutexGuard<'_, Delivery> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `event` to the journal and notify listeners.
    ///
    /// If another call is already delivering, including an outer `publish`
    /// on this thread, the event is handed to it and this returns at once.
    pub fn publish(&self, event: impl Into<Event>) -> EventId {
        let id = {
            // Append and enqueue together so the queue stays in id order
            let mut delivery = self.delivery();
            let ordered = self.journal.append(event.into());
            let id = ordered.id;
            delivery.queue.push_back(ordered);
            if delivery.active {
                return id;
            }
            delivery.active = true;
            id
        };

        let _draining = DrainGuard(self);
        while let Some(ordered) = self.next_to_deliver() {
            self.deliver(ordered);
        }
        id
    }

    /// Pops the next queued event, or releases the delivery role when empty
    fn next_to_deliver(&self) -> Option<OrderedEvent> {
        let mut delivery = self.delivery();
        let next = delivery.queue.pop_front();
        if next.is_none() {
            delivery.active = false;
        }
        next
    }

    fn deliver(&self, ordered: OrderedEvent) {
        let kind = ordered.kind();

        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.kind.map_or(true, |k| k == kind))
            .map(|entry| entry.listener.clone())
            .collect();

        debug!(target: "events", "Publishing {} ({}) to {} listener(s)", ordered.id, kind, listeners.len());

        for listener in listeners {
            listener(&ordered);
        }

        // No receivers is fine
        let _ = self.feed.send(ordered);
    }

    /// Register a listener for every new event
    pub fn listen<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OrderedEvent) + Send + Sync + 'static,
    {
        self.add_listener(None, Arc::new(listener))
    }

    /// Register a typed handler for one event kind
    pub fn subscribe<T, F>(&self, handler: F) -> ListenerId
    where
        T: EventPayload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add_listener(
            Some(T::KIND),
            Arc::new(move |ordered: &OrderedEvent| {
                if let Some(payload) = T::from_event(&ordered.event) {
                    handler(payload);
                }
            }),
        )
    }

    fn add_listener(&self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ListenerEntry { id, kind, listener });
        id
    }

    /// Detach a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|entry| entry.id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Receiver for the broadcast copy of every published event
    pub fn feed(&self) -> broadcast::Receiver<OrderedEvent> {
        self.feed.subscribe()
    }
}

/// Hands the delivery role back if a listener panics mid-drain
struct DrainGuard<'a>(&'a EventSource);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.delivery().active = false;
        }
    }
}

impl Default for EventSource {
    fn default() -> Self {
        Self::new(Arc::new(EventJournal::new()))
    }
}
