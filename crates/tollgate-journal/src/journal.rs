use std::sync::{Condvar, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tollgate_events::{Event, EventId, OrderedEvent};
use tracing::{trace, warn};

/// Auto-reset readiness signal raised when a consumption call starts scanning.
///
/// Callers that perform an action and then expect a script to observe its
/// result can wait on this first so the action does not race ahead of the
/// script's subscription. A successful [`wait`](Self::wait) consumes the
/// signal, and constructing a new awaiter clears it.
#[derive(Debug, Default)]
pub struct AwaitingStarted {
    started: Mutex<bool>,
    signal: Condvar,
}

impl AwaitingStarted {
    pub fn set(&self) {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        *started = true;
        self.signal.notify_all();
    }

    pub fn reset(&self) {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_set(&self) -> bool {
        *self.started.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the signal is set or `timeout` elapses, consuming it.
    /// Returns whether it was set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut started, _) = self
            .signal
            .wait_timeout_while(started, timeout, |started| !*started)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *started, false)
    }
}

#[derive(Debug, Default)]
struct JournalState {
    log: Vec<OrderedEvent>,
    last_event_id: EventId,
    /// Catch-up position, advanced by `all`
    cursor: EventId,
    /// Single-wait position, advanced by `mark_consumed`
    last_consumed: EventId,
}

impl JournalState {
    fn range(&self, from: EventId, to: EventId) -> Vec<OrderedEvent> {
        let start = self.log.partition_point(|ev| ev.id <= from);
        self.log[start..]
            .iter()
            .take_while(|ev| ev.id <= to)
            .cloned()
            .collect()
    }
}

/// Append-only, strictly ordered log of domain events.
///
/// The journal tracks two consumer positions that never influence each other:
/// the catch-up `cursor` and the single-wait `last_consumed` mark.
#[derive(Debug, Default)]
pub struct EventJournal {
    state: RwLock<JournalState>,
    awaiting_started: AwaitingStarted,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, JournalState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JournalState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `event` under the next id and return it
    pub fn append(&self, event: Event) -> OrderedEvent {
        let mut state = self.write();
        let id = state.last_event_id.next();
        let ordered = OrderedEvent::new(id, event);
        state.log.push(ordered.clone());
        state.last_event_id = id;
        trace!(target: "journal", "Appended {} ({})", id, ordered.kind());
        ordered
    }

    pub fn last_event_id(&self) -> EventId {
        self.read().last_event_id
    }

    pub fn cursor(&self) -> EventId {
        self.read().cursor
    }

    pub fn last_consumed(&self) -> EventId {
        self.read().last_consumed
    }

    pub fn len(&self) -> usize {
        self.read().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().log.is_empty()
    }

    /// Events with `from < id <= to`, ascending
    pub fn gather_since(&self, from: EventId, to: EventId) -> Vec<OrderedEvent> {
        self.read().range(from, to)
    }

    pub fn advance_cursor(&self, id: EventId) {
        let mut state = self.write();
        if id < state.cursor {
            warn!(target: "journal", "Refusing to move cursor back from {} to {}", state.cursor, id);
            return;
        }
        state.cursor = id;
    }

    /// Record that a single-wait consumer handled the event `id`
    pub fn mark_consumed(&self, id: EventId) {
        let mut state = self.write();
        if id > state.last_consumed {
            state.last_consumed = id;
        }
    }

    /// Events a single-wait consumer has not handled yet, ascending
    pub fn pending_waits(&self) -> Vec<OrderedEvent> {
        let state = self.read();
        state.range(state.last_consumed, state.last_event_id)
    }

    /// Treat everything logged so far as seen by single-wait consumers
    pub fn discard_pending_waits(&self) {
        let mut state = self.write();
        state.last_consumed = state.last_event_id;
    }

    pub fn awaiting_started(&self) -> &AwaitingStarted {
        &self.awaiting_started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tollgate_events::{QuestArrow, SpeechReceived};

    fn speech(text: &str) -> Event {
        Event::SpeechReceived(SpeechReceived {
            speaker_id: None,
            name: "System".to_string(),
            text: text.to_string(),
            color: 0,
        })
    }

    #[test]
    fn test_new_journal_is_empty() {
        let journal = EventJournal::new();
        assert!(journal.is_empty());
        assert_eq!(journal.last_event_id(), EventId::MIN);
        assert_eq!(journal.cursor(), EventId::MIN);
    }

    #[test]
    fn test_gather_returns_all_events_in_order() {
        let journal = EventJournal::new();
        for i in 0..10 {
            journal.append(speech(&format!("line {}", i)));
        }

        let events = journal.gather_since(EventId::MIN, journal.last_event_id());
        assert_eq!(events.len(), 10);
        assert!(events.windows(2).all(|pair| pair[0].id < pair[1].id));
        assert!(events[0].id > EventId::MIN);
    }

    #[test]
    fn test_gather_bounds_are_exclusive_inclusive() {
        let journal = EventJournal::new();
        let ids: Vec<EventId> = (0..5).map(|i| journal.append(speech(&i.to_string())).id).collect();

        let events = journal.gather_since(ids[1], ids[3]);
        let gathered: Vec<EventId> = events.iter().map(|ev| ev.id).collect();
        assert_eq!(gathered, vec![ids[2], ids[3]]);

        assert!(journal.gather_since(ids[4], ids[4]).is_empty());
    }

    #[test]
    fn test_cursor_never_moves_backwards() {
        let journal = EventJournal::new();
        journal.append(speech("a"));
        journal.append(speech("b"));

        journal.advance_cursor(EventId::new(2));
        journal.advance_cursor(EventId::new(1));
        assert_eq!(journal.cursor(), EventId::new(2));
    }

    #[test]
    fn test_consumed_mark_is_independent_of_cursor() {
        let journal = EventJournal::new();
        let first = journal.append(speech("a")).id;
        journal.append(Event::QuestArrow(QuestArrow {
            active: true,
            location: Default::default(),
        }));

        journal.mark_consumed(first);
        assert_eq!(journal.cursor(), EventId::MIN);
        assert_eq!(journal.pending_waits().len(), 1);

        journal.discard_pending_waits();
        assert!(journal.pending_waits().is_empty());
        assert_eq!(journal.cursor(), EventId::MIN);
    }

    #[test]
    fn test_awaiting_started_wakes_waiter() {
        let journal = Arc::new(EventJournal::new());
        let signal_journal = journal.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            signal_journal.awaiting_started().set();
        });

        assert!(journal.awaiting_started().wait(Duration::from_secs(2)));
        handle.join().unwrap();

        journal.awaiting_started().set();
        journal.awaiting_started().reset();
        assert!(!journal.awaiting_started().wait(Duration::from_millis(10)));
    }

    #[test]
    fn test_awaiting_started_is_consumed_by_wait() {
        let journal = EventJournal::new();
        journal.awaiting_started().set();

        assert!(journal.awaiting_started().wait(Duration::from_millis(10)));
        assert!(!journal.awaiting_started().is_set());
        assert!(!journal.awaiting_started().wait(Duration::from_millis(10)));
    }
}
