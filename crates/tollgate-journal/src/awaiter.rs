use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tollgate_events::{Event, EventKind, EventPayload, OrderedEvent, SpeechReceived};
use tracing::{debug, trace};

use crate::cancellation::Cancellation;
use crate::error::JournalError;
use crate::journal::EventJournal;
use crate::source::{EventSource, ListenerId};

/// Tick of every blocking loop. Bounds how late a cancellation is observed.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Supplies the timeout `wait_any` falls back to when none is passed
pub type DefaultTimeout = Arc<dyn Fn() -> Option<Duration> + Send + Sync>;

type Predicate = Arc<dyn Fn(&Event) -> bool + Send + Sync>;
type Action = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    predicate: Option<Predicate>,
    action: Action,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        self.predicate.as_ref().map_or(true, |predicate| predicate(event))
    }
}

/// Subscriptions keyed by event kind, each list in registration order
#[derive(Clone, Default)]
struct Subscriptions {
    by_kind: HashMap<EventKind, Vec<Subscription>>,
}

impl Subscriptions {
    fn add(&mut self, kind: EventKind, subscription: Subscription) {
        self.by_kind.entry(kind).or_default().push(subscription);
    }

    fn first_match(&self, event: &Event) -> Option<Action> {
        self.by_kind
            .get(&event.kind())?
            .iter()
            .find(|subscription| subscription.matches(event))
            .map(|subscription| subscription.action.clone())
    }

    fn all_matches(&self, event: &Event) -> Vec<Action> {
        self.by_kind
            .get(&event.kind())
            .map(|list| {
                list.iter()
                    .filter(|subscription| subscription.matches(event))
                    .map(|subscription| subscription.action.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&mut self) {
        self.by_kind.clear();
    }
}

/// State shared between the producer-side listener and the polling consumer
#[derive(Default)]
struct AwaiterState {
    subscriptions: Subscriptions,
    /// First live match, claimed by `wait_any`
    winner: Option<(Action, OrderedEvent)>,
    /// Every live match in arrival order, only while `incoming` runs
    incoming: Option<VecDeque<(Action, OrderedEvent)>>,
    signaled: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<AwaiterState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AwaiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep at most one tick, or less if the producer signals
    fn wait_tick<'a>(&self, state: MutexGuard<'a, AwaiterState>) -> MutexGuard<'a, AwaiterState> {
        let (state, _) = self
            .wake
            .wait_timeout_while(state, POLL_INTERVAL, |state| !state.signaled)
            .unwrap_or_else(PoisonError::into_inner);
        state
    }

    /// Runs on the producer thread for every published event
    fn handle_new_event(&self, ordered: &OrderedEvent) {
        let mut state = self.lock();
        let Some(action) = state.subscriptions.first_match(&ordered.event) else {
            return;
        };

        if let Some(queue) = state.incoming.as_mut() {
            queue.push_back((action.clone(), ordered.clone()));
        }

        if state.winner.is_none() {
            state.winner = Some((action, ordered.clone()));
        }

        state.signaled = true;
        drop(state);
        self.wake.notify_all();
    }
}

/// Single-use consumer of the journal and the live event feed.
///
/// Register subscriptions with [`when`](Self::when) and friends, then run
/// exactly one of the protocols:
///
/// * [`wait_any`](Self::wait_any) blocks until one subscription fires once
/// * [`incoming`](Self::incoming) drains live events until cancelled
/// * [`all`](Self::all) replays everything since the journal cursor
///
/// Each protocol consumes the awaiter. The live listener is detached when the
/// awaiter is dropped, so it never outlives the call on any exit path.
pub struct EventJournalAwaiter {
    source: Arc<EventSource>,
    journal: Arc<EventJournal>,
    cancellation: Arc<dyn Cancellation>,
    default_timeout: Option<DefaultTimeout>,
    timeout_action: Option<Box<dyn FnOnce() + Send>>,
    shared: Arc<Shared>,
    listener: Option<ListenerId>,
}

impl EventJournalAwaiter {
    pub fn new(source: Arc<EventSource>, cancellation: Arc<dyn Cancellation>) -> Self {
        let shared = Arc::new(Shared::default());
        let listener_shared = shared.clone();
        let listener = source.listen(move |ordered| listener_shared.handle_new_event(ordered));
        let journal = source.journal().clone();
        // Readiness reported from here on belongs to this awaiter
        journal.awaiting_started().reset();

        Self {
            source,
            journal,
            cancellation,
            default_timeout: None,
            timeout_action: None,
            shared,
            listener: Some(listener),
        }
    }

    pub fn with_default_timeout(mut self, default_timeout: DefaultTimeout) -> Self {
        self.default_timeout = Some(default_timeout);
        self
    }

    fn subscribe(&self, kind: EventKind, predicate: Option<Predicate>, action: Action) {
        self.shared
            .lock()
            .subscriptions
            .add(kind, Subscription { predicate, action });
    }

    /// React to events of type `T` for which `predicate` holds
    pub fn when<T, P, A>(self, predicate: P, action: A) -> Self
    where
        T: EventPayload,
        P: Fn(&T) -> bool + Send + Sync + 'static,
        A: Fn(&T) + Send + Sync + 'static,
    {
        let predicate: Predicate = Arc::new(move |event: &Event| T::from_event(event).is_some_and(&predicate));
        self.subscribe(T::KIND, Some(predicate), typed_action(action));
        self
    }

    /// React to every event of type `T`
    pub fn on<T, A>(self, action: A) -> Self
    where
        T: EventPayload,
        A: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe(T::KIND, None, typed_action(action));
        self
    }

    /// React to every event of `kind` without downcasting the payload
    pub fn when_any<A>(self, kind: EventKind, action: A) -> Self
    where
        A: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe(kind, None, Arc::new(action));
        self
    }

    /// React to speech containing `text`, ignoring case
    pub fn when_speech<A>(self, text: impl Into<String>, action: A) -> Self
    where
        A: Fn() + Send + Sync + 'static,
    {
        let text = text.into();
        self.when::<SpeechReceived, _, _>(
            move |speech: &SpeechReceived| speech.contains(&text),
            move |_: &SpeechReceived| action(),
        )
    }

    /// Run `action` instead of failing when `wait_any` times out
    pub fn when_timeout<A>(mut self, action: A) -> Self
    where
        A: FnOnce() + Send + 'static,
    {
        self.timeout_action = Some(Box::new(action));
        self
    }

    fn check_cancelled(&self) -> Result<(), JournalError> {
        if self.cancellation.is_cancelled() {
            debug!(target: "awaiter", "Awaiter cancelled");
            return Err(JournalError::Cancelled);
        }
        Ok(())
    }

    fn subscriptions_snapshot(&self) -> Subscriptions {
        self.shared.lock().subscriptions.clone()
    }

    /// Wait until one subscription fires, then return.
    ///
    /// Events logged since the last single-wait consumption are checked first;
    /// otherwise the call blocks on the live feed. At most one action runs.
    pub fn wait_any(mut self, timeout: Option<Duration>) -> Result<(), JournalError> {
        let subscriptions = self.subscriptions_snapshot();
        for ordered in self.journal.pending_waits() {
            self.check_cancelled()?;

            if let Some(action) = subscriptions.first_match(&ordered.event) {
                trace!(target: "awaiter", "wait_any matched pending event {}", ordered.id);
                self.journal.mark_consumed(ordered.id);
                action(&ordered.event);
                return Ok(());
            }
        }

        self.journal.awaiting_started().set();

        let timeout = timeout.or_else(|| self.default_timeout.as_ref().and_then(|default| default()));
        let started = Instant::now();

        let (action, ordered) = loop {
            {
                let mut state = self.shared.lock();
                if let Some(winner) = state.winner.take() {
                    break winner;
                }
                let mut state = self.shared.wait_tick(state);
                if let Some(winner) = state.winner.take() {
                    break winner;
                }
                state.signaled = false;
            }

            // Cancellation and timeout are checked with the state unlocked
            self.check_cancelled()?;

            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return self.fire_timeout(timeout);
                }
            }
        };

        trace!(target: "awaiter", "wait_any matched live event {}", ordered.id);
        action(&ordered.event);
        self.journal.mark_consumed(ordered.id);
        Ok(())
    }

    fn fire_timeout(&mut self, timeout: Duration) -> Result<(), JournalError> {
        match self.timeout_action.take() {
            Some(action) => {
                debug!(target: "awaiter", "wait_any timed out after {:?}, running timeout action", timeout);
                action();
                Ok(())
            }
            None => Err(JournalError::Timeout(timeout)),
        }
    }

    /// Dispatch every matching live event until cancelled.
    ///
    /// Actions run on this thread in arrival order, never on the producer's.
    pub fn incoming(self) {
        self.shared.lock().incoming = Some(VecDeque::new());
        self.journal.awaiting_started().set();

        loop {
            let batch = {
                let mut state = self.shared.wait_tick(self.shared.lock());
                state.signaled = false;
                state.winner = None;
                state.incoming.as_mut().map(std::mem::take).unwrap_or_default()
            };

            for (action, ordered) in batch {
                trace!(target: "awaiter", "incoming dispatching {}", ordered.id);
                action(&ordered.event);
            }

            if self.cancellation.is_cancelled() {
                debug!(target: "awaiter", "incoming stopped by cancellation");
                return;
            }
        }
    }

    /// Run every matching subscription for each event logged since the
    /// journal cursor, then advance the cursor.
    ///
    /// Events appended while the scan runs are left for the next call. A
    /// cancelled scan leaves the cursor where it was.
    pub fn all(self) -> Result<(), JournalError> {
        let ceiling = self.journal.last_event_id();
        self.journal.awaiting_started().set();

        let events = self.journal.gather_since(self.journal.cursor(), ceiling);
        self.check_cancelled()?;

        let subscriptions = self.subscriptions_snapshot();
        for ordered in &events {
            self.check_cancelled()?;

            for action in subscriptions.all_matches(&ordered.event) {
                action(&ordered.event);
            }
        }

        self.journal.advance_cursor(ceiling);
        trace!(target: "awaiter", "all processed {} event(s), cursor at {}", events.len(), ceiling);
        Ok(())
    }

    fn teardown(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.source.unsubscribe(listener);
        }

        let mut state = self.shared.lock();
        state.subscriptions.clear();
        state.winner = None;
        state.incoming = None;
        state.signaled = false;
    }
}

impl Drop for EventJournalAwaiter {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn typed_action<T, A>(action: A) -> Action
where
    T: EventPayload,
    A: Fn(&T) + Send + Sync + 'static,
{
    Arc::new(move |event: &Event| {
        if let Some(payload) = T::from_event(event) {
            action(payload);
        }
    })
}
