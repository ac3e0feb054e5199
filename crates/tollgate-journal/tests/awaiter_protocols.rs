// Integration tests for the three awaiter protocols

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tollgate_journal::{
    Cancellation, CancellationFlag, Event, EventId, EventJournalAwaiter, EventKind, EventSource,
    JournalError, Never,
};
use tollgate_events::{MapChanged, QuestArrow, SpeechReceived};

fn speech(text: &str) -> SpeechReceived {
    SpeechReceived {
        speaker_id: Some(0x4000_0001),
        name: "Guard".to_string(),
        text: text.to_string(),
        color: 0x0035,
    }
}

fn new_source() -> Arc<EventSource> {
    Arc::new(EventSource::default())
}

fn awaiter(source: &Arc<EventSource>) -> EventJournalAwaiter {
    EventJournalAwaiter::new(source.clone(), Arc::new(Never))
}

fn awaiter_with(source: &Arc<EventSource>, cancellation: &CancellationFlag) -> EventJournalAwaiter {
    let cancellation: Arc<dyn Cancellation> = Arc::new(cancellation.clone());
    EventJournalAwaiter::new(source.clone(), cancellation)
}

/// Publish `events` from another thread once the consumer has started waiting
fn produce_when_awaiting(
    source: &Arc<EventSource>,
    events: Vec<(Duration, SpeechReceived)>,
) -> thread::JoinHandle<()> {
    let source = source.clone();
    thread::spawn(move || {
        assert!(source.journal().awaiting_started().wait(Duration::from_secs(5)));
        for (delay, event) in events {
            thread::sleep(delay);
            source.publish(event);
        }
    })
}

// ============================================================================
// all()
// ============================================================================

#[test]
fn test_all_replays_hello_world_once() {
    let source = new_source();
    let journal = source.journal().clone();
    assert_eq!(journal.last_event_id(), EventId::MIN);
    assert_eq!(journal.cursor(), EventId::MIN);

    let id = source.publish(speech("hello world"));
    assert_eq!(id, EventId::new(1));

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    awaiter(&source)
        .when_speech("hello", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .all()
        .unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(journal.cursor(), EventId::new(1));

    let counter = fired.clone();
    awaiter(&source)
        .when_speech("hello", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .all()
        .unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(journal.cursor(), EventId::new(1));
}

#[test]
fn test_all_fans_out_to_every_matching_subscription_in_order() {
    let source = new_source();
    source.publish(speech("bank"));

    let order = Arc::new(Mutex::new(Vec::new()));
    let first = order.clone();
    let second = order.clone();

    awaiter(&source)
        .on::<SpeechReceived, _>(move |_| first.lock().unwrap().push("first"))
        .when::<SpeechReceived, _, _>(
            |speech| speech.contains("BANK"),
            move |_| second.lock().unwrap().push("second"),
        )
        .all()
        .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
}

#[test]
fn test_when_any_matches_by_kind() {
    let source = new_source();
    source.publish(MapChanged { map_id: 1 });
    source.publish(speech("ignored"));
    source.publish(MapChanged { map_id: 4 });

    let maps = Arc::new(Mutex::new(Vec::new()));
    let sink = maps.clone();
    awaiter(&source)
        .when_any(EventKind::MapChanged, move |event| {
            if let Event::MapChanged(map) = event {
                sink.lock().unwrap().push(map.map_id);
            }
        })
        .all()
        .unwrap();

    assert_eq!(*maps.lock().unwrap(), vec![1, 4]);
}

#[test]
fn test_all_dispatches_in_id_order_and_skips_other_kinds() {
    let source = new_source();
    source.publish(speech("one"));
    source.publish(MapChanged { map_id: 3 });
    source.publish(speech("two"));

    let texts = Arc::new(Mutex::new(Vec::new()));
    let sink = texts.clone();
    awaiter(&source)
        .on::<SpeechReceived, _>(move |speech| sink.lock().unwrap().push(speech.text.clone()))
        .all()
        .unwrap();

    assert_eq!(*texts.lock().unwrap(), vec!["one".to_string(), "two".to_string()]);
    assert_eq!(source.journal().cursor(), EventId::new(3));
}

#[test]
fn test_cancelled_all_does_not_advance_cursor() {
    let source = new_source();
    source.publish(speech("stale"));

    let flag = CancellationFlag::new();
    flag.cancel();

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let result = awaiter_with(&source, &flag)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .all();

    assert_eq!(result, Err(JournalError::Cancelled));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(source.journal().cursor(), EventId::MIN);
}

#[test]
fn test_all_cancelled_mid_scan_replays_on_retry() {
    let source = new_source();
    source.publish(speech("a"));
    source.publish(speech("b"));

    let flag = CancellationFlag::new();
    let cancel_after_first = flag.clone();
    let result = awaiter_with(&source, &flag)
        .on::<SpeechReceived, _>(move |_| cancel_after_first.cancel())
        .all();
    assert_eq!(result, Err(JournalError::Cancelled));
    assert_eq!(source.journal().cursor(), EventId::MIN);

    let replayed = Arc::new(AtomicUsize::new(0));
    let counter = replayed.clone();
    awaiter(&source)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .all()
        .unwrap();
    assert_eq!(replayed.load(Ordering::SeqCst), 2);
}

// ============================================================================
// wait_any()
// ============================================================================

#[test]
fn test_wait_any_fires_exactly_one_action_for_live_event() {
    let source = new_source();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let first = fired.clone();
    let second = fired.clone();

    let producer = produce_when_awaiting(&source, vec![(Duration::ZERO, speech("open the gate"))]);

    awaiter(&source)
        .when_speech("gate", move || first.lock().unwrap().push("first"))
        .on::<SpeechReceived, _>(move |_| second.lock().unwrap().push("second"))
        .wait_any(Some(Duration::from_secs(5)))
        .unwrap();
    producer.join().unwrap();

    assert_eq!(*fired.lock().unwrap(), vec!["first"]);
    assert_eq!(source.journal().last_consumed(), EventId::new(1));
    assert_eq!(source.journal().cursor(), EventId::MIN);
}

#[test]
fn test_wait_any_ignores_non_matching_live_events() {
    let source = new_source();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();

    let producer = produce_when_awaiting(
        &source,
        vec![
            (Duration::ZERO, speech("nothing here")),
            (Duration::from_millis(5), speech("you see a treasure chest")),
        ],
    );

    awaiter(&source)
        .when::<SpeechReceived, _, _>(
            |speech| speech.contains("treasure"),
            move |speech| sink.lock().unwrap().push(speech.text.clone()),
        )
        .wait_any(Some(Duration::from_secs(5)))
        .unwrap();
    producer.join().unwrap();

    assert_eq!(*fired.lock().unwrap(), vec!["you see a treasure chest".to_string()]);
}

#[test]
fn test_wait_any_consumes_pending_event_without_blocking() {
    let source = new_source();
    source.publish(QuestArrow {
        active: true,
        location: Default::default(),
    });

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let started = Instant::now();
    awaiter(&source)
        .on::<QuestArrow, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wait_any(Some(Duration::from_secs(5)))
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Already consumed, so the next wait has nothing pending
    let result = awaiter(&source)
        .on::<QuestArrow, _>(|_| {})
        .wait_any(Some(Duration::from_millis(30)));
    assert_eq!(result, Err(JournalError::Timeout(Duration::from_millis(30))));
}

#[test]
fn test_wait_any_times_out_within_a_tick() {
    let source = new_source();
    let started = Instant::now();

    let result = awaiter(&source)
        .on::<SpeechReceived, _>(|_| {})
        .wait_any(Some(Duration::from_millis(50)));

    let elapsed = started.elapsed();
    assert_eq!(result, Err(JournalError::Timeout(Duration::from_millis(50))));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(250), "took {:?}", elapsed);
}

#[test]
fn test_wait_any_runs_timeout_action_instead_of_failing() {
    let source = new_source();
    let timed_out = Arc::new(AtomicUsize::new(0));
    let counter = timed_out.clone();

    let result = awaiter(&source)
        .on::<SpeechReceived, _>(|_| panic!("no speech was published"))
        .when_timeout(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wait_any(Some(Duration::from_millis(50)));

    assert_eq!(result, Ok(()));
    assert_eq!(timed_out.load(Ordering::SeqCst), 1);
}

#[test]
fn test_wait_any_uses_default_timeout() {
    let source = new_source();
    let result = awaiter(&source)
        .with_default_timeout(Arc::new(|| Some(Duration::from_millis(20))))
        .on::<SpeechReceived, _>(|_| {})
        .wait_any(None);

    assert_eq!(result, Err(JournalError::Timeout(Duration::from_millis(20))));
}

#[test]
fn test_wait_any_cancellation_is_observed_within_a_tick() {
    let source = new_source();
    let flag = CancellationFlag::new();

    let canceller = {
        let flag = flag.clone();
        let source = source.clone();
        thread::spawn(move || {
            assert!(source.journal().awaiting_started().wait(Duration::from_secs(5)));
            thread::sleep(Duration::from_millis(30));
            flag.cancel();
            Instant::now()
        })
    };

    let result = awaiter_with(&source, &flag)
        .on::<SpeechReceived, _>(|_| {})
        .wait_any(None);
    let returned = Instant::now();
    let cancelled_at = canceller.join().unwrap();

    assert_eq!(result, Err(JournalError::Cancelled));
    let latency = returned.saturating_duration_since(cancelled_at);
    assert!(latency < Duration::from_millis(100), "latency {:?}", latency);
}

#[test]
fn test_cancellation_check_may_publish_to_the_same_source() {
    let source = new_source();
    let published = Arc::new(AtomicBool::new(false));

    let check_source = source.clone();
    let check_published = published.clone();
    let cancellation: Arc<dyn Cancellation> = Arc::new(move || {
        if !check_published.swap(true, Ordering::SeqCst) {
            check_source.publish(speech("from the check"));
        }
        false
    });

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let waiter = EventJournalAwaiter::new(source.clone(), cancellation).when_speech("check", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let (done_tx, done_rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = done_tx.send(waiter.wait_any(Some(Duration::from_secs(5))));
    });

    let result = done_rx.recv_timeout(Duration::from_secs(2)).expect("wait_any must not stall");
    assert_eq!(result, Ok(()));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn test_wait_any_detaches_listener_on_every_exit_path() {
    let source = new_source();
    let fired = Arc::new(AtomicUsize::new(0));

    // Timeout
    let counter = fired.clone();
    let _ = awaiter(&source)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wait_any(Some(Duration::from_millis(20)));
    assert_eq!(source.listener_count(), 0);

    // Cancellation
    let flag = CancellationFlag::new();
    flag.cancel();
    let counter = fired.clone();
    let _ = awaiter_with(&source, &flag)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wait_any(None);
    assert_eq!(source.listener_count(), 0);

    // Dropped without running a protocol
    drop(awaiter(&source).on::<SpeechReceived, _>(|_| {}));
    assert_eq!(source.listener_count(), 0);

    source.publish(speech("late"));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
}

#[test]
fn test_wait_any_detaches_listener_after_a_match() {
    let source = new_source();
    let fired = Arc::new(AtomicUsize::new(0));

    // Live match
    let producer = produce_when_awaiting(&source, vec![(Duration::ZERO, speech("bank"))]);
    let counter = fired.clone();
    awaiter(&source)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wait_any(Some(Duration::from_secs(5)))
        .unwrap();
    producer.join().unwrap();
    assert_eq!(source.listener_count(), 0);

    // Pending match
    source.publish(speech("bank again"));
    let counter = fired.clone();
    awaiter(&source)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .wait_any(Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(source.listener_count(), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 2);

    source.publish(speech("bank once more"));
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn test_awaiting_started_reports_each_consumer_separately() {
    let source = new_source();
    source.publish(speech("earlier"));
    awaiter(&source).on::<SpeechReceived, _>(|_| {}).all().unwrap();

    // Built but not yet waiting
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let second = awaiter(&source).when_speech("now", move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(!source.journal().awaiting_started().wait(Duration::from_millis(50)));

    let consumer = thread::spawn(move || second.wait_any(Some(Duration::from_secs(5))));
    assert!(source.journal().awaiting_started().wait(Duration::from_secs(5)));
    assert!(!source.journal().awaiting_started().is_set());

    source.publish(speech("now"));
    assert_eq!(consumer.join().unwrap(), Ok(()));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

// ============================================================================
// incoming()
// ============================================================================

#[test]
fn test_incoming_dispatches_in_arrival_order() {
    let source = new_source();
    let flag = CancellationFlag::new();
    let received = Arc::new(Mutex::new(Vec::new()));
    let consumer_thread = Arc::new(Mutex::new(Vec::new()));

    let consumer = {
        let awaiter = {
            let sink = received.clone();
            let threads = consumer_thread.clone();
            awaiter_with(&source, &flag).on::<SpeechReceived, _>(move |speech| {
                threads.lock().unwrap().push(thread::current().id());
                sink.lock().unwrap().push(speech.text.clone());
            })
        };
        thread::spawn(move || {
            let id = thread::current().id();
            awaiter.incoming();
            id
        })
    };

    let producer = produce_when_awaiting(
        &source,
        vec![
            (Duration::ZERO, speech("E1")),
            (Duration::from_millis(5), speech("E2")),
            (Duration::ZERO, speech("E3")),
        ],
    );
    producer.join().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while received.lock().unwrap().len() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    flag.cancel();
    let consumer_id = consumer.join().unwrap();

    assert_eq!(
        *received.lock().unwrap(),
        vec!["E1".to_string(), "E2".to_string(), "E3".to_string()]
    );
    assert!(consumer_thread.lock().unwrap().iter().all(|id| *id == consumer_id));
    assert_eq!(source.listener_count(), 0);
}

#[test]
fn test_incoming_exits_cleanly_when_cancelled() {
    let source = new_source();
    let flag = CancellationFlag::new();

    let consumer = {
        let awaiter = awaiter_with(&source, &flag).on::<SpeechReceived, _>(|_| {});
        thread::spawn(move || awaiter.incoming())
    };

    assert!(source.journal().awaiting_started().wait(Duration::from_secs(5)));
    let cancelled_at = Instant::now();
    flag.cancel();
    consumer.join().unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_millis(200));
    assert_eq!(source.listener_count(), 0);
}

#[test]
fn test_wait_any_and_all_track_positions_independently() {
    let source = new_source();
    source.publish(speech("first"));

    awaiter(&source)
        .on::<SpeechReceived, _>(|_| {})
        .wait_any(Some(Duration::from_secs(1)))
        .unwrap();
    assert_eq!(source.journal().cursor(), EventId::MIN);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    awaiter(&source)
        .on::<SpeechReceived, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .all()
        .unwrap();

    // Consumed by wait_any, still replayed by the catch-up protocol
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}
