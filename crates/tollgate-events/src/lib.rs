//! Domain event types for tollgate
//!
//! Every packet the proxy understands is republished as one of the events in
//! this crate. Events are immutable once created; the journal wraps them in an
//! [`OrderedEvent`] carrying the id that orders them.
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::Display;

// ============================================================================
// Event identity
// ============================================================================

/// Position of an event in the journal.
///
/// Assigned at append time and strictly increasing; it is the only ordering
/// and deduplication key an event has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    /// Watermark of an empty journal. No event ever carries this id.
    pub const MIN: EventId = EventId(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Event payloads
// ============================================================================

/// A map coordinate as sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location2D {
    pub x: u16,
    pub y: u16,
}

impl Location2D {
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// The client switched to another map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapChanged {
    pub map_id: u8,
}

/// The server opened a map gump covering the given area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapMessage {
    pub upper_left: Location2D,
    pub lower_right: Location2D,
    pub width: u16,
    pub height: u16,
}

/// Quest arrow shown or hidden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestArrow {
    pub active: bool,
    pub location: Location2D,
}

/// Speech heard by the player (system messages have no speaker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechReceived {
    pub speaker_id: Option<u32>,
    pub name: String,
    pub text: String,
    pub color: u16,
}

impl SpeechReceived {
    /// Case-insensitive substring match against the spoken text
    pub fn contains(&self, needle: &str) -> bool {
        self.text.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Global light level changed (0 is brightest)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightLevelChanged {
    pub level: u8,
}

// ============================================================================
// Event sum type
// ============================================================================

/// Unified domain event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    MapChanged(MapChanged),
    MapMessage(MapMessage),
    QuestArrow(QuestArrow),
    SpeechReceived(SpeechReceived),
    LightLevelChanged(LightLevelChanged),
}

/// Discriminant of [`Event`], used to key subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
pub enum EventKind {
    MapChanged,
    MapMessage,
    QuestArrow,
    SpeechReceived,
    LightLevelChanged,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::MapChanged(_) => EventKind::MapChanged,
            Event::MapMessage(_) => EventKind::MapMessage,
            Event::QuestArrow(_) => EventKind::QuestArrow,
            Event::SpeechReceived(_) => EventKind::SpeechReceived,
            Event::LightLevelChanged(_) => EventKind::LightLevelChanged,
        }
    }
}

/// An event paired with the journal id it was appended under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedEvent {
    pub id: EventId,
    pub event: Event,
}

impl OrderedEvent {
    pub fn new(id: EventId, event: Event) -> Self {
        Self { id, event }
    }

    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

// ============================================================================
// Typed access
// ============================================================================

/// Implemented by every payload struct so that consumers can register typed
/// handlers and have them keyed by the right [`EventKind`].
pub trait EventPayload: Sized + Send + Sync + 'static {
    const KIND: EventKind;

    /// Borrow the payload if `event` is of this kind
    fn from_event(event: &Event) -> Option<&Self>;

    fn into_event(self) -> Event;
}

macro_rules! event_payload {
    ($($ty:ident),* $(,)?) => {
        $(
            impl EventPayload for $ty {
                const KIND: EventKind = EventKind::$ty;

                fn from_event(event: &Event) -> Option<&Self> {
                    match event {
                        Event::$ty(payload) => Some(payload),
                        _ => None,
                    }
                }

                fn into_event(self) -> Event {
                    Event::$ty(self)
                }
            }

            impl From<$ty> for Event {
                fn from(payload: $ty) -> Self {
                    Event::$ty(payload)
                }
            }
        )*
    };
}

event_payload!(
    MapChanged,
    MapMessage,
    QuestArrow,
    SpeechReceived,
    LightLevelChanged,
);
