//! Packet observers republishing server packets as domain events

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tollgate_events::{LightLevelChanged, MapChanged, MapMessage, QuestArrow, SpeechReceived};
use tollgate_journal::EventSource;
use tracing::debug;

use crate::packets::{PacketDispatcher, PacketKind, ServerPacket, SET_MAP_SUBCOMMAND};

const NO_MAP: u16 = u16::MAX;

type MapChangedObserver = Arc<dyn Fn(u8) + Send + Sync>;

/// Tracks the current map and publishes quest-arrow and map-message events
pub struct MapObserver {
    source: Arc<EventSource>,
    current_map: AtomicU16,
    observers: RwLock<Vec<MapChangedObserver>>,
}

impl MapObserver {
    pub fn attach(dispatcher: &PacketDispatcher, source: Arc<EventSource>) -> Arc<Self> {
        let observer = Arc::new(Self {
            source,
            current_map: AtomicU16::new(NO_MAP),
            observers: RwLock::new(Vec::new()),
        });

        let this = observer.clone();
        dispatcher.subscribe(PacketKind::QuestArrow, move |packet| {
            if let ServerPacket::QuestArrow { active, location } = packet {
                this.source.publish(QuestArrow {
                    active: *active,
                    location: *location,
                });
            }
        });

        let this = observer.clone();
        dispatcher.subscribe(PacketKind::MapMessage, move |packet| {
            if let ServerPacket::MapMessage {
                upper_left,
                lower_right,
                width,
                height,
            } = packet
            {
                this.source.publish(MapMessage {
                    upper_left: *upper_left,
                    lower_right: *lower_right,
                    width: *width,
                    height: *height,
                });
            }
        });

        let this = observer.clone();
        dispatcher.register_filter(move |packet| {
            if let ServerPacket::GeneralInformation { subcommand, data } = &packet {
                if *subcommand == SET_MAP_SUBCOMMAND {
                    match data.first() {
                        Some(map_id) => this.set_map(*map_id),
                        None => debug!(target: "proxy", "Set map packet without a map id"),
                    }
                }
            }
            Some(packet)
        });

        observer
    }

    /// Id of the map the client is on, once the server has told us
    pub fn current_map(&self) -> Option<u8> {
        u8::try_from(self.current_map.load(Ordering::SeqCst)).ok()
    }

    pub fn on_map_changed<F>(&self, observer: F)
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(observer));
    }

    fn set_map(&self, map_id: u8) {
        debug!(target: "proxy", "Map changed to {}", map_id);
        self.current_map.store(u16::from(map_id), Ordering::SeqCst);
        self.source.publish(MapChanged { map_id });

        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in observers {
            observer(map_id);
        }
    }
}

/// Publishes speech as [`SpeechReceived`] events
pub struct SpeechObserver;

impl SpeechObserver {
    pub fn attach(dispatcher: &PacketDispatcher, source: Arc<EventSource>) {
        dispatcher.subscribe(PacketKind::Speech, move |packet| {
            if let ServerPacket::Speech {
                speaker_id,
                name,
                text,
                color,
            } = packet
            {
                source.publish(SpeechReceived {
                    speaker_id: *speaker_id,
                    name: name.clone(),
                    text: text.clone(),
                    color: *color,
                });
            }
        });
    }
}

/// Publishes light level changes as [`LightLevelChanged`] events
pub struct LightObserver;

impl LightObserver {
    pub fn attach(dispatcher: &PacketDispatcher, source: Arc<EventSource>) {
        dispatcher.subscribe(PacketKind::LightLevel, move |packet| {
            if let ServerPacket::LightLevel { level } = packet {
                source.publish(LightLevelChanged { level: *level });
            }
        });
    }
}
