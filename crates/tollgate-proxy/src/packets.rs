//! Decoded server packets and their dispatch.
//!
//! The wire codec lives outside this crate; the proxy only ever sees packets
//! already decoded into [`ServerPacket`]. The [`PacketDispatcher`] hands each
//! packet to the subscribers of its kind, then runs it through the registered
//! filters to decide what is forwarded to the client.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use tollgate_events::Location2D;
use tracing::trace;

/// General information sub-command switching the client to another map
pub const SET_MAP_SUBCOMMAND: u16 = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerPacket {
    QuestArrow {
        active: bool,
        location: Location2D,
    },
    MapMessage {
        upper_left: Location2D,
        lower_right: Location2D,
        width: u16,
        height: u16,
    },
    GeneralInformation {
        subcommand: u16,
        #[serde(default)]
        data: Vec<u8>,
    },
    Speech {
        #[serde(default)]
        speaker_id: Option<u32>,
        name: String,
        text: String,
        #[serde(default)]
        color: u16,
    },
    LightLevel {
        level: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PacketKind {
    QuestArrow,
    MapMessage,
    GeneralInformation,
    Speech,
    LightLevel,
}

impl ServerPacket {
    pub fn kind(&self) -> PacketKind {
        match self {
            ServerPacket::QuestArrow { .. } => PacketKind::QuestArrow,
            ServerPacket::MapMessage { .. } => PacketKind::MapMessage,
            ServerPacket::GeneralInformation { .. } => PacketKind::GeneralInformation,
            ServerPacket::Speech { .. } => PacketKind::Speech,
            ServerPacket::LightLevel { .. } => PacketKind::LightLevel,
        }
    }
}

type PacketHandler = Arc<dyn Fn(&ServerPacket) + Send + Sync>;
type PacketFilter = Arc<dyn Fn(ServerPacket) -> Option<ServerPacket> + Send + Sync>;

/// Routes server packets to subscribers and client-bound filters
#[derive(Default)]
pub struct PacketDispatcher {
    handlers: RwLock<HashMap<PacketKind, Vec<PacketHandler>>>,
    filters: RwLock<Vec<PacketFilter>>,
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe every packet of `kind` as received from the server
    pub fn subscribe<F>(&self, kind: PacketKind, handler: F)
    where
        F: Fn(&ServerPacket) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Add a filter. Filters run in registration order; returning `None`
    /// drops the packet so the client never sees it.
    pub fn register_filter<F>(&self, filter: F)
    where
        F: Fn(ServerPacket) -> Option<ServerPacket> + Send + Sync + 'static,
    {
        self.filters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(filter));
    }

    /// Handle one packet from the server and return what to forward to the client
    pub fn dispatch(&self, packet: ServerPacket) -> Option<ServerPacket> {
        trace!(target: "proxy", "Dispatching {} packet", packet.kind());

        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&packet.kind())
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&packet);
        }

        let filters = self
            .filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        filters
            .iter()
            .try_fold(packet, |packet, filter| filter(packet))
    }
}
