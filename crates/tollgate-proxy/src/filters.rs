use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tollgate_scripting_host::DisplayFilters;
use tracing::debug;

use crate::packets::{PacketDispatcher, ServerPacket};

/// Light level the client renders at full brightness
pub const FULL_BRIGHTNESS: u8 = 0;

/// Rewrites light levels to full brightness while enabled
#[derive(Debug, Default)]
pub struct LightFilter {
    enabled: AtomicBool,
}

impl LightFilter {
    pub fn attach(dispatcher: &PacketDispatcher) -> Arc<Self> {
        let filter = Arc::new(Self::default());

        let this = filter.clone();
        dispatcher.register_filter(move |packet| match packet {
            ServerPacket::LightLevel { .. } if this.is_enabled() => Some(ServerPacket::LightLevel {
                level: FULL_BRIGHTNESS,
            }),
            other => Some(other),
        });

        filter
    }

    pub fn enable(&self) {
        debug!(target: "proxy", "Light filter enabled");
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        debug!(target: "proxy", "Light filter disabled");
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl DisplayFilters for LightFilter {
    fn set_light_enabled(&self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }
}
