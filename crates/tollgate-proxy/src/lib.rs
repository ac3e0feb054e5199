//! Proxy-side wiring for tollgate: decoded server packets come in through a
//! [`ProxySession`], observers republish them as journal events, filters
//! decide what reaches the client, and scripts drive commands in between.
pub mod config;
pub mod event_logger;
pub mod filters;
pub mod logging;
pub mod observers;
pub mod packets;
pub mod paths;
pub mod session;

pub use config::{ConfigLoadError, TollgateConfig};
pub use event_logger::spawn_event_logger;
pub use logging::init_logging;
pub use packets::{PacketDispatcher, PacketKind, ServerPacket};
pub use session::{BuildError, ProxySession, ProxySessionBuilder};
