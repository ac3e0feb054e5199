//! Building blocks behind the `tollgate` binary
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tollgate_journal::EventId;
use tollgate_proxy::{ProxySession, ServerPacket};
use tracing::{debug, info};

pub const EXAMPLE_CONFIG: &str = r#"# Tollgate Configuration

[proxy]
listen_address = "127.0.0.1:33333"
# server_address = "shard.example.net:2593"

[journal]
# Timeout for wait_any calls that don't pass one
# default_timeout_ms = 10000

[scripting]
enabled = true
# script_path = "/path/to/main.script"
hot_reload = true
hot_reload_interval_ms = 1000

[scripting.options]
light = false

[logging]
file = false
"#;

/// Write the example config to `path`, refusing to overwrite unless `force` is set
pub fn create_example_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    fs::write(path, EXAMPLE_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Created example config at {}", path.display());
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PacketFile {
    #[serde(default)]
    packets: Vec<ServerPacket>,
}

/// Read a TOML file of `[[packets]]` tables
pub fn load_packets(path: &Path) -> anyhow::Result<Vec<ServerPacket>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read packets from {}", path.display()))?;
    let file: PacketFile = toml::from_str(&content)
        .with_context(|| format!("Failed to parse packets from {}", path.display()))?;
    Ok(file.packets)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub received: usize,
    pub forwarded: usize,
    pub dropped: usize,
    pub last_event_id: EventId,
}

/// Feed packets through the session as if they came from the server
pub fn replay(session: &ProxySession, packets: impl IntoIterator<Item = ServerPacket>) -> ReplaySummary {
    let mut received = 0;
    let mut forwarded = 0;
    let mut dropped = 0;

    for packet in packets {
        received += 1;
        match session.handle_server_packet(packet) {
            Some(packet) => {
                debug!(target: "proxy", "Forwarding to client: {:?}", packet);
                forwarded += 1;
            }
            None => dropped += 1,
        }
    }

    ReplaySummary {
        received,
        forwarded,
        dropped,
        last_event_id: session.journal().last_event_id(),
    }
}
