use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tollgate_events::{Event, OrderedEvent};
use tracing::{debug, warn};

/// Log every event published on the feed until the source is dropped
pub fn spawn_event_logger(mut feed: broadcast::Receiver<OrderedEvent>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut logged = 0;
        loop {
            match feed.recv().await {
                Ok(ordered) => {
                    log_event(&ordered);
                    logged += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "events", "Event logger fell behind, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        logged
    })
}

fn log_event(ordered: &OrderedEvent) {
    let id = ordered.id;
    match &ordered.event {
        Event::MapChanged(map) => debug!(target: "events", "{} Map changed to {}", id, map.map_id),
        Event::MapMessage(map) => debug!(
            target: "events",
            "{} Map message {}x{} ({},{})-({},{})",
            id,
            map.width,
            map.height,
            map.upper_left.x,
            map.upper_left.y,
            map.lower_right.x,
            map.lower_right.y
        ),
        Event::QuestArrow(arrow) => debug!(
            target: "events",
            "{} Quest arrow {} at ({},{})",
            id,
            if arrow.active { "shown" } else { "hidden" },
            arrow.location.x,
            arrow.location.y
        ),
        Event::SpeechReceived(speech) => {
            debug!(target: "events", "{} {}: {}", id, speech.name, speech.text)
        }
        Event::LightLevelChanged(light) => {
            debug!(target: "events", "{} Light level {}", id, light.level)
        }
    }
}
