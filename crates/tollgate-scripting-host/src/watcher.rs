//! Script file change detection for hot reloading

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::host::ScriptHost;

/// Default check interval (1000ms = 1Hz)
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_millis(1000);

/// Watches a single script file's modification time
pub struct ScriptWatcher {
    path: PathBuf,
    interval: Duration,
    last_check: Option<Instant>,
    last_modified: Option<SystemTime>,
}

impl ScriptWatcher {
    pub fn new(path: PathBuf) -> Self {
        Self::with_interval(path, DEFAULT_WATCH_INTERVAL)
    }

    pub fn with_interval(path: PathBuf, interval: Duration) -> Self {
        // The file as it is now counts as already loaded
        let last_modified = modified_time(&path);

        Self {
            path,
            interval,
            last_check: None,
            last_modified,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn should_check(&self) -> bool {
        match self.last_check {
            Some(last) => last.elapsed() >= self.interval,
            None => true,
        }
    }

    /// Returns true if the file was modified (or re-created) since the last check
    pub fn check_changed(&mut self) -> bool {
        self.last_check = Some(Instant::now());

        let current = modified_time(&self.path);
        let previous = std::mem::replace(&mut self.last_modified, current);

        match (previous, current) {
            (_, None) => {
                if previous.is_some() {
                    debug!(target: "scripting", "Script removed: {}", self.path.display());
                }
                false
            }
            (Some(previous), Some(current)) if previous == current => false,
            (previous, Some(current)) => {
                debug!(
                    target: "scripting",
                    "Script changed: {} (old: {:?}, new: {:?})",
                    self.path.display(),
                    previous,
                    current
                );
                true
            }
        }
    }

    /// Reload the script into `host` whenever it changes, until `shutdown`
    /// turns true or the host is dropped
    pub fn spawn(mut self, host: &Arc<ScriptHost>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let host = Arc::downgrade(host);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(target: "scripting", "Watching {} for changes", self.path.display());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                if !self.check_changed() {
                    continue;
                }

                let Some(host) = host.upgrade() else {
                    break;
                };

                info!(target: "scripting", "Script {} changed, reloading", self.path.display());
                let path = self.path.clone();
                match tokio::task::spawn_blocking(move || host.load_script(&path)).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(target: "scripting", "Reload failed: {}", e),
                    Err(e) => error!(target: "scripting", "Reload task failed: {}", e),
                }
            }

            debug!(target: "scripting", "Stopped watching {}", self.path.display());
        })
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    match std::fs::metadata(path).and_then(|metadata| metadata.modified()) {
        Ok(modified) => Some(modified),
        Err(e) => {
            debug!(target: "scripting", "Cannot read modification time of {}: {}", path.display(), e);
            None
        }
    }
}
